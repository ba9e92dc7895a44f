//! Transport error types.

/// Errors raised while sending a request through an [`HttpTransport`].
///
/// [`HttpTransport`]: crate::http::HttpTransport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying HTTP client failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A non-reqwest transport could not complete the exchange.
    #[error("connection error: {0}")]
    Connection(String),

    /// A response body did not match the expected schema.
    #[error("failed to decode {context}: {source}")]
    Decode {
        /// What was being decoded (e.g. `"token response"`).
        context: &'static str,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A token exchange could not be started or was rejected outright.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Build a decode error for the given context.
    pub fn decode(context: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { context, source }
    }

    /// Whether this error is a decode failure.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = TransportError::decode("token response", source);
        assert!(err.is_decode());
        assert!(err.to_string().starts_with("failed to decode token response"));
    }

    #[test]
    fn connection_error_display() {
        let err = TransportError::Connection("reset by peer".to_string());
        assert_eq!(err.to_string(), "connection error: reset by peer");
        assert!(!err.is_decode());
    }

    #[test]
    fn cancelled_display() {
        assert_eq!(TransportError::Cancelled.to_string(), "request cancelled");
    }
}
