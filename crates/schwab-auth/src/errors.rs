//! Auth error types.

use schwab_core::TransportError;

/// Errors that can occur while obtaining or using access tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// A token response did not match the expected schema.
    #[error("failed to decode {context}: {source}")]
    Decode {
        /// What was being decoded.
        context: &'static str,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The remote session service refused to vend a token.
    #[error("remote token fetch failed: {message}")]
    RemoteFetch {
        /// HTTP status code of the failed call.
        status: u16,
        /// Joined error entries from the response.
        message: String,
    },

    /// The provider has nothing to exchange for a token.
    #[error("no credentials configured: {0}")]
    NotConfigured(String),

    /// The caller's cancellation token fired.
    #[error("token request cancelled")]
    Cancelled,
}

impl From<TransportError> for AuthError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => Self::Cancelled,
            TransportError::Decode { context, source } => Self::Decode { context, source },
            other => Self::Transport(other),
        }
    }
}

impl From<AuthError> for TransportError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Transport(inner) => inner,
            AuthError::Cancelled => Self::Cancelled,
            AuthError::Decode { context, source } => Self::Decode { context, source },
            other => Self::TokenExchange(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
