//! Streaming session errors.

use schwab_auth::AuthError;
use schwab_core::TransportError;
use tokio_tungstenite::tungstenite;

/// Errors raised while running a streaming session.
///
/// Frame-level errors (`Decode`, `UnsupportedService`, `UnsupportedResponse`)
/// abort handling of one frame only; the session keeps reading.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A frame or payload did not match any expected shape.
    #[error("failed to decode {context}: {message}")]
    Decode {
        /// What was being decoded.
        context: &'static str,
        /// Decoder message.
        message: String,
    },

    /// An outbound frame could not be serialized.
    #[error("failed to encode outbound request: {0}")]
    Encode(String),

    /// A frame named a service this client does not handle.
    #[error("unsupported service {0}")]
    UnsupportedService(String),

    /// A service response carried an unexpected code.
    #[error("unsupported response from {service}: {code} - {message}")]
    UnsupportedResponse {
        /// Responding service.
        service: String,
        /// Result code.
        code: i64,
        /// Result message.
        message: String,
    },

    /// Could not obtain a token for the login frame.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// HTTP failure during the preference lookup.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// WebSocket protocol or I/O failure.
    #[error("websocket error: {0}")]
    WebSocket(#[source] Box<tungstenite::Error>),

    /// The connection is gone.
    #[error("stream closed")]
    Closed,

    /// Operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl StreamError {
    /// Build a decode error from a `serde_json` failure.
    pub fn decode(context: &'static str, source: &serde_json::Error) -> Self {
        Self::Decode {
            context,
            message: source.to_string(),
        }
    }

    /// Error category string for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Encode(_) => "encode",
            Self::UnsupportedService(_) | Self::UnsupportedResponse { .. } => "protocol",
            Self::Auth(_) => "auth",
            Self::Transport(_) | Self::WebSocket(_) => "network",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the error only affects the frame being handled.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::UnsupportedService(_) | Self::UnsupportedResponse { .. }
        )
    }
}

impl From<tungstenite::Error> for StreamError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed
            }
            other => Self::WebSocket(Box::new(other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
