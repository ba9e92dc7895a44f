//! # schwab-auth
//!
//! Access-token providers and the transports that use them.
//!
//! Two token sources are supported:
//! - **OAuth**: authorization-code and refresh-token grants against
//!   `{base}/oauth/token` ([`oauth`])
//! - **Delegated**: tokens vended by a remote session service and cached for
//!   29 minutes ([`delegated`])
//!
//! Both implement [`TokenProvider`]. [`AuthenticatedTransport`] wraps any
//! [`HttpTransport`](schwab_core::HttpTransport) and attaches a bearer token
//! from a provider, refreshing and retrying on 401.

#![deny(unsafe_code)]

pub mod delegated;
pub mod errors;
pub mod oauth;
pub mod provider;
pub mod transport;
pub mod types;

pub use delegated::{DelegatedTokenProvider, SessionTokenRequest, SessionTokenResponse};
pub use errors::AuthError;
pub use oauth::{OAuthConfig, OAuthTokenProvider};
pub use provider::{SharedTokenProvider, StaticTokenProvider, TokenProvider};
pub use transport::AuthenticatedTransport;
pub use types::{AccessToken, CachedSessionToken, TokenResponse};
