//! Token provider backed by a remote session-management service.
//!
//! Instead of running OAuth locally, [`DelegatedTokenProvider`] asks the
//! session service to vend an access token for a given deployment and
//! account. The token is cached in a single slot for
//! [`DELEGATED_TOKEN_LIFETIME_MINUTES`](crate::types::DELEGATED_TOKEN_LIFETIME_MINUTES)
//! and replaced wholesale on every fetch. Concurrent callers that both see an
//! expired slot may both fetch; the last write wins.

use async_trait::async_trait;
use parking_lot::Mutex;
use schwab_core::{HttpRequest, HttpTransport, SharedClock, system_clock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::AuthError;
use crate::provider::TokenProvider;
use crate::types::CachedSessionToken;

/// Path of the token-vending endpoint, relative to the session API URL.
pub const REFRESH_PATH: &str = "live/auth0/refresh";

/// Identifies the session the remote service should vend a token for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokenRequest {
    /// Brokerage name, lower-cased.
    pub brokerage: String,
    /// Deployment identifier.
    pub deploy_id: String,
    /// Project identifier.
    pub project_id: i64,
    /// Brokerage account number.
    #[serde(rename = "accountId")]
    pub account_number: String,
}

impl SessionTokenRequest {
    /// Build a request; `brokerage` is lower-cased.
    pub fn new(
        brokerage: &str,
        deploy_id: impl Into<String>,
        project_id: i64,
        account_number: impl Into<String>,
    ) -> Self {
        Self {
            brokerage: brokerage.to_lowercase(),
            deploy_id: deploy_id.into(),
            project_id,
            account_number: account_number.into(),
        }
    }
}

/// Session service response: either a token or a list of errors.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokenResponse {
    /// Whether the call succeeded.
    #[serde(default)]
    pub success: bool,
    /// Vended access token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Error entries.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Token provider that delegates to the session service.
pub struct DelegatedTokenProvider<T> {
    transport: T,
    refresh_url: String,
    request_body: String,
    clock: SharedClock,
    cache: Mutex<Option<CachedSessionToken>>,
}

impl<T: HttpTransport> DelegatedTokenProvider<T> {
    /// Create a provider calling `{api_url}/live/auth0/refresh` through `transport`.
    ///
    /// The session service authenticates its callers; `transport` must attach
    /// whatever credentials the service expects. The provider adds none.
    pub fn new(
        transport: T,
        api_url: &str,
        request: &SessionTokenRequest,
    ) -> Result<Self, AuthError> {
        let request_body = serde_json::to_string(request).map_err(|source| AuthError::Decode {
            context: "session token request",
            source,
        })?;
        Ok(Self {
            transport,
            refresh_url: format!("{}/{REFRESH_PATH}", api_url.trim_end_matches('/')),
            request_body,
            clock: system_clock(),
            cache: Mutex::new(None),
        })
    }

    /// Override the clock used for cache expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// The cached token, if any, regardless of validity.
    pub fn cached(&self) -> Option<CachedSessionToken> {
        self.cache.lock().clone()
    }

    /// Fetch a new token from the session service and replace the cache.
    #[tracing::instrument(skip_all)]
    pub async fn fetch(&self, cancel: &CancellationToken) -> Result<String, AuthError> {
        let request = HttpRequest::post(&self.refresh_url).with_json_text(self.request_body.clone());
        let response = self.transport.send(request, cancel).await?;

        let status = response.status;
        let body: SessionTokenResponse = match response.json("session token response") {
            Ok(body) => body,
            Err(err) if response.is_success() => return Err(err.into()),
            Err(_) => {
                return Err(AuthError::RemoteFetch {
                    status,
                    message: format!("session service returned {status}"),
                });
            }
        };

        match body.access_token {
            Some(token) if body.success && response.is_success() => {
                let cached = CachedSessionToken::new(token.clone(), self.clock.now());
                info!(expires_at = %cached.expires_at, "fetched delegated access token");
                *self.cache.lock() = Some(cached);
                Ok(token)
            }
            _ => Err(AuthError::RemoteFetch {
                status,
                message: body.errors.join(","),
            }),
        }
    }
}

#[async_trait]
impl<T: HttpTransport> TokenProvider for DelegatedTokenProvider<T> {
    async fn get_access_token(&self, cancel: &CancellationToken) -> Result<String, AuthError> {
        let now = self.clock.now();
        let cached = self.cached().filter(|c| c.is_valid_at(now));
        if let Some(cached) = cached {
            debug!("using cached delegated access token");
            return Ok(cached.access_token);
        }
        self.fetch(cancel).await
    }

    async fn refresh_access_token(
        &self,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        self.fetch(cancel).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
