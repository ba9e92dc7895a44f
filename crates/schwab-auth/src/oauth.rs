//! OAuth2 authorization-code / refresh-token provider.
//!
//! [`OAuthTokenProvider`] owns the token exchange with the brokerage's
//! authorization server and is also an [`HttpTransport`] decorator: requests
//! routed through it carry `{token_type} {access_token}` and a 401 triggers a
//! token exchange followed by a retry.
//!
//! Exchange branch on 401 (or when no usable token is held):
//! - no access token and no refresh token: `grant_type=authorization_code`
//!   with the one-time code obtained from the authorization redirect
//! - otherwise: `grant_type=refresh_token` with the held refresh token
//!
//! Token exchange calls go straight to the inner transport with
//! `Authorization: Basic base64(client_id:client_secret)` and never see the
//! bearer logic.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use parking_lot::RwLock;
use schwab_core::http::form_encode;
use schwab_core::logging::redact;
use schwab_core::{
    AUTHORIZATION, HttpRequest, HttpResponse, HttpTransport, RetryPolicy, SharedClock,
    TransportError, system_clock,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::AuthError;
use crate::provider::TokenProvider;
use crate::types::{AccessToken, TokenResponse};

/// Path of the token endpoint, relative to the API base URL.
pub const TOKEN_PATH: &str = "/oauth/token";
/// Path of the browser authorization endpoint.
pub const AUTHORIZE_PATH: &str = "/oauth/authorize";

/// Client registration and one-time credentials.
#[derive(Clone, Default)]
pub struct OAuthConfig {
    /// API base URL, e.g. `https://api.schwabapi.com/v1`.
    pub base_url: String,
    /// Application key.
    pub client_id: String,
    /// Application secret.
    pub client_secret: String,
    /// Registered callback URL.
    pub redirect_uri: String,
    /// Code captured from the authorization redirect.
    pub authorization_code: Option<String>,
    /// Refresh token from an earlier session; skips the code exchange.
    pub refresh_token: Option<String>,
}

impl OAuthConfig {
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Absolute token endpoint URL.
    pub fn token_url(&self) -> String {
        format!("{}{TOKEN_PATH}", self.base())
    }

    /// URL the user opens to grant access and obtain an authorization code.
    pub fn authorization_url(&self) -> String {
        format!(
            "{}{AUTHORIZE_PATH}?client_id={}&redirect_uri={}",
            self.base(),
            form_encode(&self.client_id),
            form_encode(&self.redirect_uri),
        )
    }

    /// `base64(client_id:client_secret)`.
    pub fn encoded_client_credentials(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret))
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("redirect_uri", &self.redirect_uri)
            .field("authorization_code", &self.authorization_code.as_deref().map(redact))
            .field("refresh_token", &self.refresh_token.as_deref().map(redact))
            .finish()
    }
}

#[derive(Default)]
struct TokenState {
    token: Option<AccessToken>,
    refresh_token: Option<String>,
}

/// OAuth2 token provider and self-authenticating transport.
pub struct OAuthTokenProvider<T> {
    inner: T,
    config: OAuthConfig,
    encoded_credentials: String,
    policy: RetryPolicy,
    clock: SharedClock,
    state: RwLock<TokenState>,
}

impl<T: HttpTransport> OAuthTokenProvider<T> {
    /// Create a provider sending through `inner`.
    pub fn new(inner: T, config: OAuthConfig) -> Self {
        let encoded_credentials = config.encoded_client_credentials();
        let state = TokenState {
            token: None,
            refresh_token: config.refresh_token.clone().filter(|r| !r.is_empty()),
        };
        Self {
            inner,
            config,
            encoded_credentials,
            policy: RetryPolicy::default(),
            clock: system_clock(),
            state: RwLock::new(state),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the clock used for expiry checks.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// The client configuration.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// URL the user opens to obtain an authorization code.
    pub fn authorization_url(&self) -> String {
        self.config.authorization_url()
    }

    /// The token currently held, if any.
    pub fn current_token(&self) -> Option<AccessToken> {
        self.state.read().token.clone()
    }

    /// The refresh token currently held, if any.
    pub fn current_refresh_token(&self) -> Option<String> {
        self.state.read().refresh_token.clone()
    }

    /// Obtain a new token via whichever grant applies and store it.
    pub async fn reauthenticate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, TransportError> {
        let (has_token, refresh_token) = {
            let state = self.state.read();
            (state.token.is_some(), state.refresh_token.clone())
        };

        let token = match refresh_token {
            Some(refresh) => self.exchange_refresh_token(&refresh, cancel).await?,
            None if !has_token => self.exchange_authorization_code(cancel).await?,
            None => {
                return Err(TransportError::TokenExchange(
                    "access token held without a refresh token".to_string(),
                ));
            }
        };

        let mut state = self.state.write();
        state.refresh_token.clone_from(&token.refresh_token);
        state.token = Some(token.clone());
        Ok(token)
    }

    /// `grant_type=authorization_code` exchange.
    #[tracing::instrument(skip_all, fields(grant = "authorization_code"))]
    pub async fn exchange_authorization_code(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, TransportError> {
        let code = self
            .config
            .authorization_code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                TransportError::TokenExchange(
                    "no authorization code or refresh token configured".to_string(),
                )
            })?;

        let response = self
            .send_token_request(
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", &self.config.redirect_uri),
                ],
                cancel,
            )
            .await?;
        info!("obtained access token from authorization code");
        Ok(AccessToken::from_response(response, self.clock.now(), None))
    }

    /// `grant_type=refresh_token` exchange.
    #[tracing::instrument(skip_all, fields(grant = "refresh_token"))]
    pub async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, TransportError> {
        let response = self
            .send_token_request(
                &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
                cancel,
            )
            .await?;
        info!("refreshed access token");
        Ok(AccessToken::from_response(
            response,
            self.clock.now(),
            Some(refresh_token.to_string()),
        ))
    }

    async fn send_token_request(
        &self,
        form: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<TokenResponse, TransportError> {
        let request = HttpRequest::post(self.config.token_url())
            .with_form(form)
            .with_header(AUTHORIZATION, format!("Basic {}", self.encoded_credentials));

        let response = self.inner.send(request, cancel).await?;
        if !response.is_success() {
            warn!(status = response.status, "token endpoint returned non-success status");
        }
        response.json("token response")
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for OAuthTokenProvider<T> {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            let mut outbound = request.clone();
            if let Some(token) = self.current_token() {
                outbound.set_header(AUTHORIZATION, token.authorization_value());
            }
            let response = self.inner.send(outbound, cancel).await?;

            if !response.is_unauthorized() || self.policy.is_last_attempt(attempt) {
                return Ok(response);
            }

            debug!(attempt = attempt + 1, url = %request.url, "401 received, exchanging token");
            let _ = self.reauthenticate(cancel).await?;
            self.policy.wait(cancel).await?;
            attempt += 1;
        }
    }
}

#[async_trait]
impl<T: HttpTransport> TokenProvider for OAuthTokenProvider<T> {
    async fn get_access_token(&self, cancel: &CancellationToken) -> Result<String, AuthError> {
        if let Some(token) = self.current_token() {
            if token.is_valid_at(self.clock.now()) {
                return Ok(token.access_token);
            }
        }
        Ok(self.reauthenticate(cancel).await?.access_token)
    }

    async fn refresh_access_token(
        &self,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        Ok(self.reauthenticate(cancel).await?.access_token)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
