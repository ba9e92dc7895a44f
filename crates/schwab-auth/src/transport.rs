//! Bearer-token transport decorator.
//!
//! [`AuthenticatedTransport`] attaches `Authorization: Bearer {token}` from a
//! [`TokenProvider`] and, on 401, forces a refresh and retries under a bounded
//! [`RetryPolicy`]. When attempts run out the last response is returned as-is;
//! callers inspect its status.

use async_trait::async_trait;
use schwab_core::{
    AUTHORIZATION, HttpRequest, HttpResponse, HttpTransport, RetryPolicy, TransportError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::AuthError;
use crate::provider::SharedTokenProvider;

/// Transport that authenticates every request with a bearer token.
pub struct AuthenticatedTransport<T> {
    inner: T,
    provider: SharedTokenProvider,
    policy: RetryPolicy,
}

impl<T: HttpTransport> AuthenticatedTransport<T> {
    /// Wrap `inner`, authorizing with tokens from `provider`.
    pub fn new(inner: T, provider: SharedTokenProvider) -> Self {
        Self {
            inner,
            provider,
            policy: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The token provider backing this transport.
    pub fn provider(&self) -> &SharedTokenProvider {
        &self.provider
    }

    /// Send `request` with a bearer token, refreshing and retrying on 401.
    pub async fn send_authenticated(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, AuthError> {
        let mut token = self.provider.get_access_token(cancel).await?;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AuthError::Cancelled);
            }

            let mut outbound = request.clone();
            outbound.set_header(AUTHORIZATION, format!("Bearer {token}"));
            let response = self.inner.send(outbound, cancel).await?;

            if !response.is_unauthorized() {
                if !response.is_success() {
                    debug!(status = response.status, url = %request.url, "non-success response, not retrying");
                }
                return Ok(response);
            }
            if self.policy.is_last_attempt(attempt) {
                warn!(attempts = attempt + 1, url = %request.url, "still unauthorized after final attempt");
                return Ok(response);
            }

            warn!(attempt = attempt + 1, url = %request.url, "401 received, refreshing access token");
            token = self.provider.refresh_access_token(cancel).await?;
            self.policy.wait(cancel).await?;
            attempt += 1;
        }
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for AuthenticatedTransport<T> {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        self.send_authenticated(request, cancel)
            .await
            .map_err(TransportError::from)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use assert_matches::assert_matches;
    use schwab_core::testing::ScriptedTransport;

    use super::*;
    use crate::provider::TokenProvider;

    /// Hands out `tok-0`, then `tok-1`, ... on each refresh.
    #[derive(Default)]
    struct CountingProvider {
        refreshes: AtomicU32,
    }

    #[async_trait]
    impl TokenProvider for CountingProvider {
        async fn get_access_token(&self, _: &CancellationToken) -> Result<String, AuthError> {
            Ok(format!("tok-{}", self.refreshes.load(Ordering::SeqCst)))
        }

        async fn refresh_access_token(&self, _: &CancellationToken) -> Result<String, AuthError> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("tok-{n}"))
        }
    }

    fn setup(statuses: &[u16]) -> (Arc<ScriptedTransport>, Arc<CountingProvider>, AuthenticatedTransport<Arc<ScriptedTransport>>) {
        let inner = Arc::new(ScriptedTransport::new());
        for status in statuses {
            let _ = inner.push("/accounts", HttpResponse::new(*status, format!("status {status}")));
        }
        let provider = Arc::new(CountingProvider::default());
        let transport = AuthenticatedTransport::new(Arc::clone(&inner), provider.clone());
        (inner, provider, transport)
    }

    fn request() -> HttpRequest {
        HttpRequest::get("https://api.example.com/trader/v1/accounts")
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt() {
        let (inner, provider, transport) = setup(&[200]);
        let resp = transport
            .send_authenticated(request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(inner.requests().len(), 1);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(inner.requests()[0].header(AUTHORIZATION), Some("Bearer tok-0"));
    }

    #[tokio::test(start_paused = true)]
    async fn one_401_then_success() {
        let (inner, provider, transport) = setup(&[401, 200]);
        let resp = transport
            .send_authenticated(request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        let sent = inner.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(sent[1].header(AUTHORIZATION), Some("Bearer tok-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn two_401s_then_success() {
        let (inner, provider, transport) = setup(&[401, 401, 200]);
        let resp = transport
            .send_authenticated(request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(inner.requests().len(), 3);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_last_401() {
        let (inner, provider, transport) = setup(&[401, 401, 401, 200]);
        let start = tokio::time::Instant::now();
        let resp = transport
            .send_authenticated(request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resp.status, 401);
        assert_eq!(resp.body, "status 401");
        assert_eq!(inner.requests().len(), 3);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn other_failures_are_not_retried() {
        let (inner, provider, transport) = setup(&[503, 200]);
        let resp = transport
            .send_authenticated(request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resp.status, 503);
        assert_eq!(inner.requests().len(), 1);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_aborts() {
        let (inner, _provider, transport) = setup(&[401, 200]);
        let transport = transport.with_policy(RetryPolicy::new(3, Duration::from_secs(30)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let _handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = transport.send_authenticated(request(), &cancel).await;
        assert_matches!(result, Err(AuthError::Cancelled));
        assert_eq!(inner.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_propagates() {
        let inner = Arc::new(ScriptedTransport::new());
        let transport =
            AuthenticatedTransport::new(Arc::clone(&inner), Arc::new(CountingProvider::default()));
        let result = transport
            .send_authenticated(request(), &CancellationToken::new())
            .await;
        assert_matches!(result, Err(AuthError::Transport(TransportError::Connection(_))));
    }
}
