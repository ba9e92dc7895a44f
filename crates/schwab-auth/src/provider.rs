//! Token provider capability.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::AuthError;

/// Source of bearer tokens.
///
/// Implementations own their token cache. Callers never mutate it; they ask
/// for the current token or force a refresh.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a usable access token, fetching one if none is cached or the
    /// cached one has expired.
    async fn get_access_token(&self, cancel: &CancellationToken) -> Result<String, AuthError>;

    /// Discard the cached token and obtain a new one.
    async fn refresh_access_token(&self, cancel: &CancellationToken)
    -> Result<String, AuthError>;
}

#[async_trait]
impl<T: TokenProvider + ?Sized> TokenProvider for Arc<T> {
    async fn get_access_token(&self, cancel: &CancellationToken) -> Result<String, AuthError> {
        (**self).get_access_token(cancel).await
    }

    async fn refresh_access_token(
        &self,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        (**self).refresh_access_token(cancel).await
    }
}

/// Shared, type-erased token provider.
pub type SharedTokenProvider = Arc<dyn TokenProvider>;

/// A provider that always returns the same token. Useful for pre-issued
/// long-lived tokens and tests.
#[derive(Clone, Debug)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wrap a fixed token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_access_token(&self, cancel: &CancellationToken) -> Result<String, AuthError> {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        Ok(self.token.clone())
    }

    async fn refresh_access_token(
        &self,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        self.get_access_token(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_through_shared_handle() {
        let provider: SharedTokenProvider = Arc::new(StaticTokenProvider::new("tok"));
        let cancel = CancellationToken::new();
        assert_eq!(provider.get_access_token(&cancel).await.unwrap(), "tok");
        assert_eq!(provider.refresh_access_token(&cancel).await.unwrap(), "tok");
    }

    #[tokio::test]
    async fn static_provider_honours_cancel() {
        let provider = StaticTokenProvider::new("tok");
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            provider.get_access_token(&cancel).await,
            Err(AuthError::Cancelled)
        ));
    }
}
