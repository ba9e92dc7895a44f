//! Streamer session parameters and where they come from.

use async_trait::async_trait;
use schwab_core::{HttpRequest, HttpTransport, TransportError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::StreamError;

/// Default user-preference path, relative to the API base URL.
pub const DEFAULT_USER_PREFERENCE_PATH: &str = "/trader/v1/userPreference";

/// Connection parameters for one streaming session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamerSessionInfo {
    /// WebSocket URL.
    pub streamer_socket_url: String,
    /// Customer id sent on every request.
    pub schwab_client_customer_id: String,
    /// Correlation id sent on every request.
    pub schwab_client_correl_id: String,
    /// Channel sent on login.
    pub schwab_client_channel: String,
    /// Function id sent on login.
    pub schwab_client_function_id: String,
}

/// The subset of the user-preference document this crate reads.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreference {
    /// Streamer entries; the first one is used.
    #[serde(default)]
    pub streamer_info: Vec<StreamerSessionInfo>,
}

/// Source of [`StreamerSessionInfo`], queried once per session.
#[async_trait]
pub trait PreferenceSource: Send + Sync {
    /// Fetch the parameters for a new session.
    async fn streamer_info(
        &self,
        cancel: &CancellationToken,
    ) -> Result<StreamerSessionInfo, StreamError>;
}

/// Fixed parameters, for pre-configured sessions and tests.
#[derive(Clone, Debug)]
pub struct StaticPreferenceSource(pub StreamerSessionInfo);

#[async_trait]
impl PreferenceSource for StaticPreferenceSource {
    async fn streamer_info(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<StreamerSessionInfo, StreamError> {
        Ok(self.0.clone())
    }
}

/// Reads the user-preference document over REST.
///
/// `transport` is expected to authenticate the call, typically an
/// `AuthenticatedTransport` or `OAuthTokenProvider`.
pub struct RestPreferenceSource<T> {
    transport: T,
    url: String,
}

impl<T: HttpTransport> RestPreferenceSource<T> {
    /// Look up preferences at `{base_url}{path}`.
    pub fn new(transport: T, base_url: &str, path: &str) -> Self {
        Self {
            transport,
            url: format!("{}{path}", base_url.trim_end_matches('/')),
        }
    }

    /// Lookup URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<T: HttpTransport> PreferenceSource for RestPreferenceSource<T> {
    #[tracing::instrument(skip_all, fields(url = %self.url))]
    async fn streamer_info(
        &self,
        cancel: &CancellationToken,
    ) -> Result<StreamerSessionInfo, StreamError> {
        let response = self.transport.send(HttpRequest::get(&self.url), cancel).await?;
        if !response.is_success() {
            warn!(status = response.status, "user preference lookup failed");
            return Err(StreamError::Transport(TransportError::Connection(format!(
                "user preference lookup returned {}",
                response.status
            ))));
        }

        let preference: UserPreference =
            response
                .json("user preference")
                .map_err(|e| StreamError::Decode {
                    context: "user preference",
                    message: e.to_string(),
                })?;
        let info = preference
            .streamer_info
            .into_iter()
            .next()
            .ok_or_else(|| StreamError::Decode {
                context: "user preference",
                message: "no streamerInfo entries".into(),
            })?;
        debug!(socket_url = %info.streamer_socket_url, "resolved streamer info");
        Ok(info)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
