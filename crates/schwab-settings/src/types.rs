//! Settings type definitions.
//!
//! All types use camelCase JSON field names and `#[serde(default)]`, so a
//! settings file only needs the values it changes.

use std::fmt;

use schwab_core::RetryPolicy;
use schwab_core::logging::redact;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Default REST API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.schwabapi.com";

/// Default OAuth path prefix, relative to the API base URL.
pub const DEFAULT_OAUTH_PATH: &str = "/v1";

/// Default user-preference path.
pub const DEFAULT_USER_PREFERENCE_PATH: &str = "/trader/v1/userPreference";

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchwabSettings {
    /// Token source selection.
    pub auth: AuthSettings,
    /// REST API and OAuth client settings.
    pub api: ApiSettings,
    /// Session-service settings, used in delegated mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegated: Option<DelegatedSettings>,
    /// 401 retry policy.
    pub retry: RetryPolicy,
    /// Log output.
    pub logging: LoggingSettings,
}

impl SchwabSettings {
    /// Check that the selected auth mode has what it needs.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            return Err(SettingsError::InvalidValue("api.baseUrl is empty".into()));
        }
        match self.auth.mode {
            AuthMode::OAuth => {
                if self.api.client_id.is_empty() || self.api.client_secret.is_empty() {
                    return Err(SettingsError::InvalidValue(
                        "api.clientId and api.clientSecret are required in oauth mode".into(),
                    ));
                }
            }
            AuthMode::Delegated => {
                let Some(delegated) = &self.delegated else {
                    return Err(SettingsError::InvalidValue(
                        "delegated section is required in delegated mode".into(),
                    ));
                };
                if delegated.api_url.is_empty() || delegated.deploy_id.is_empty() {
                    return Err(SettingsError::InvalidValue(
                        "delegated.apiUrl and delegated.deployId are required".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Where access tokens come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Local OAuth exchange.
    #[default]
    #[serde(rename = "oauth")]
    OAuth,
    /// Tokens vended by the session service.
    Delegated,
}

/// Token source selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Selected token source.
    pub mode: AuthMode,
}

/// REST API and OAuth client settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// REST API base URL.
    pub base_url: String,
    /// Prefix of the OAuth endpoints, relative to `base_url`.
    pub oauth_path: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// OAuth redirect URI.
    pub redirect_uri: String,
    /// One-time authorization code from the consent redirect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    /// Previously issued refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// User-preference path, relative to `base_url`.
    pub user_preference_path: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            oauth_path: DEFAULT_OAUTH_PATH.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "https://127.0.0.1".to_string(),
            authorization_code: None,
            refresh_token: None,
            user_preference_path: DEFAULT_USER_PREFERENCE_PATH.to_string(),
        }
    }
}

impl ApiSettings {
    /// Base URL of the OAuth endpoints: `{base_url}{oauth_path}`.
    pub fn oauth_base_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.oauth_path)
    }
}

impl fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSettings")
            .field("base_url", &self.base_url)
            .field("oauth_path", &self.oauth_path)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("redirect_uri", &self.redirect_uri)
            .field("authorization_code", &self.authorization_code.as_deref().map(redact))
            .field("refresh_token", &self.refresh_token.as_deref().map(redact))
            .field("user_preference_path", &self.user_preference_path)
            .finish()
    }
}

/// Session-service settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelegatedSettings {
    /// Session API URL; the refresh call goes to `{apiUrl}/live/auth0/refresh`.
    pub api_url: String,
    /// Brokerage name sent with the request.
    pub brokerage: String,
    /// Deployment id.
    pub deploy_id: String,
    /// Project id.
    pub project_id: i64,
    /// Brokerage account number.
    pub account_number: String,
}

impl Default for DelegatedSettings {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            brokerage: "CharlesSchwab".to_string(),
            deploy_id: String::new(),
            project_id: 0,
            account_number: String::new(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
