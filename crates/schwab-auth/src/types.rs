//! Token types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 1800;

/// Lifetime assigned to a token vended by the session service.
///
/// Remote tokens live for 30 minutes; the cache keeps them one minute less.
pub const DELEGATED_TOKEN_LIFETIME_MINUTES: i64 = 29;

/// Body of a successful `/oauth/token` response.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    /// Bearer credential.
    pub access_token: String,
    /// Authorization scheme, usually `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Refresh credential, absent on some refresh responses.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Granted scope.
    #[serde(default)]
    pub scope: Option<String>,
    /// OpenID token, when issued.
    #[serde(default)]
    pub id_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// An issued access token.
///
/// Immutable once built; a refresh produces a new value that replaces the
/// old one wholesale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    /// Bearer credential.
    pub access_token: String,
    /// Authorization scheme.
    pub token_type: String,
    /// Refresh credential carried forward for the next exchange.
    pub refresh_token: Option<String>,
    /// Granted scope.
    pub scope: Option<String>,
    /// When the token stops being usable.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Build a token from an endpoint response received at `issued_at`.
    ///
    /// When the response carries no refresh token, `previous_refresh` is kept.
    pub fn from_response(
        response: TokenResponse,
        issued_at: DateTime<Utc>,
        previous_refresh: Option<String>,
    ) -> Self {
        let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token.or(previous_refresh),
            scope: response.scope,
            expires_at: issued_at + Duration::seconds(lifetime),
        }
    }

    /// Whether the token may still be used at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// `Authorization` header value: `{token_type} {access_token}`.
    pub fn authorization_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Single-slot cache entry for a token vended by the session service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedSessionToken {
    /// Bearer credential.
    pub access_token: String,
    /// Local expiry, always [`DELEGATED_TOKEN_LIFETIME_MINUTES`] after the fetch.
    pub expires_at: DateTime<Utc>,
}

impl CachedSessionToken {
    /// Cache `access_token` as fetched at `fetched_at`.
    pub fn new(access_token: String, fetched_at: DateTime<Utc>) -> Self {
        Self {
            access_token,
            expires_at: fetched_at + Duration::minutes(DELEGATED_TOKEN_LIFETIME_MINUTES),
        }
    }

    /// Whether the cached token may still be used at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: serde_json::Value) -> TokenResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn token_from_full_response() {
        let now = Utc::now();
        let token = AccessToken::from_response(
            response(serde_json::json!({
                "access_token": "A1",
                "token_type": "Bearer",
                "refresh_token": "R1",
                "expires_in": 1800,
                "scope": "api"
            })),
            now,
            None,
        );
        assert_eq!(token.access_token, "A1");
        assert_eq!(token.refresh_token.as_deref(), Some("R1"));
        assert_eq!(token.expires_at, now + Duration::seconds(1800));
        assert_eq!(token.authorization_value(), "Bearer A1");
    }

    #[test]
    fn missing_fields_use_defaults_and_previous_refresh() {
        let now = Utc::now();
        let token = AccessToken::from_response(
            response(serde_json::json!({"access_token": "A2"})),
            now,
            Some("R-old".to_string()),
        );
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.refresh_token.as_deref(), Some("R-old"));
        assert_eq!(
            token.expires_at,
            now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS)
        );
    }

    #[test]
    fn access_token_required() {
        let result = serde_json::from_value::<TokenResponse>(serde_json::json!({
            "error": "invalid_grant"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn validity_window_is_exclusive() {
        let now = Utc::now();
        let token = AccessToken::from_response(
            response(serde_json::json!({"access_token": "A", "expires_in": 60})),
            now,
            None,
        );
        assert!(token.is_valid_at(now + Duration::seconds(59)));
        assert!(!token.is_valid_at(now + Duration::seconds(60)));
    }

    #[test]
    fn cached_session_token_lives_29_minutes() {
        let now = Utc::now();
        let cached = CachedSessionToken::new("T".to_string(), now);
        assert!(cached.is_valid_at(now + Duration::minutes(28)));
        assert!(!cached.is_valid_at(now + Duration::minutes(29)));
    }
}
