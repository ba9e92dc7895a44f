//! Builds token providers and transports from settings.

use std::sync::Arc;

use anyhow::{Context, Result};
use schwab_auth::{
    AuthenticatedTransport, DelegatedTokenProvider, OAuthConfig, OAuthTokenProvider,
    SessionTokenRequest, SharedTokenProvider,
};
use schwab_core::{HttpTransport, ReqwestTransport};
use schwab_settings::{AuthMode, SchwabSettings};
use schwab_stream::RestPreferenceSource;

/// Transport shared by the REST callers.
pub type SharedTransport = Arc<dyn HttpTransport>;

/// Providers and transports for one run.
pub struct Wiring {
    /// Token source for the login frame and REST calls.
    pub provider: SharedTokenProvider,
    /// Bearer-authenticated REST transport.
    pub rest: SharedTransport,
}

impl Wiring {
    /// Preference lookup through the authenticated REST transport.
    pub fn preferences(&self, settings: &SchwabSettings) -> RestPreferenceSource<SharedTransport> {
        RestPreferenceSource::new(
            Arc::clone(&self.rest),
            &settings.api.base_url,
            &settings.api.user_preference_path,
        )
    }
}

/// OAuth client configuration from the `api` section.
pub fn oauth_config(settings: &SchwabSettings) -> OAuthConfig {
    let api = &settings.api;
    OAuthConfig {
        base_url: api.oauth_base_url(),
        client_id: api.client_id.clone(),
        client_secret: api.client_secret.clone(),
        redirect_uri: api.redirect_uri.clone(),
        authorization_code: api.authorization_code.clone(),
        refresh_token: api.refresh_token.clone(),
    }
}

/// Build over plain `reqwest` transports.
///
/// In delegated mode the session service is called without credentials; use
/// [`build_with`] when it needs a signing transport.
pub fn build(settings: &SchwabSettings) -> Result<Wiring> {
    build_with(settings, Arc::new(ReqwestTransport::new()), Arc::new(ReqwestTransport::new()))
}

/// Build the token provider selected by `auth.mode` and the REST transport.
///
/// `http` carries brokerage traffic. `session` carries the delegated token
/// fetch and must authenticate with the session service itself.
///
/// In OAuth mode the REST stack is `AuthenticatedTransport` over the OAuth
/// provider's own 401 loop, sharing one provider instance.
pub fn build_with(
    settings: &SchwabSettings,
    http: SharedTransport,
    session: SharedTransport,
) -> Result<Wiring> {
    let (provider, raw): (SharedTokenProvider, SharedTransport) = match settings.auth.mode {
        AuthMode::OAuth => {
            let oauth = Arc::new(
                OAuthTokenProvider::new(http, oauth_config(settings))
                    .with_policy(settings.retry.clone()),
            );
            let provider: SharedTokenProvider = oauth.clone();
            let raw: SharedTransport = oauth;
            (provider, raw)
        }
        AuthMode::Delegated => {
            let delegated = settings
                .delegated
                .as_ref()
                .context("delegated mode needs a `delegated` settings section")?;
            let request = SessionTokenRequest::new(
                &delegated.brokerage,
                delegated.deploy_id.clone(),
                delegated.project_id,
                delegated.account_number.clone(),
            );
            let provider: SharedTokenProvider = Arc::new(
                DelegatedTokenProvider::new(session, &delegated.api_url, &request)
                    .context("failed to build delegated token provider")?,
            );
            (provider, http)
        }
    };

    let rest: SharedTransport = Arc::new(
        AuthenticatedTransport::new(raw, Arc::clone(&provider)).with_policy(settings.retry.clone()),
    );
    Ok(Wiring { provider, rest })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use schwab_core::testing::ScriptedTransport;
    use schwab_core::{AUTHORIZATION, HttpResponse, RetryPolicy};
    use schwab_settings::DelegatedSettings;
    use schwab_stream::PreferenceSource;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn oauth_settings() -> SchwabSettings {
        let mut settings = SchwabSettings::default();
        settings.api.base_url = "https://api.example.com".into();
        settings.api.client_id = "abc".into();
        settings.api.client_secret = "xyz".into();
        settings.api.redirect_uri = "https://cb".into();
        settings
    }

    fn delegated_settings() -> SchwabSettings {
        let mut settings = oauth_settings();
        settings.auth.mode = AuthMode::Delegated;
        settings.delegated = Some(DelegatedSettings {
            api_url: "https://session.example.com/api/v2".into(),
            deploy_id: "L-1".into(),
            project_id: 1,
            account_number: "ACC".into(),
            ..DelegatedSettings::default()
        });
        settings
    }

    fn token_json(access: &str, refresh: &str) -> String {
        serde_json::json!({
            "access_token": access,
            "token_type": "Bearer",
            "refresh_token": refresh,
            "expires_in": 1800
        })
        .to_string()
    }

    const PREFERENCES: &str = r#"{"streamerInfo":[{"streamerSocketUrl":"wss://streamer.example.com/ws","schwabClientCustomerId":"CUST","schwabClientCorrelId":"CORR","schwabClientChannel":"N9","schwabClientFunctionId":"APIAPP"}]}"#;

    #[test]
    fn oauth_config_uses_oauth_prefix() {
        let config = oauth_config(&oauth_settings());
        assert_eq!(config.token_url(), "https://api.example.com/v1/oauth/token");
        assert_eq!(
            config.authorization_url(),
            "https://api.example.com/v1/oauth/authorize?client_id=abc&redirect_uri=https%3A%2F%2Fcb"
        );
    }

    #[test]
    fn preference_url_uses_api_base() {
        let settings = oauth_settings();
        let wiring = build(&settings).unwrap();
        assert_eq!(
            wiring.preferences(&settings).url(),
            "https://api.example.com/trader/v1/userPreference"
        );
    }

    #[test]
    fn delegated_mode_requires_section() {
        let mut settings = oauth_settings();
        settings.auth.mode = AuthMode::Delegated;
        assert!(build(&settings).is_err());
        assert!(build(&delegated_settings()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn oauth_rest_stack_recovers_from_401_beneath_bearer_layer() {
        let http = Arc::new(ScriptedTransport::new());
        let _ = http
            .push("/oauth/token", HttpResponse::new(200, token_json("A1", "R1")))
            .push("/oauth/token", HttpResponse::new(200, token_json("A2", "R2")))
            .push("/userPreference", HttpResponse::new(401, ""))
            .push("/userPreference", HttpResponse::new(200, PREFERENCES));
        let mut settings = oauth_settings();
        settings.api.authorization_code = Some("CODE1".into());
        settings.retry = RetryPolicy::new(3, Duration::from_secs(2));

        let wiring = build_with(&settings, http.clone(), Arc::new(ScriptedTransport::new())).unwrap();
        let info = wiring
            .preferences(&settings)
            .streamer_info(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(info.schwab_client_customer_id, "CUST");
        let lookups = http.requests_to("/userPreference");
        assert_eq!(lookups.len(), 2);
        assert_eq!(lookups[0].header(AUTHORIZATION), Some("Bearer A1"));
        assert_eq!(lookups[1].header(AUTHORIZATION), Some("Bearer A2"));

        let exchanges = http.requests_to("/oauth/token");
        assert_eq!(exchanges.len(), 2);
        assert!(exchanges[1].body.as_deref().unwrap().starts_with("grant_type=refresh_token"));
        assert_eq!(
            wiring.provider.get_access_token(&CancellationToken::new()).await.unwrap(),
            "A2"
        );
    }

    #[tokio::test]
    async fn delegated_fetch_goes_through_session_transport() {
        let http = Arc::new(ScriptedTransport::new());
        let session = Arc::new(ScriptedTransport::new());
        let _ = session.push(
            "/live/auth0/refresh",
            HttpResponse::new(200, r#"{"success":true,"accessToken":"S1"}"#),
        );

        let wiring = build_with(&delegated_settings(), http.clone(), session.clone()).unwrap();
        let token = wiring
            .provider
            .get_access_token(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(token, "S1");
        assert_eq!(session.requests().len(), 1);
        assert!(http.requests().is_empty());
    }
}
