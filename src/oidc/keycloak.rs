//! HTTP adapter for a Keycloak realm.
//!
//! Implements [`OidcClient`] against the realm's `protocol/openid-connect`
//! endpoints. The redirect-based flows (login, logout, registration) only
//! build the provider URL; the surrounding shell performs the navigation and
//! the code exchange completes in the redirect relay, outside this crate.
//!
//! Silent SSO in a non-browser host works off a previously persisted refresh
//! token: `init` with a restored token validates it against the token
//! endpoint, and with no stored token reports unauthenticated without
//! touching the network.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info_span, Instrument};
use url::Url;

use crate::oidc::claims::AccessTokenClaims;
use crate::oidc::error::{provider_error_message, SessionError};
use crate::oidc::profile::UserProfile;
use crate::oidc::{InitOptions, OidcClient, OidcConfig, PkceMethod, APP_USER_AGENT};

/// Successful response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Token pair plus derived state, owned by the adapter.
#[derive(Default)]
struct TokenState {
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    claims: Option<AccessTokenClaims>,
    authenticated: bool,
}

pub struct KeycloakAdapter {
    config: OidcConfig,
    http: Client,
    options: RwLock<InitOptions>,
    state: RwLock<TokenState>,
}

impl KeycloakAdapter {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: OidcConfig) -> Result<Self, SessionError> {
        let http = Client::builder().user_agent(APP_USER_AGENT).build()?;

        Ok(Self {
            config,
            http,
            options: RwLock::new(InitOptions::default()),
            state: RwLock::new(TokenState::default()),
        })
    }

    /// Seed the adapter with a refresh token persisted by an earlier session,
    /// so the next `init` can silently re-establish it.
    pub fn restore_session(&self, refresh_token: SecretString) {
        let mut state = self.state.write();
        state.refresh_token = Some(refresh_token);
    }

    fn current_refresh_token(&self) -> Option<SecretString> {
        self.state.read().refresh_token.clone()
    }

    fn clear_session(&self) {
        let mut state = self.state.write();
        *state = TokenState::default();
    }

    /// Store a fresh token pair, re-deriving claims.
    fn store_tokens(&self, response: TokenResponse) -> Result<(), SessionError> {
        let claims = AccessTokenClaims::decode(&response.access_token)?;

        let mut state = self.state.write();
        state.access_token = Some(SecretString::from(response.access_token));
        if let Some(refresh) = response.refresh_token {
            state.refresh_token = Some(SecretString::from(refresh));
        }
        state.claims = Some(claims);
        state.authenticated = true;

        Ok(())
    }

    /// Exchange the current refresh token for a fresh token pair.
    async fn refresh_grant(&self) -> Result<(), SessionError> {
        let refresh_token = self
            .current_refresh_token()
            .ok_or(SessionError::NotAuthenticated)?;

        let token_url = self.config.protocol_endpoint("token")?;

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token.expose_secret()),
        ];

        let span = info_span!(
            "oidc.refresh_token",
            http.method = "POST",
            url = %token_url
        );
        let response = self
            .http
            .post(token_url.clone())
            .form(&params)
            .send()
            .instrument(span)
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let json_response: Value = response.json().await.unwrap_or_default();

            return Err(SessionError::Provider {
                url: token_url.to_string(),
                status,
                message: provider_error_message(&json_response).to_string(),
            });
        }

        let tokens: TokenResponse = response.json().await?;
        self.store_tokens(tokens)
    }

    fn authorization_url(&self, endpoint: &str) -> Result<Url, SessionError> {
        let options = self.options.read();

        let mut url = self.config.protocol_endpoint(endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("response_type", "code")
                .append_pair("scope", "openid");

            if let Some(redirect_uri) = &options.redirect_uri {
                query.append_pair("redirect_uri", redirect_uri);
            }

            match options.pkce_method {
                PkceMethod::S256 => {
                    query.append_pair("code_challenge_method", "S256");
                }
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl OidcClient for KeycloakAdapter {
    async fn init(&self, options: &InitOptions) -> Result<bool, SessionError> {
        *self.options.write() = options.clone();

        if self.current_refresh_token().is_none() {
            debug!("no persisted session to resume");
            return Ok(false);
        }

        match self.refresh_grant().await {
            Ok(()) => Ok(true),
            Err(SessionError::Provider { status, message, .. }) => {
                // The provider rejected the stored token (expired, revoked);
                // that is "no session", not an initialization failure.
                debug!(%status, message, "persisted session was not accepted");
                self.clear_session();
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn login(&self) -> Result<Url, SessionError> {
        self.authorization_url("auth")
    }

    async fn logout(&self) -> Result<Url, SessionError> {
        let options = self.options.read().clone();

        let mut url = self.config.protocol_endpoint("logout")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);

            if let Some(redirect_uri) = &options.redirect_uri {
                query.append_pair("post_logout_redirect_uri", redirect_uri);
            }
        }

        self.clear_session();

        Ok(url)
    }

    async fn register(&self) -> Result<Url, SessionError> {
        self.authorization_url("registrations")
    }

    async fn refresh(&self, min_validity: Duration) -> Result<bool, SessionError> {
        let still_valid = {
            let state = self.state.read();

            if !state.authenticated {
                return Err(SessionError::NotAuthenticated);
            }

            state
                .claims
                .as_ref()
                .is_some_and(|claims| !claims.expires_within(min_validity))
        };

        if still_valid {
            debug!("access token still valid, skipping refresh");
            return Ok(false);
        }

        self.refresh_grant().await?;
        Ok(true)
    }

    async fn load_user_profile(&self) -> Result<UserProfile, SessionError> {
        let access_token = self.access_token().ok_or(SessionError::NotAuthenticated)?;

        let userinfo_url = self.config.protocol_endpoint("userinfo")?;

        let span = info_span!(
            "oidc.userinfo",
            http.method = "GET",
            url = %userinfo_url
        );
        let response = self
            .http
            .get(userinfo_url.clone())
            .bearer_auth(access_token.expose_secret())
            .send()
            .instrument(span)
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let json_response: Value = response.json().await.unwrap_or_default();

            return Err(SessionError::Provider {
                url: userinfo_url.to_string(),
                status,
                message: provider_error_message(&json_response).to_string(),
            });
        }

        Ok(response.json().await?)
    }

    fn account_management_url(&self) -> Result<Url, SessionError> {
        self.config.account_url()
    }

    fn access_token(&self) -> Option<SecretString> {
        self.state.read().access_token.clone()
    }

    fn refresh_token(&self) -> Option<SecretString> {
        self.current_refresh_token()
    }

    fn parsed_claims(&self) -> Option<AccessTokenClaims> {
        self.state.read().claims.clone()
    }

    fn authenticated(&self) -> bool {
        self.state.read().authenticated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64ct::{Base64UrlUnpadded, Encoding};
    use serde_json::json;
    use std::net::TcpListener;
    use std::time::{SystemTime, UNIX_EPOCH};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/realms/r1/protocol/openid-connect/token";
    const USERINFO_PATH: &str = "/realms/r1/protocol/openid-connect/userinfo";

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn config(url: &str) -> OidcConfig {
        OidcConfig {
            url: url.to_string(),
            realm: "r1".to_string(),
            client_id: "c1".to_string(),
        }
    }

    fn jwt(payload: &serde_json::Value) -> String {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"RS256","typ":"JWT"}"#);
        let body = Base64UrlUnpadded::encode_string(payload.to_string().as_bytes());
        format!("{header}.{body}.sig")
    }

    fn fresh_access_token() -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 3600;
        jwt(&json!({
            "sub": "1234",
            "exp": exp,
            "realm_access": {"roles": ["admin", "user"]}
        }))
    }

    async fn authenticated_adapter(server: &MockServer) -> KeycloakAdapter {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_id=c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": fresh_access_token(),
                "refresh_token": "refresh-2",
                "token_type": "Bearer",
                "expires_in": 300
            })))
            .up_to_n_times(1)
            .mount(server)
            .await;

        let adapter = KeycloakAdapter::new(config(&server.uri())).unwrap();
        adapter.restore_session(SecretString::from("refresh-1".to_string()));

        let authenticated = adapter.init(&InitOptions::default()).await.unwrap();
        assert!(authenticated);
        adapter
    }

    #[tokio::test]
    async fn init_without_persisted_session_resolves_false() {
        let adapter = KeycloakAdapter::new(config("http://idp.test")).unwrap();

        let authenticated = adapter.init(&InitOptions::default()).await.unwrap();

        assert!(!authenticated);
        assert!(!adapter.authenticated());
        assert!(adapter.access_token().is_none());
    }

    #[tokio::test]
    async fn init_with_restored_refresh_token_authenticates() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        let adapter = authenticated_adapter(&server).await;

        assert!(adapter.authenticated());
        assert!(adapter.access_token().is_some());
        assert_eq!(
            adapter.refresh_token().unwrap().expose_secret(),
            "refresh-2"
        );
        let claims = adapter.parsed_claims().unwrap();
        assert!(claims.realm_roles().contains("admin"));
    }

    #[tokio::test]
    async fn init_with_rejected_token_resolves_false_and_clears_state() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Token is not active"
            })))
            .mount(&server)
            .await;

        let adapter = KeycloakAdapter::new(config(&server.uri())).unwrap();
        adapter.restore_session(SecretString::from("stale".to_string()));

        let authenticated = adapter.init(&InitOptions::default()).await.unwrap();

        assert!(!authenticated);
        assert!(!adapter.authenticated());
        assert!(adapter.refresh_token().is_none());
    }

    #[tokio::test]
    async fn refresh_skips_while_token_is_valid() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        let adapter = authenticated_adapter(&server).await;

        let refreshed = adapter.refresh(Duration::from_secs(30)).await.unwrap();

        assert!(!refreshed);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1, "only the init exchange should have run");
    }

    #[tokio::test]
    async fn refresh_surfaces_provider_error() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        let adapter = authenticated_adapter(&server).await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(502).set_body_json(json!({
                "error": "server_error",
                "error_description": "upstream exploded"
            })))
            .mount(&server)
            .await;

        // A window larger than the token lifetime forces the exchange.
        let result = adapter.refresh(Duration::from_secs(7200)).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("upstream exploded"), "{err}");
    }

    #[tokio::test]
    async fn refresh_without_session_errors() {
        let adapter = KeycloakAdapter::new(config("http://idp.test")).unwrap();
        let err = adapter.refresh(Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));
    }

    #[tokio::test]
    async fn load_user_profile_sends_bearer_token() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        let adapter = authenticated_adapter(&server).await;
        let bearer = format!(
            "Bearer {}",
            adapter.access_token().unwrap().expose_secret()
        );

        Mock::given(method("GET"))
            .and(path(USERINFO_PATH))
            .and(header("authorization", bearer.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "1234",
                "preferred_username": "alice"
            })))
            .mount(&server)
            .await;

        let profile = adapter.load_user_profile().await.unwrap();
        assert_eq!(profile.preferred_username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn load_user_profile_without_session_errors() {
        let adapter = KeycloakAdapter::new(config("http://idp.test")).unwrap();
        let err = adapter.load_user_profile().await.unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));
    }

    #[tokio::test]
    async fn login_url_carries_authorization_parameters() {
        let adapter = KeycloakAdapter::new(config("http://idp.test")).unwrap();
        let options = InitOptions {
            redirect_uri: Some("http://app.test/callback".to_string()),
            ..InitOptions::default()
        };
        let _ = adapter.init(&options).await.unwrap();

        let url = adapter.login().await.unwrap();

        assert_eq!(url.path(), "/realms/r1/protocol/openid-connect/auth");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("client_id".to_string(), "c1".to_string())));
        assert!(query.contains(&("response_type".to_string(), "code".to_string())));
        assert!(query.contains(&("code_challenge_method".to_string(), "S256".to_string())));
        assert!(query.contains(&(
            "redirect_uri".to_string(),
            "http://app.test/callback".to_string()
        )));
    }

    #[test]
    fn account_management_url_targets_account_console() {
        let adapter = KeycloakAdapter::new(config("http://idp.test")).unwrap();
        let url = adapter.account_management_url().unwrap();
        assert_eq!(url.path(), "/realms/r1/account");
    }

    #[tokio::test]
    async fn register_url_targets_registrations_endpoint() {
        let adapter = KeycloakAdapter::new(config("http://idp.test")).unwrap();
        let url = adapter.register().await.unwrap();
        assert_eq!(
            url.path(),
            "/realms/r1/protocol/openid-connect/registrations"
        );
    }

    #[tokio::test]
    async fn logout_clears_local_tokens() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        let adapter = authenticated_adapter(&server).await;

        let url = adapter.logout().await.unwrap();

        assert_eq!(url.path(), "/realms/r1/protocol/openid-connect/logout");
        assert!(!adapter.authenticated());
        assert!(adapter.access_token().is_none());
        assert!(adapter.refresh_token().is_none());
    }
}
