//! Boundary to the external identity provider.
//!
//! The session manager drives a provider through the narrow [`OidcClient`]
//! trait; [`keycloak::KeycloakAdapter`] is the production implementation,
//! speaking to a Keycloak realm's `protocol/openid-connect` endpoints.

pub mod claims;
pub mod error;
pub mod keycloak;
pub mod profile;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::oidc::claims::AccessTokenClaims;
use crate::oidc::error::SessionError;
use crate::oidc::profile::UserProfile;

pub(crate) static APP_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Identity provider endpoint, tenant realm and registered client.
///
/// There are no safe defaults; every deployment must supply its own values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// Base URL of the provider, e.g. `http://localhost:8080`.
    pub url: String,
    /// Realm (tenant) name.
    pub realm: String,
    /// Client ID registered in the realm.
    pub client_id: String,
}

impl OidcConfig {
    /// URL of an `openid-connect` protocol endpoint within the realm.
    ///
    /// # Errors
    /// Returns an error if the configured base URL cannot be parsed or
    /// cannot serve as a base (e.g. `mailto:`).
    pub fn protocol_endpoint(&self, endpoint: &str) -> Result<Url, SessionError> {
        let base = Url::parse(&self.url)?;
        let path = format!(
            "{}/realms/{}/protocol/openid-connect/{endpoint}",
            base.path().trim_end_matches('/'),
            self.realm
        );
        let mut url = base;
        url.set_path(&path);
        Ok(url)
    }

    /// URL of the realm's account console.
    ///
    /// # Errors
    /// Returns an error if the configured base URL cannot be parsed.
    pub fn account_url(&self) -> Result<Url, SessionError> {
        let base = Url::parse(&self.url)?;
        let path = format!(
            "{}/realms/{}/account",
            base.path().trim_end_matches('/'),
            self.realm
        );
        let mut url = base;
        url.set_path(&path);
        Ok(url)
    }
}

/// How initialization behaves when no provider session is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnLoad {
    /// Silent, non-interactive detection of an existing session.
    CheckSso,
    /// Force a redirect to the provider's login page.
    LoginRequired,
}

/// PKCE challenge method advertised in authorization requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceMethod {
    S256,
}

/// Options passed to [`OidcClient::init`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitOptions {
    pub on_load: OnLoad,
    /// Static page able to relay the provider's silent-check redirect back
    /// without a full page reload.
    pub silent_check_sso_redirect_uri: Option<String>,
    /// Where interactive login/logout flows return to.
    pub redirect_uri: Option<String>,
    pub pkce_method: PkceMethod,
    /// Login-status iframe polling; off by default to avoid
    /// third-party-cookie breakage.
    pub check_login_iframe: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            on_load: OnLoad::CheckSso,
            silent_check_sso_redirect_uri: None,
            redirect_uri: None,
            pkce_method: PkceMethod::S256,
            check_login_iframe: false,
        }
    }
}

/// The narrow interface the session manager drives.
///
/// `login`/`logout`/`register` begin redirect flows: they return the provider
/// URL the surrounding shell must navigate to, and nothing about the local
/// session changes until that redirect cycle re-initializes the manager.
#[async_trait]
pub trait OidcClient: Send + Sync + 'static {
    /// Attempt to establish (or silently detect) a provider session.
    async fn init(&self, options: &InitOptions) -> Result<bool, SessionError>;

    /// Begin an interactive login redirect.
    async fn login(&self) -> Result<Url, SessionError>;

    /// Begin a logout redirect. Local tokens are cleared.
    async fn logout(&self) -> Result<Url, SessionError>;

    /// Begin a registration redirect.
    async fn register(&self) -> Result<Url, SessionError>;

    /// Refresh the access token if it expires within `min_validity`.
    ///
    /// Returns `true` when a new token was obtained, `false` when the current
    /// one is still valid beyond the window.
    async fn refresh(&self, min_validity: Duration) -> Result<bool, SessionError>;

    /// Fetch the user's profile from the provider.
    async fn load_user_profile(&self) -> Result<UserProfile, SessionError>;

    /// URL of the provider's account management console.
    fn account_management_url(&self) -> Result<Url, SessionError>;

    /// Current access token, if a session exists.
    fn access_token(&self) -> Option<SecretString>;

    /// Current refresh token, if a session exists.
    fn refresh_token(&self) -> Option<SecretString>;

    /// Claims parsed from the current access token.
    fn parsed_claims(&self) -> Option<AccessTokenClaims>;

    /// Last-known authentication state.
    fn authenticated(&self) -> bool;
}
