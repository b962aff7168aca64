//! Session lifecycle state machine.
//!
//! [`SessionManager`] owns the published authentication state, drives the
//! OIDC client adapter through initialization and renewal, and answers
//! profile and role queries for the embedding application.
//!
//! Lifecycle: `Uninitialized -> Initializing -> {Authenticated,
//! Unauthenticated}`. The renewal loop runs exactly while the last published
//! state was authenticated; leaving `Authenticated` happens through a logout
//! or login redirect cycle that re-initializes a fresh manager.
//!
//! No failure inside the manager escapes to subscribers: adapter errors are
//! logged and collapsed into `false`, `None` or empty values.

pub mod renew;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use secrecy::SecretString;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::oidc::keycloak::KeycloakAdapter;
use crate::oidc::profile::UserProfile;
use crate::oidc::{InitOptions, OidcClient, OidcConfig};

pub use renew::RenewalPolicy;

pub struct SessionManager {
    client: RwLock<Option<Arc<dyn OidcClient>>>,
    policy: RenewalPolicy,
    auth_tx: watch::Sender<bool>,
    renewer: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(RenewalPolicy::default())
    }

    /// A manager with a custom renewal cadence.
    #[must_use]
    pub fn with_policy(policy: RenewalPolicy) -> Self {
        let (auth_tx, _) = watch::channel(false);

        Self {
            client: RwLock::new(None),
            policy,
            auth_tx,
            renewer: Mutex::new(None),
        }
    }

    /// Construct the Keycloak adapter from `config` and establish the session.
    ///
    /// Publishes the resulting state to all subscribers and starts the
    /// renewal loop iff the provider reported an authenticated session.
    /// Failures are logged and published as unauthenticated; this never
    /// panics or returns an error.
    pub async fn initialize(&self, config: OidcConfig, options: InitOptions) -> bool {
        let adapter = match KeycloakAdapter::new(config) {
            Ok(adapter) => Arc::new(adapter),
            Err(e) => {
                error!("failed to construct provider client: {e}");
                self.auth_tx.send_replace(false);
                self.stop_renewer();
                return false;
            }
        };

        self.initialize_with(adapter, options).await
    }

    /// Establish the session through an already-built adapter.
    ///
    /// Same lifecycle as [`initialize`](Self::initialize); this is also the
    /// seam for supplying a non-Keycloak [`OidcClient`].
    pub async fn initialize_with(
        &self,
        client: Arc<dyn OidcClient>,
        options: InitOptions,
    ) -> bool {
        *self.client.write() = Some(client.clone());

        let authenticated = match client.init(&options).await {
            Ok(authenticated) => authenticated,
            Err(e) => {
                error!("failed to initialize provider session: {e}");
                false
            }
        };

        self.auth_tx.send_replace(authenticated);

        self.stop_renewer();
        if authenticated {
            info!("user is authenticated");
            *self.renewer.lock() = Some(renew::spawn_renewer(client, self.policy));
        }

        authenticated
    }

    /// Subscribe to authentication-state changes.
    ///
    /// The receiver replays the latest published state (`borrow`) and then
    /// observes every subsequent transition (`changed`). The stream never
    /// errors while the manager is alive; failures surface as `false` states.
    #[must_use]
    pub fn authentication_changes(&self) -> watch::Receiver<bool> {
        self.auth_tx.subscribe()
    }

    /// Last-known state from the adapter. May be momentarily stale relative
    /// to the published stream.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.client().is_some_and(|client| client.authenticated())
    }

    #[must_use]
    pub fn current_access_token(&self) -> Option<SecretString> {
        self.client().and_then(|client| client.access_token())
    }

    #[must_use]
    pub fn current_refresh_token(&self) -> Option<SecretString> {
        self.client().and_then(|client| client.refresh_token())
    }

    /// Begin a login redirect at the provider. Fire-and-forget: the resulting
    /// state change arrives only after the redirect cycle re-initializes a
    /// manager.
    pub async fn login(&self) {
        let Some(client) = self.client() else {
            warn!("login requested before initialization; ignoring");
            return;
        };

        match client.login().await {
            Ok(url) => info!(%url, "redirecting to provider login"),
            Err(e) => warn!("failed to begin login redirect: {e}"),
        }
    }

    /// Begin a logout redirect at the provider.
    pub async fn logout(&self) {
        let Some(client) = self.client() else {
            warn!("logout requested before initialization; ignoring");
            return;
        };

        match client.logout().await {
            Ok(url) => info!(%url, "redirecting to provider logout"),
            Err(e) => warn!("failed to begin logout redirect: {e}"),
        }
    }

    /// Begin a registration redirect at the provider.
    pub async fn register(&self) {
        let Some(client) = self.client() else {
            warn!("registration requested before initialization; ignoring");
            return;
        };

        match client.register().await {
            Ok(url) => info!(%url, "redirecting to provider registration"),
            Err(e) => warn!("failed to begin registration redirect: {e}"),
        }
    }

    /// One-shot token refresh with the given minimum validity window.
    ///
    /// Returns whether a new token was obtained; provider failures are
    /// logged and reported as `false`.
    pub async fn update_token(&self, min_validity: Duration) -> bool {
        let Some(client) = self.client() else {
            warn!("token update requested before initialization; ignoring");
            return false;
        };

        match client.refresh(min_validity).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!("failed to update token: {e}");
                false
            }
        }
    }

    /// Fetch the user's profile from the provider.
    ///
    /// `None` immediately when unauthenticated (the adapter is not invoked),
    /// and `None` with a log entry when the fetch fails.
    pub async fn fetch_user_profile(&self) -> Option<UserProfile> {
        let client = self.client()?;

        if !client.authenticated() {
            return None;
        }

        match client.load_user_profile().await {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("failed to load user profile: {e}");
                None
            }
        }
    }

    /// Provider account-console URL for the shell to open.
    #[must_use]
    pub fn account_management_url(&self) -> Option<url::Url> {
        let client = self.client()?;

        match client.account_management_url() {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("failed to build account management URL: {e}");
                None
            }
        }
    }

    /// Realm roles from the current access token; empty when unauthenticated
    /// or the claim is absent.
    #[must_use]
    pub fn roles_of_current_user(&self) -> HashSet<String> {
        self.client()
            .and_then(|client| client.parsed_claims())
            .map(|claims| claims.realm_roles())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn current_user_has_role(&self, role: &str) -> bool {
        self.roles_of_current_user().contains(role)
    }

    fn client(&self) -> Option<Arc<dyn OidcClient>> {
        self.client.read().clone()
    }

    fn stop_renewer(&self) {
        if let Some(handle) = self.renewer.lock().take() {
            handle.abort();
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // Renewal is scoped to the owning manager; do not leak timers across
        // reconstructions.
        self.stop_renewer();
    }
}
