pub mod watch;

use secrecy::SecretString;

use crate::oidc::OidcConfig;

#[derive(Debug)]
pub enum Action {
    /// Establish a session and log every authentication-state transition.
    Watch {
        config: OidcConfig,
        /// Refresh token persisted by an earlier session, for silent sign-on.
        refresh_token: Option<SecretString>,
        redirect_uri: Option<String>,
    },
}
