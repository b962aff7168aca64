use anyhow::Result;
use secrecy::SecretString;

use crate::cli::actions::Action;
use crate::oidc::OidcConfig;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let required = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{name}"))
    };

    Ok(Action::Watch {
        config: OidcConfig {
            url: required("url")?,
            realm: required("realm")?,
            client_id: required("client-id")?,
        },
        refresh_token: matches
            .get_one::<String>("refresh-token")
            .map(|token| SecretString::from(token.clone())),
        redirect_uri: matches.get_one::<String>("redirect-uri").cloned(),
    })
}
