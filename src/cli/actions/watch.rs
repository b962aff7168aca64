use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::cli::actions::Action;
use crate::oidc::keycloak::KeycloakAdapter;
use crate::oidc::InitOptions;
use crate::session::SessionManager;

/// Handle the watch action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Watch {
            config,
            refresh_token,
            redirect_uri,
        } => {
            let adapter = KeycloakAdapter::new(config)?;

            if let Some(token) = refresh_token {
                adapter.restore_session(token);
            }

            let options = InitOptions {
                redirect_uri,
                ..InitOptions::default()
            };

            let manager = SessionManager::new();
            let mut changes = manager.authentication_changes();

            let authenticated = manager.initialize_with(Arc::new(adapter), options).await;
            info!(authenticated, "session initialized");

            if authenticated {
                for role in manager.roles_of_current_user() {
                    info!(role = %role, "realm role");
                }
            }
            changes.mark_unchanged();

            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let authenticated = *changes.borrow_and_update();
                        info!(authenticated, "authentication state changed");
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutting down");
                        break;
                    }
                }
            }

            Ok(())
        }
    }
}
