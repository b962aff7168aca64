//! Background token renewal.
//!
//! One task per authenticated session: every tick asks the adapter to refresh
//! the access token if it is about to fall below the minimum validity window.
//! A failed tick is logged and the loop keeps running; the token's own expiry
//! at the provider is what eventually ends a session that can no longer be
//! renewed. Nothing here forces a logout.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::oidc::OidcClient;

/// Cadence of the renewal loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPolicy {
    /// How often a renewal tick fires.
    pub interval: Duration,
    /// Refresh once the access token has less than this much validity left.
    pub min_validity: Duration,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            min_validity: Duration::from_secs(30),
        }
    }
}

/// Spawn the renewal task for an authenticated session.
///
/// The caller owns the returned handle and aborts it when the session is
/// re-initialized or the manager is dropped.
pub(crate) fn spawn_renewer(
    client: Arc<dyn OidcClient>,
    policy: RenewalPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(policy.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // An interval's first tick completes immediately; consume it so the
        // first refresh happens one full period after authentication.
        tick.tick().await;

        loop {
            tick.tick().await;

            match client.refresh(policy.min_validity).await {
                Ok(true) => debug!("access token refreshed"),
                Ok(false) => debug!("access token still valid"),
                Err(e) => warn!("failed to refresh token: {e}"),
            }
        }
    })
}
