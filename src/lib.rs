//! # oidc-session
//!
//! Client-side session lifecycle manager for an OpenID Connect identity
//! provider (Keycloak-style realms).
//!
//! The crate answers three questions for an application:
//!
//! 1. **Is the user authenticated?** — [`SessionManager::initialize`] runs a
//!    silent-SSO-style detection against the provider and publishes the
//!    result through a replay-latest stream
//!    ([`SessionManager::authentication_changes`]).
//! 2. **What can the user do?** — role queries
//!    ([`SessionManager::roles_of_current_user`],
//!    [`SessionManager::current_user_has_role`]) derived from the access
//!    token's realm roles, and on-demand profile fetches.
//! 3. **Is the token still valid?** — a background renewal loop keeps the
//!    access token fresh for the lifetime of the session, best-effort: a
//!    failed renewal tick is logged and retried on the next tick, never
//!    escalated into a forced logout.
//!
//! Interactive flows (login, logout, registration) are delegated entirely to
//! the provider via redirect URLs; the wire-level code exchange happens in
//! the redirect relay outside this crate, and token signatures are not
//! verified locally.
//!
//! The provider boundary is the [`OidcClient`] trait;
//! [`KeycloakAdapter`](oidc::keycloak::KeycloakAdapter) is the shipped
//! implementation.

pub mod cli;
pub mod oidc;
pub mod session;

pub use oidc::claims::{AccessTokenClaims, RealmAccess};
pub use oidc::error::SessionError;
pub use oidc::keycloak::KeycloakAdapter;
pub use oidc::profile::UserProfile;
pub use oidc::{InitOptions, OidcClient, OidcConfig, OnLoad, PkceMethod};
pub use session::{RenewalPolicy, SessionManager};
