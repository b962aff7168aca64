//! Access token claims.
//!
//! Claims are read straight out of the JWT payload segment without verifying
//! the signature; this crate only consumes tokens it received from the
//! provider over TLS, and server-side validation is out of scope.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};

use crate::oidc::error::SessionError;

/// Realm-level role grants (`realm_access` claim).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Parsed access token payload.
///
/// Only the claims this crate acts on are typed; everything else the provider
/// adds (protocol mappers, audience chains) is kept in `additional`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiration time, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Realm roles; absent when the provider issued no realm grants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RealmAccess>,

    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl AccessTokenClaims {
    /// Decode the payload segment of a compact JWT.
    ///
    /// # Errors
    /// Returns an error if the token is not three dot-separated segments, the
    /// payload is not base64url, or the payload is not a JSON claim set.
    pub fn decode(token: &str) -> Result<Self, SessionError> {
        let mut segments = token.split('.');

        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) if segments.next().is_none() => payload,
            _ => {
                return Err(SessionError::MalformedToken(
                    "expected three dot-separated segments".to_string(),
                ))
            }
        };

        let bytes = Base64UrlUnpadded::decode_vec(payload)
            .map_err(|e| SessionError::MalformedToken(format!("payload is not base64url: {e}")))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| SessionError::MalformedToken(format!("payload is not a claim set: {e}")))
    }

    /// Realm roles as a set; empty when the claim is absent.
    #[must_use]
    pub fn realm_roles(&self) -> HashSet<String> {
        self.realm_access
            .as_ref()
            .map(|access| access.roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the token expires within `window` from now.
    ///
    /// A token without an `exp` claim is treated as already expired so the
    /// renewal path always refreshes it.
    #[must_use]
    pub fn expires_within(&self, window: Duration) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        match self.exp {
            Some(exp) => exp <= now.saturating_add(window.as_secs()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_with_payload(payload: &serde_json::Value) -> String {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"RS256","typ":"JWT"}"#);
        let body = Base64UrlUnpadded::encode_string(payload.to_string().as_bytes());
        format!("{header}.{body}.signature")
    }

    fn far_future() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 3600
    }

    #[test]
    fn decodes_realm_roles() {
        let token = token_with_payload(&json!({
            "sub": "1234",
            "preferred_username": "alice",
            "realm_access": {"roles": ["admin", "user"]}
        }));

        let claims = AccessTokenClaims::decode(&token).unwrap();
        assert_eq!(claims.preferred_username.as_deref(), Some("alice"));
        assert!(claims.realm_roles().contains("admin"));
        assert!(claims.realm_roles().contains("user"));
        assert_eq!(claims.realm_roles().len(), 2);
    }

    #[test]
    fn missing_realm_access_yields_empty_set() {
        let token = token_with_payload(&json!({"sub": "1234"}));
        let claims = AccessTokenClaims::decode(&token).unwrap();
        assert!(claims.realm_roles().is_empty());
    }

    #[test]
    fn unknown_claims_are_preserved() {
        let token = token_with_payload(&json!({"sub": "1", "azp": "angular-app"}));
        let claims = AccessTokenClaims::decode(&token).unwrap();
        assert_eq!(
            claims.additional.get("azp").and_then(|v| v.as_str()),
            Some("angular-app")
        );
    }

    #[test]
    fn rejects_token_without_three_segments() {
        let err = AccessTokenClaims::decode("not-a-jwt").unwrap_err();
        assert!(err.to_string().contains("three dot-separated segments"));
    }

    #[test]
    fn rejects_non_json_payload() {
        let payload = Base64UrlUnpadded::encode_string(b"plain text");
        let err = AccessTokenClaims::decode(&format!("h.{payload}.s")).unwrap_err();
        assert!(err.to_string().contains("not a claim set"));
    }

    #[test]
    fn expiry_window() {
        let fresh = AccessTokenClaims {
            exp: Some(far_future()),
            ..AccessTokenClaims::default()
        };
        assert!(!fresh.expires_within(Duration::from_secs(30)));
        assert!(fresh.expires_within(Duration::from_secs(7200)));

        let no_exp = AccessTokenClaims::default();
        assert!(no_exp.expires_within(Duration::from_secs(0)));
    }
}
