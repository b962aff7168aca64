use reqwest::StatusCode;
use serde_json::Value;

/// Errors surfaced by the OIDC client adapter.
///
/// The session manager never lets these escape to subscribers: every variant
/// is caught at the manager boundary, logged, and collapsed into a safe
/// default (`false`, `None` or an empty set).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the identity provider, with the
    /// `error`/`error_description` fields Keycloak puts in error bodies.
    #[error("{url} - {status}, {message}")]
    Provider {
        url: String,
        status: StatusCode,
        message: String,
    },

    #[error("invalid provider URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed access token: {0}")]
    MalformedToken(String),

    #[error("no active session")]
    NotAuthenticated,
}

/// Extract the human-readable message from a Keycloak error body.
///
/// Token endpoint errors look like `{"error": "...", "error_description": "..."}`.
pub(crate) fn provider_error_message(json_response: &Value) -> &str {
    json_response
        .get("error_description")
        .or_else(|| json_response.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("")
}
