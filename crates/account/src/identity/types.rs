//! Wire types for the identity provider REST API.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Token bundle held for the active session.
#[derive(Debug, Clone)]
pub(super) struct TokenBundle {
    /// Bearer token attached to authorized requests.
    pub id_token: String,
    /// Long-lived token used to mint new id tokens.
    pub refresh_token: String,
    /// Unix timestamp at which `id_token` stops being accepted.
    pub expires_at: i64,
}

impl TokenBundle {
    /// Build a bundle from a provider response, preferring the `exp` claim
    /// embedded in the token itself over the advertised lifetime.
    pub fn new(id_token: String, refresh_token: String, expires_in: i64) -> Self {
        let expires_at =
            token_expiry(&id_token).unwrap_or_else(|| Utc::now().timestamp() + expires_in);
        Self {
            id_token,
            refresh_token,
            expires_at,
        }
    }

    /// Check if the id token is stale (with 60s buffer).
    pub fn is_stale(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at - 60
    }
}

/// Extract the `exp` claim from a JWT without verifying it.
///
/// The backend verifies signatures; this client only needs the expiry to
/// decide when to refresh. Returns `None` for anything that does not look
/// like a JWT, in which case the caller falls back to `expires_in`.
fn token_expiry(token: &str) -> Option<i64> {
    #[derive(Deserialize)]
    struct Claims {
        exp: i64,
    }

    let mut segments = token.split('.');
    let payload = segments.nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    Some(claims.exp)
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/response DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(super) struct CredentialRequest<'a> {
    pub email: &'a str,
    pub secret: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct UpdateAccountRequest<'a> {
    pub display_name: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct RefreshRequest<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a str,
}

/// Account payload returned by sign-in and sign-up.
#[derive(Debug, Deserialize)]
pub(super) struct AccountResponse {
    pub subject: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Token payload returned by the refresh grant.
#[derive(Debug, Deserialize)]
pub(super) struct RefreshResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Error envelope returned by the provider.
#[derive(Debug, Deserialize)]
pub(super) struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorBody {
    pub code: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Build an unsigned JWT with the given payload json.
    fn fake_jwt(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        format!("{header}.{body}.sig")
    }

    #[test]
    fn test_token_expiry_from_claim() {
        let token = fake_jwt(r#"{"exp":1900000000,"sub":"u1"}"#);
        assert_eq!(token_expiry(&token), Some(1_900_000_000));
    }

    #[test]
    fn test_token_expiry_opaque_token() {
        assert_eq!(token_expiry("not-a-jwt"), None);
        assert_eq!(token_expiry(""), None);
    }

    #[test]
    fn test_bundle_prefers_exp_claim() {
        let token = fake_jwt(r#"{"exp":1900000000}"#);
        let bundle = TokenBundle::new(token, "refresh".to_owned(), 3600);
        assert_eq!(bundle.expires_at, 1_900_000_000);
    }

    #[test]
    fn test_bundle_falls_back_to_expires_in() {
        let before = Utc::now().timestamp();
        let bundle = TokenBundle::new("opaque".to_owned(), "refresh".to_owned(), 3600);
        assert!(bundle.expires_at >= before + 3600);
        assert!(!bundle.is_stale());
    }

    #[test]
    fn test_staleness_buffer() {
        // A token expiring within the 60s buffer counts as stale.
        let bundle = TokenBundle {
            id_token: "t".to_owned(),
            refresh_token: "r".to_owned(),
            expires_at: Utc::now().timestamp() + 30,
        };
        assert!(bundle.is_stale());
    }
}
