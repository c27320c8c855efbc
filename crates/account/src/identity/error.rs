//! Identity provider error types.

use thiserror::Error;

/// Errors surfaced by the identity provider adapter.
///
/// Identity failures are the primary source of truth and are always
/// surfaced to the caller, never recovered silently.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Wrong credentials on sign-in.
    ///
    /// Deliberately does not say whether the email or the secret was wrong.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Sign-up rejected because the email is already registered.
    #[error("an account with this email already exists")]
    EmailAlreadyRegistered,

    /// Sign-up rejected because the secret does not meet requirements.
    #[error("secret rejected: {0}")]
    WeakSecret(String),

    /// An operation that needs an active session was called signed out.
    #[error("no active session")]
    NoSession,

    /// The refresh grant for a stale token failed.
    #[error("token refresh failed")]
    TokenRefresh,

    /// Provider returned an error code this adapter has no mapping for.
    #[error("identity provider error: {code}")]
    Provider {
        /// Provider-assigned error code.
        code: String,
    },

    /// The provider response could not be interpreted.
    #[error("invalid identity payload: {0}")]
    InvalidPayload(String),

    /// Network-level failure talking to the provider.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl IdentityError {
    /// Map a provider error code to the adapter taxonomy.
    ///
    /// Codes that reveal which credential field was wrong collapse into
    /// [`IdentityError::AuthenticationFailed`] to avoid account
    /// enumeration.
    #[must_use]
    pub fn from_provider_code(code: &str) -> Self {
        match code {
            "INVALID_CREDENTIALS" | "EMAIL_NOT_FOUND" | "INVALID_SECRET" | "ACCOUNT_DISABLED" => {
                Self::AuthenticationFailed
            }
            "EMAIL_EXISTS" => Self::EmailAlreadyRegistered,
            code if code.starts_with("WEAK_SECRET") => {
                let detail = code
                    .split_once(':')
                    .map_or("does not meet requirements", |(_, rest)| rest.trim());
                Self::WeakSecret(detail.to_owned())
            }
            "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" => Self::TokenRefresh,
            other => Self::Provider {
                code: other.to_owned(),
            },
        }
    }
}
