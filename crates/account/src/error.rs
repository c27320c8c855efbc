//! Unified error type for frontends.
//!
//! Collects the per-concern errors into one enum and maps each to the
//! short, non-identifying message a UI is allowed to show. Backend bodies,
//! provider codes, and transport details stay in logs.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::identity::IdentityError;
use crate::profile::ProfileError;

/// Application-level error for the account layer.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Identity provider operation failed.
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Profile store mutation failed.
    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Authorized request failed.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl AccountError {
    /// The message a UI may show for this error.
    ///
    /// Deliberately generic for credential failures: no hint about which
    /// field was wrong, no account enumeration.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Identity(err) => match err {
                IdentityError::AuthenticationFailed => "Sign-in failed. Check your details and try again.",
                IdentityError::EmailAlreadyRegistered => "An account with this email already exists.",
                IdentityError::WeakSecret(_) => "That password does not meet the requirements.",
                IdentityError::NoSession => "You are signed out. Please sign in.",
                IdentityError::TokenRefresh => "Your session expired. Please sign in again.",
                IdentityError::Provider { .. }
                | IdentityError::InvalidPayload(_)
                | IdentityError::Transport(_) => "Something went wrong. Please try again.",
            },
            Self::Api(err) => match err {
                ApiError::Unauthenticated => "You are signed out. Please sign in.",
                ApiError::AuthorizationRejected { .. } => {
                    "Your session expired. Please sign in again."
                }
                ApiError::Backend { .. }
                | ApiError::Identity(_)
                | ApiError::InvalidPath(_)
                | ApiError::Transport(_) => "Something went wrong. Please try again.",
            },
            Self::Profile(_) | Self::Config(_) => "Something went wrong. Please try again.",
        }
    }
}
