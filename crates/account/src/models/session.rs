//! Session state machine value.

use std::sync::Arc;

use crate::models::User;

/// The three-state gating machine every view depends on.
///
/// One process-wide instance, owned by the session synchronizer. Starts in
/// `Loading`, resolves to `Authenticated` or `Anonymous` once the first
/// identity-provider callback settles, and is replaced wholesale on every
/// later transition - readers always see a complete snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Startup: no identity-provider callback has settled yet. The only
    /// state in which no render/redirect decision may be made.
    Loading,
    /// A signed-in account with its merged view-model.
    Authenticated(Arc<User>),
    /// Resolved: nobody is signed in.
    Anonymous,
}

impl SessionState {
    /// Whether the first identity-provider callback is still outstanding.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Whether a signed-in account is current.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Whether the session resolved to signed-out.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// The current user, when authenticated.
    #[must_use]
    pub const fn user(&self) -> Option<&Arc<User>> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::Loading | Self::Anonymous => None,
        }
    }
}
