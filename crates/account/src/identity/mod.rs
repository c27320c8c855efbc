//! Identity provider adapter.
//!
//! Wraps the external authentication service behind an object-safe trait so
//! the session synchronizer (and tests) can inject any implementation. The
//! provider owns the authenticated identity exclusively: handles are handed
//! out by value and never persisted by this crate.

mod error;
mod rest;
mod types;

pub use error::IdentityError;
pub use rest::RestIdentityClient;

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;

use segno_core::{Email, SubjectId};

/// The provider's view of an authenticated account.
///
/// Carries only what the identity service itself knows; profile fields live
/// in the profile store and are merged later by the session synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityHandle {
    /// Opaque subject id issued by the provider.
    pub subject: SubjectId,
    /// Verified sign-in email.
    pub email: Email,
    /// Whether the provider has verified the email.
    pub email_verified: bool,
    /// Display name held by the provider, if any.
    pub display_name: Option<String>,
    /// Avatar URL held by the provider, if any.
    pub avatar_url: Option<String>,
}

/// Callback invoked on every session change.
///
/// `None` means the session ended (sign-out); `Some` carries the identity
/// that just became current. Listeners must not register or unregister
/// other listeners from inside the callback.
pub type SessionListener = Box<dyn Fn(Option<&IdentityHandle>) + Send + Sync>;

/// An external authentication service.
///
/// Implementations emit a session-changed event for every sign-in and
/// sign-out, including an asynchronous initial delivery of the current
/// session shortly after a listener registers. `sign_out` is idempotent
/// and emits nothing when no session is active.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register a listener for session changes.
    ///
    /// Dropping the returned [`SessionWatch`] unsubscribes the listener.
    fn on_session_changed(&self, listener: SessionListener) -> SessionWatch;

    /// Authenticate with email and secret.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::AuthenticationFailed`] on wrong credentials
    /// (without saying which part was wrong).
    async fn sign_in(&self, email: &str, secret: &str) -> Result<IdentityHandle, IdentityError>;

    /// Create a new account with email and secret.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::EmailAlreadyRegistered`] for a duplicate
    /// email and [`IdentityError::WeakSecret`] for a rejected secret.
    async fn sign_up(&self, email: &str, secret: &str) -> Result<IdentityHandle, IdentityError>;

    /// Set the display name on the current session's account.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::NoSession`] when signed out.
    async fn update_display_name(&self, name: &str) -> Result<(), IdentityError>;

    /// End the current session.
    ///
    /// Resolves successfully (and emits no event) when already signed out.
    ///
    /// # Errors
    ///
    /// Returns an error only for provider-side failures.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Return a bearer token for the current session.
    ///
    /// A token the provider knows to be stale is silently refreshed rather
    /// than returned; `force_refresh` refreshes unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::NoSession`] when signed out and
    /// [`IdentityError::TokenRefresh`] when the refresh grant fails.
    async fn token(&self, force_refresh: bool) -> Result<String, IdentityError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Listener registry
// ─────────────────────────────────────────────────────────────────────────────

struct ListenerEntry {
    id: u64,
    listener: Arc<SessionListener>,
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: Vec<ListenerEntry>,
}

/// Registry of session-changed listeners.
///
/// Shared by provider implementations (including test doubles). Emission
/// iterates listeners in registration order under the table lock, so every
/// listener observes the same sequence of events.
#[derive(Clone, Default)]
pub struct SessionListeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl SessionListeners {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and return its unsubscribe guard.
    pub fn register(&self, listener: SessionListener) -> SessionWatch {
        let mut table = self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        table.next_id += 1;
        let id = table.next_id;
        table.entries.push(ListenerEntry {
            id,
            listener: Arc::new(listener),
        });
        SessionWatch {
            id,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Deliver a session change to every registered listener, in order.
    pub fn emit(&self, identity: Option<&IdentityHandle>) {
        let table = self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for entry in &table.entries {
            (*entry.listener)(identity);
        }
    }

    /// Number of currently registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Guard for a registered session listener.
///
/// Dropping the guard stops future deliveries; events already being
/// dispatched are unaffected.
pub struct SessionWatch {
    id: u64,
    table: Weak<Mutex<ListenerTable>>,
}

impl Drop for SessionWatch {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            let mut table = table.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            table.entries.retain(|entry| entry.id != self.id);
        }
    }
}
