//! Access gate.
//!
//! Pure render-vs-redirect decision table over the current
//! [`SessionState`] and the destination's policy. No internal state: the
//! caller re-evaluates on every session-state change and every navigation.

use crate::models::SessionState;

/// What a destination demands of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
    /// Destination requires an active session (dashboard, library, theory,
    /// profile).
    RequiresSession,
    /// Destination is for signed-out visitors only (the sign-in page).
    PublicOnly,
}

/// Decision for one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome<'a> {
    /// Render the requested destination.
    Render,
    /// Render a neutral placeholder; no content decision has been made
    /// yet. Never redirect here - that would flicker once the session
    /// resolves.
    Placeholder,
    /// Navigate to this path instead.
    Redirect(&'a str),
}

/// The gate consulted by every protected and public-only destination.
#[derive(Debug, Clone)]
pub struct AccessGate {
    sign_in_path: String,
    home_path: String,
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new("/login", "/")
    }
}

impl AccessGate {
    /// Create a gate with explicit redirect destinations.
    #[must_use]
    pub fn new(sign_in_path: &str, home_path: &str) -> Self {
        Self {
            sign_in_path: sign_in_path.to_owned(),
            home_path: home_path.to_owned(),
        }
    }

    /// The full decision table.
    #[must_use]
    pub fn evaluate(&self, state: &SessionState, policy: RoutePolicy) -> GateOutcome<'_> {
        match (state, policy) {
            (SessionState::Loading, _) => GateOutcome::Placeholder,
            (SessionState::Anonymous, RoutePolicy::RequiresSession) => {
                GateOutcome::Redirect(&self.sign_in_path)
            }
            (SessionState::Authenticated(_), RoutePolicy::PublicOnly) => {
                GateOutcome::Redirect(&self.home_path)
            }
            (SessionState::Anonymous, RoutePolicy::PublicOnly)
            | (SessionState::Authenticated(_), RoutePolicy::RequiresSession) => GateOutcome::Render,
        }
    }

    /// Gate a destination that requires an active session.
    #[must_use]
    pub fn require_session(&self, state: &SessionState) -> GateOutcome<'_> {
        self.evaluate(state, RoutePolicy::RequiresSession)
    }

    /// Gate a destination for signed-out visitors only.
    #[must_use]
    pub fn require_no_session(&self, state: &SessionState) -> GateOutcome<'_> {
        self.evaluate(state, RoutePolicy::PublicOnly)
    }
}
