//! Session synchronizer.
//!
//! Single source of truth for "who is the current user". Subscribes to the
//! identity provider, fetches the matching profile record on every session
//! change, merges the two into one [`User`] and republishes the resulting
//! [`SessionState`] to subscribers.
//!
//! # Ordering
//!
//! Every raw session-changed callback is tagged with a monotonically
//! increasing sequence number under the state lock. A profile fetch result
//! is only published if its sequence number is still the newest observed;
//! anything older is discarded. This is the property that keeps a slow
//! profile fetch from a previous session from clobbering a newer one -
//! subscribers observe transitions exactly once, in the order the causing
//! events arrived, and never see a user whose identity is no longer
//! current.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::identity::{IdentityError, IdentityHandle, IdentityProvider, SessionWatch};
use crate::models::{SessionState, User};
use crate::profile::{ProfileRecord, ProfileStore};

/// Upper bound on a single profile fetch.
///
/// A fetch that exceeds it is treated exactly like a failed fetch: the
/// session resolves with an identity-only user instead of blocking in
/// `Loading`. Recovery is the explicit [`SessionManager::refresh`] call.
pub const PROFILE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

struct Subscriber {
    tx: mpsc::UnboundedSender<SessionState>,
}

struct SyncState {
    /// Sequence number of the newest session-changed event.
    seq: u64,
    /// Identity carried by the newest event (pending or published).
    identity: Option<IdentityHandle>,
    current: SessionState,
    subscribers: Vec<Subscriber>,
}

struct SessionCore {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    state: Mutex<SyncState>,
    /// Provider subscription; dropped (and thereby unsubscribed) together
    /// with the last manager clone.
    watch: Mutex<Option<SessionWatch>>,
}

impl SessionCore {
    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entry point for every raw provider event.
    fn observe(core: &Arc<Self>, identity: Option<IdentityHandle>) {
        let seq = {
            let mut state = core.lock_state();
            state.seq += 1;
            state.identity = identity.clone();
            state.seq
        };

        match identity {
            // Sign-out is terminal for the identity it ends: publish at
            // once, no fetch to wait for.
            None => core.publish(seq, SessionState::Anonymous),
            Some(handle) => {
                let core = Arc::clone(core);
                tokio::spawn(async move {
                    core.resolve(seq, handle).await;
                });
            }
        }
    }

    /// Fetch the profile half and publish the merged user, unless a newer
    /// event supersedes this one while the fetch is in flight.
    async fn resolve(&self, seq: u64, handle: IdentityHandle) {
        let fetched = tokio::time::timeout(
            PROFILE_FETCH_TIMEOUT,
            self.profiles.get_profile(&handle.subject),
        )
        .await;

        let profile: Option<ProfileRecord> = match fetched {
            Ok(Ok(record)) => record,
            Ok(Err(err)) => {
                tracing::warn!(
                    subject = %handle.subject,
                    error = %err,
                    "profile fetch failed; continuing with identity-only user"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    subject = %handle.subject,
                    "profile fetch timed out; continuing with identity-only user"
                );
                None
            }
        };

        let user = User::merge(handle, profile);
        self.publish(seq, SessionState::Authenticated(user));
    }

    /// Publish a state if `seq` is still the newest event.
    fn publish(&self, seq: u64, next: SessionState) {
        let mut state = self.lock_state();
        if seq != state.seq {
            tracing::debug!(seq, latest = state.seq, "discarding superseded session result");
            return;
        }

        tracing::info!(state = state_name(&next), "session state changed");
        state.current = next.clone();
        state
            .subscribers
            .retain(|subscriber| subscriber.tx.send(next.clone()).is_ok());
    }
}

/// Stream of session states for one subscriber.
///
/// The first item is always the state current at subscribe time; every
/// transition thereafter is delivered exactly once, in order. Dropping the
/// stream unsubscribes - in-flight profile fetches are not cancelled, they
/// just stop having observable effects here.
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionState>,
}

impl SessionEvents {
    /// Wait for the next state.
    pub async fn next(&mut self) -> Option<SessionState> {
        self.rx.recv().await
    }

    /// Take an already-delivered state without waiting.
    pub fn try_next(&mut self) -> Option<SessionState> {
        self.rx.try_recv().ok()
    }
}

/// The session synchronizer.
///
/// Cheaply cloneable; all clones share one state machine. The provider
/// subscription is torn down when the last clone is dropped.
#[derive(Clone)]
pub struct SessionManager {
    core: Arc<SessionCore>,
}

impl SessionManager {
    /// Start the synchronizer.
    ///
    /// Subscribes to the provider's session-changed events; the machine
    /// stays in [`SessionState::Loading`] until the provider's first
    /// callback settles. Must be called within a Tokio runtime.
    #[must_use]
    pub fn start(provider: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        let core = Arc::new(SessionCore {
            provider: Arc::clone(&provider),
            profiles,
            state: Mutex::new(SyncState {
                seq: 0,
                identity: None,
                current: SessionState::Loading,
                subscribers: Vec::new(),
            }),
            watch: Mutex::new(None),
        });

        let observer = Arc::downgrade(&core);
        let watch = provider.on_session_changed(Box::new(move |identity| {
            if let Some(core) = observer.upgrade() {
                SessionCore::observe(&core, identity.cloned());
            }
        }));
        *core.watch.lock().unwrap_or_else(PoisonError::into_inner) = Some(watch);

        Self { core }
    }

    /// Subscribe to session states.
    ///
    /// Delivers the last known state immediately (cold start), then every
    /// transition in order.
    #[must_use]
    pub fn subscribe(&self) -> SessionEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.core.lock_state();
        // Cold-start delivery and registration happen under the same lock,
        // so no transition can interleave between them.
        let _ = tx.send(state.current.clone());
        state.subscribers.push(Subscriber { tx });
        SessionEvents { rx }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn current(&self) -> SessionState {
        self.core.lock_state().current.clone()
    }

    /// Sign in with email and secret.
    ///
    /// Resolving successfully does not mean the session state has flipped
    /// yet - that happens when the provider's session event arrives.
    ///
    /// # Errors
    ///
    /// Returns the provider's error on failed authentication.
    pub async fn login(&self, email: &str, secret: &str) -> Result<(), IdentityError> {
        self.core.provider.sign_in(email, secret).await?;
        Ok(())
    }

    /// Create an account, set its display name, and write the initial
    /// profile record with role `user`.
    ///
    /// Profile creation failing after the identity was created still
    /// resolves `Ok`: the identity side succeeded, and the merged user
    /// simply carries no role until the record exists. The failure is
    /// logged, not surfaced.
    ///
    /// # Errors
    ///
    /// Returns the provider's error when identity creation or the display
    /// name update fails.
    pub async fn register(
        &self,
        email: &str,
        secret: &str,
        full_name: &str,
    ) -> Result<(), IdentityError> {
        let handle = self.core.provider.sign_up(email, secret).await?;
        self.core.provider.update_display_name(full_name).await?;

        let record = ProfileRecord::initial(full_name);
        if let Err(err) = self
            .core
            .profiles
            .create_profile(&handle.subject, &record)
            .await
        {
            tracing::warn!(
                subject = %handle.subject,
                error = %err,
                "profile creation failed after sign-up; account continues without a role"
            );
        }
        Ok(())
    }

    /// Sign out. Idempotent; the transition to anonymous arrives through
    /// the provider's session event.
    ///
    /// # Errors
    ///
    /// Returns an error only for provider-side failures.
    pub async fn logout(&self) -> Result<(), IdentityError> {
        self.core.provider.sign_out().await
    }

    /// Re-run the merge for the current identity.
    ///
    /// The manual retry path after a degraded profile fetch: takes a fresh
    /// sequence number and republishes, superseding any fetch still in
    /// flight. No-op while anonymous or loading.
    pub async fn refresh(&self) {
        let pending = {
            let mut state = self.core.lock_state();
            let handle = state.identity.clone();
            handle.map(|handle| {
                state.seq += 1;
                (state.seq, handle)
            })
        };

        if let Some((seq, handle)) = pending {
            self.core.resolve(seq, handle).await;
        }
    }
}

const fn state_name(state: &SessionState) -> &'static str {
    match state {
        SessionState::Loading => "loading",
        SessionState::Authenticated(_) => "authenticated",
        SessionState::Anonymous => "anonymous",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    use segno_core::{Email, Role, SubjectId};

    use crate::identity::{SessionListener, SessionListeners};
    use crate::profile::{ProfileError, ProfileUpdate};

    fn handle(subject: &str) -> IdentityHandle {
        IdentityHandle {
            subject: SubjectId::parse(subject).unwrap(),
            email: Email::parse("ann@example.com").unwrap(),
            email_verified: true,
            display_name: Some("Ann".to_owned()),
            avatar_url: None,
        }
    }

    /// Provider stub: events are injected by the test through `emit`.
    #[derive(Default)]
    struct StubProvider {
        listeners: SessionListeners,
    }

    #[async_trait]
    impl IdentityProvider for StubProvider {
        fn on_session_changed(&self, listener: SessionListener) -> SessionWatch {
            self.listeners.register(listener)
        }

        async fn sign_in(&self, _: &str, _: &str) -> Result<IdentityHandle, IdentityError> {
            Err(IdentityError::AuthenticationFailed)
        }

        async fn sign_up(&self, _: &str, _: &str) -> Result<IdentityHandle, IdentityError> {
            Err(IdentityError::Provider {
                code: "UNUSED".to_owned(),
            })
        }

        async fn update_display_name(&self, _: &str) -> Result<(), IdentityError> {
            Ok(())
        }

        async fn sign_out(&self) -> Result<(), IdentityError> {
            Ok(())
        }

        async fn token(&self, _: bool) -> Result<String, IdentityError> {
            Err(IdentityError::NoSession)
        }
    }

    /// Profile store stub with scriptable behavior per fetch.
    struct StubProfiles {
        /// Fetches answered so far.
        fetches: AtomicUsize,
        /// `Some` blocks every fetch until notified.
        gate: Option<Arc<Notify>>,
        /// Behavior by fetch index: `Ok(None)`, `Ok(Some)`, or `Err`.
        script: Vec<Result<Option<ProfileRecord>, ()>>,
    }

    impl StubProfiles {
        fn found(record: ProfileRecord) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                gate: None,
                script: vec![Ok(Some(record))],
            }
        }

        fn failing() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                gate: None,
                script: vec![Err(())],
            }
        }

        fn scripted(script: Vec<Result<Option<ProfileRecord>, ()>>) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                gate: None,
                script,
            }
        }

        fn gated(record: ProfileRecord, gate: Arc<Notify>) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                gate: Some(gate),
                script: vec![Ok(Some(record))],
            }
        }
    }

    #[async_trait]
    impl ProfileStore for StubProfiles {
        async fn get_profile(
            &self,
            _: &SubjectId,
        ) -> Result<Option<ProfileRecord>, ProfileError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let index = self.fetches.fetch_add(1, Ordering::SeqCst);
            let step = self.script.get(index).or_else(|| self.script.last());
            match step {
                Some(Ok(record)) => Ok(record.clone()),
                Some(Err(())) | None => Err(ProfileError::InvalidDocument("scripted".to_owned())),
            }
        }

        async fn create_profile(
            &self,
            _: &SubjectId,
            _: &ProfileRecord,
        ) -> Result<(), ProfileError> {
            Ok(())
        }

        async fn update_profile(
            &self,
            _: &SubjectId,
            _: &ProfileUpdate,
            _: &str,
        ) -> Result<(), ProfileError> {
            Ok(())
        }
    }

    fn record(role: Role) -> ProfileRecord {
        ProfileRecord {
            full_name: "Ann Byrne".to_owned(),
            avatar_url: None,
            role,
            created_at: chrono::Utc::now(),
        }
    }

    async fn expect_next(events: &mut SessionEvents) -> SessionState {
        tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .expect("timed out waiting for session state")
            .expect("session stream closed")
    }

    async fn expect_silence(events: &mut SessionEvents) {
        let outcome = tokio::time::timeout(Duration::from_millis(100), events.next()).await;
        assert!(outcome.is_err(), "unexpected state: {:?}", outcome.unwrap());
    }

    #[tokio::test]
    async fn test_starts_loading_and_delivers_cold_start() {
        let provider = Arc::new(StubProvider::default());
        let manager = SessionManager::start(provider, Arc::new(StubProfiles::failing()));

        assert!(manager.current().is_loading());

        let mut events = manager.subscribe();
        assert_eq!(expect_next(&mut events).await, SessionState::Loading);
    }

    #[tokio::test]
    async fn test_anonymous_event_publishes_immediately() {
        let provider = Arc::new(StubProvider::default());
        let manager =
            SessionManager::start(provider.clone(), Arc::new(StubProfiles::failing()));
        let mut events = manager.subscribe();
        assert_eq!(expect_next(&mut events).await, SessionState::Loading);

        provider.listeners.emit(None);
        assert_eq!(expect_next(&mut events).await, SessionState::Anonymous);
        assert!(manager.current().is_anonymous());
    }

    #[tokio::test]
    async fn test_authenticated_merges_profile() {
        let provider = Arc::new(StubProvider::default());
        let profiles = Arc::new(StubProfiles::found(record(Role::Admin)));
        let manager = SessionManager::start(provider.clone(), profiles);
        let mut events = manager.subscribe();
        assert_eq!(expect_next(&mut events).await, SessionState::Loading);

        provider.listeners.emit(Some(&handle("sub-1")));
        let state = expect_next(&mut events).await;
        let user = state.user().expect("expected authenticated state");
        assert_eq!(user.role, Some(Role::Admin));
        assert_eq!(user.display_name.as_deref(), Some("Ann"));
        assert!(user.has_profile());
    }

    #[tokio::test]
    async fn test_degraded_fetch_publishes_identity_only_user() {
        let provider = Arc::new(StubProvider::default());
        let manager =
            SessionManager::start(provider.clone(), Arc::new(StubProfiles::failing()));
        let mut events = manager.subscribe();
        assert_eq!(expect_next(&mut events).await, SessionState::Loading);

        provider.listeners.emit(Some(&handle("sub-1")));
        let state = expect_next(&mut events).await;
        let user = state.user().expect("expected authenticated state");
        assert_eq!(user.role, None);
        assert!(!user.has_profile());
        assert_eq!(user.email.as_str(), "ann@example.com");
    }

    #[tokio::test]
    async fn test_slow_fetch_superseded_by_logout_is_discarded() {
        let provider = Arc::new(StubProvider::default());
        let gate = Arc::new(Notify::new());
        let profiles = Arc::new(StubProfiles::gated(record(Role::User), Arc::clone(&gate)));
        let manager = SessionManager::start(provider.clone(), profiles);
        let mut events = manager.subscribe();
        assert_eq!(expect_next(&mut events).await, SessionState::Loading);

        // Sign-in arrives, fetch blocks on the gate; logout wins the race.
        provider.listeners.emit(Some(&handle("sub-1")));
        provider.listeners.emit(None);
        assert_eq!(expect_next(&mut events).await, SessionState::Anonymous);

        // Let the stale fetch settle; its result must never surface.
        gate.notify_one();
        expect_silence(&mut events).await;
        assert!(manager.current().is_anonymous());
    }

    #[tokio::test]
    async fn test_refresh_upgrades_degraded_session() {
        let provider = Arc::new(StubProvider::default());
        let profiles = Arc::new(StubProfiles::scripted(vec![
            Err(()),
            Ok(Some(record(Role::User))),
        ]));
        let manager = SessionManager::start(provider.clone(), profiles);
        let mut events = manager.subscribe();
        assert_eq!(expect_next(&mut events).await, SessionState::Loading);

        provider.listeners.emit(Some(&handle("sub-1")));
        let degraded = expect_next(&mut events).await;
        assert_eq!(degraded.user().unwrap().role, None);

        manager.refresh().await;
        let upgraded = expect_next(&mut events).await;
        assert_eq!(upgraded.user().unwrap().role, Some(Role::User));
    }

    #[tokio::test]
    async fn test_all_subscribers_observe_the_same_sequence() {
        let provider = Arc::new(StubProvider::default());
        let manager =
            SessionManager::start(provider.clone(), Arc::new(StubProfiles::failing()));
        let mut first = manager.subscribe();
        let mut second = manager.subscribe();

        provider.listeners.emit(None);
        provider.listeners.emit(Some(&handle("sub-1")));

        for events in [&mut first, &mut second] {
            assert_eq!(expect_next(events).await, SessionState::Loading);
            assert_eq!(expect_next(events).await, SessionState::Anonymous);
            assert!(expect_next(events).await.is_authenticated());
        }
    }

    #[tokio::test]
    async fn test_refresh_while_anonymous_is_a_no_op() {
        let provider = Arc::new(StubProvider::default());
        let manager =
            SessionManager::start(provider.clone(), Arc::new(StubProfiles::failing()));
        let mut events = manager.subscribe();
        assert_eq!(expect_next(&mut events).await, SessionState::Loading);

        provider.listeners.emit(None);
        assert_eq!(expect_next(&mut events).await, SessionState::Anonymous);

        manager.refresh().await;
        expect_silence(&mut events).await;
    }
}
