//! Integration tests for Segno.
//!
//! # Test Categories
//!
//! - `session_lifecycle` - synchronizer ordering, stale-fetch discard, and
//!   partial-failure recovery
//! - `access_gate` - the render/redirect table driven by live session
//!   states
//! - `authorized_requests` - token attachment and fail-fast behavior
//!
//! The crate root provides [`TestContext`]: a session manager wired to
//! in-memory mock collaborators with scriptable failures, fetch gating,
//! and call counters, so every scenario runs without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Semaphore;
use url::Url;

use segno_account::config::AccountConfig;
use segno_account::identity::{
    IdentityError, IdentityHandle, IdentityProvider, SessionListener, SessionListeners,
    SessionWatch,
};
use segno_account::profile::{ProfileError, ProfileRecord, ProfileStore, ProfileUpdate};
use segno_account::session::{SessionEvents, SessionManager};
use segno_account::{ApiClient, SessionState};

use segno_core::{Email, SubjectId};

// =============================================================================
// Mock identity provider
// =============================================================================

struct MockAccount {
    secret: String,
    handle: IdentityHandle,
}

struct ProviderState {
    accounts: HashMap<String, MockAccount>,
    active: Option<IdentityHandle>,
    token_stale: bool,
    minted: usize,
}

/// In-memory identity provider with the same observable semantics as the
/// REST client: events on sign-in/sign-up/sign-out, none on no-op
/// sign-out, and lazy token refresh.
pub struct MockIdentityProvider {
    listeners: SessionListeners,
    state: Mutex<ProviderState>,
    token_calls: AtomicUsize,
    token_refreshes: AtomicUsize,
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: SessionListeners::new(),
            state: Mutex::new(ProviderState {
                accounts: HashMap::new(),
                active: None,
                token_stale: false,
                minted: 0,
            }),
            token_calls: AtomicUsize::new(0),
            token_refreshes: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inject a raw session event, bypassing the account table. Used for
    /// race scenarios that need exact event timing.
    pub fn emit_session(&self, identity: Option<&IdentityHandle>) {
        self.listeners.emit(identity);
    }

    /// Mark the current token stale so the next request forces a refresh.
    pub fn mark_token_stale(&self) {
        self.lock().token_stale = true;
    }

    /// The identity the provider currently considers signed in.
    #[must_use]
    pub fn active_handle(&self) -> Option<IdentityHandle> {
        self.lock().active.clone()
    }

    /// How many times a token was requested.
    #[must_use]
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    /// How many times a stale token was refreshed.
    #[must_use]
    pub fn token_refreshes(&self) -> usize {
        self.token_refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn on_session_changed(&self, listener: SessionListener) -> SessionWatch {
        // No automatic initial delivery: tests drive every event
        // explicitly so each scenario controls its own timing.
        self.listeners.register(listener)
    }

    async fn sign_in(&self, email: &str, secret: &str) -> Result<IdentityHandle, IdentityError> {
        let handle = {
            let mut state = self.lock();
            let account = state
                .accounts
                .get(email)
                .filter(|account| account.secret == secret)
                .ok_or(IdentityError::AuthenticationFailed)?;
            let handle = account.handle.clone();
            state.active = Some(handle.clone());
            state.token_stale = false;
            handle
        };

        self.listeners.emit(Some(&handle));
        Ok(handle)
    }

    async fn sign_up(&self, email: &str, secret: &str) -> Result<IdentityHandle, IdentityError> {
        let handle = {
            let mut state = self.lock();
            if state.accounts.contains_key(email) {
                return Err(IdentityError::EmailAlreadyRegistered);
            }

            let subject = format!("sub-{}", state.accounts.len() + 1);
            let handle = IdentityHandle {
                subject: SubjectId::parse(&subject)
                    .map_err(|err| IdentityError::InvalidPayload(err.to_string()))?,
                email: Email::parse(email)
                    .map_err(|err| IdentityError::InvalidPayload(err.to_string()))?,
                email_verified: false,
                display_name: None,
                avatar_url: None,
            };
            state.accounts.insert(
                email.to_owned(),
                MockAccount {
                    secret: secret.to_owned(),
                    handle: handle.clone(),
                },
            );
            state.active = Some(handle.clone());
            state.token_stale = false;
            handle
        };

        self.listeners.emit(Some(&handle));
        Ok(handle)
    }

    async fn update_display_name(&self, name: &str) -> Result<(), IdentityError> {
        let mut state = self.lock();
        let active = state.active.as_mut().ok_or(IdentityError::NoSession)?;
        active.display_name = Some(name.to_owned());
        let email = active.email.as_str().to_owned();
        if let Some(account) = state.accounts.get_mut(&email) {
            account.handle.display_name = Some(name.to_owned());
        }
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let had_session = self.lock().active.take().is_some();
        if had_session {
            self.listeners.emit(None);
        }
        Ok(())
    }

    async fn token(&self, force_refresh: bool) -> Result<String, IdentityError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if state.active.is_none() {
            return Err(IdentityError::NoSession);
        }

        if force_refresh || state.token_stale {
            state.token_stale = false;
            state.minted += 1;
            self.token_refreshes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(format!("token-{}", state.minted))
    }
}

// =============================================================================
// Mock profile store
// =============================================================================

/// In-memory profile document store with scriptable failures and an
/// optional gate that holds every fetch until released.
pub struct MockProfileStore {
    records: Mutex<HashMap<String, ProfileRecord>>,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    failing_fetches: AtomicUsize,
    failing_creates: AtomicUsize,
    fetches: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl Default for MockProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            fetch_gate: Mutex::new(None),
            failing_fetches: AtomicUsize::new(0),
            failing_creates: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    /// Hold every subsequent fetch until the returned semaphore hands out
    /// a permit. Permits accumulate, so releases are never lost to timing:
    /// `add_permits(n)` lets exactly `n` held fetches through.
    #[must_use]
    pub fn gate_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self
            .fetch_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&gate));
        gate
    }

    /// Stop gating new fetches and let one held fetch through.
    pub fn release_fetches(&self) {
        let gate = self
            .fetch_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = gate {
            gate.add_permits(1);
        }
    }

    /// Make the next `count` fetches fail with a store error.
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` creates fail with a store error.
    pub fn fail_next_creates(&self, count: usize) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    /// Seed a record directly, bypassing `create_profile`.
    pub fn insert_record(&self, id: &SubjectId, record: ProfileRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.as_str().to_owned(), record);
    }

    /// Read a stored record back.
    #[must_use]
    pub fn record(&self, id: &SubjectId) -> Option<ProfileRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id.as_str())
            .cloned()
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl ProfileStore for MockProfileStore {
    async fn get_profile(&self, id: &SubjectId) -> Result<Option<ProfileRecord>, ProfileError> {
        let gate = self
            .fetch_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(gate) = gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }

        self.fetches.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_fetches) {
            return Err(ProfileError::Store {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            });
        }

        Ok(self.record(id))
    }

    async fn create_profile(
        &self,
        id: &SubjectId,
        record: &ProfileRecord,
    ) -> Result<(), ProfileError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_creates) {
            return Err(ProfileError::Store {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            });
        }

        self.insert_record(id, record.clone());
        Ok(())
    }

    async fn update_profile(
        &self,
        id: &SubjectId,
        changes: &ProfileUpdate,
        _token: &str,
    ) -> Result<(), ProfileError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records.get_mut(id.as_str()) {
            if let Some(full_name) = &changes.full_name {
                record.full_name = full_name.clone();
            }
            if let Some(avatar_url) = &changes.avatar_url {
                record.avatar_url = Some(avatar_url.clone());
            }
        }
        Ok(())
    }
}

// =============================================================================
// Test context
// =============================================================================

/// Configuration pointing every endpoint at an unroutable host, so any
/// accidental network dispatch fails loudly as a transport error.
#[must_use]
#[allow(clippy::missing_panics_doc, clippy::unwrap_used)]
pub fn test_config() -> AccountConfig {
    AccountConfig {
        api_key: SecretString::from("k9Qf27ZpLmW4"),
        identity_url: Url::parse("https://identity.test.invalid/").unwrap(),
        secure_token_url: Url::parse("https://token.test.invalid/").unwrap(),
        profile_store_url: Url::parse("https://profiles.test.invalid/").unwrap(),
        api_url: Url::parse("https://api.test.invalid/").unwrap(),
    }
}

/// A session manager wired to mock collaborators.
pub struct TestContext {
    pub provider: Arc<MockIdentityProvider>,
    pub profiles: Arc<MockProfileStore>,
    pub manager: SessionManager,
    pub api: ApiClient,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        let provider = Arc::new(MockIdentityProvider::new());
        let profiles = Arc::new(MockProfileStore::new());
        let provider_dyn: Arc<dyn IdentityProvider> = provider.clone();
        let profiles_dyn: Arc<dyn ProfileStore> = profiles.clone();
        let manager = SessionManager::start(Arc::clone(&provider_dyn), profiles_dyn);
        let api = ApiClient::new(&test_config(), provider_dyn);

        Self {
            provider,
            profiles,
            manager,
            api,
        }
    }

    /// Subscribe and consume the cold-start delivery, asserting it matches
    /// the expected state.
    ///
    /// # Panics
    ///
    /// Panics when the cold-start state differs from `expected`.
    pub async fn subscribe_expecting(&self, expected: &SessionState) -> SessionEvents {
        let mut events = self.manager.subscribe();
        let first = expect_next(&mut events).await;
        assert_eq!(&first, expected, "unexpected cold-start state");
        events
    }
}

/// Build an identity handle for raw event injection.
///
/// # Panics
///
/// Panics on an invalid subject id or email.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn test_handle(subject: &str, email: &str) -> IdentityHandle {
    IdentityHandle {
        subject: SubjectId::parse(subject).unwrap(),
        email: Email::parse(email).unwrap(),
        email_verified: true,
        display_name: None,
        avatar_url: None,
    }
}

/// Await the next session state, failing the test after one second.
///
/// # Panics
///
/// Panics when no state arrives in time or the stream is closed.
pub async fn expect_next(events: &mut SessionEvents) -> SessionState {
    tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .expect("timed out waiting for session state")
        .expect("session stream closed")
}

/// Assert that no further session state arrives within 100ms.
///
/// # Panics
///
/// Panics when a state is delivered.
pub async fn expect_silence(events: &mut SessionEvents) {
    let outcome = tokio::time::timeout(Duration::from_millis(100), events.next()).await;
    assert!(
        outcome.is_err(),
        "expected no session state, got {:?}",
        outcome.expect("timeout already ruled out")
    );
}
