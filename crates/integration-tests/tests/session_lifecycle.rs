//! Session synchronizer lifecycle scenarios.
//!
//! These tests drive the synchronizer through the full mock provider and
//! profile store, verifying the ordering guarantees: subscribers observe
//! states in event order, a stale profile fetch never resurfaces after
//! logout, and partial registration failures degrade instead of breaking
//! the session.

use segno_account::SessionState;
use segno_core::Role;

use segno_integration_tests::{TestContext, expect_next, expect_silence, test_handle};

// =============================================================================
// Cold start and ordering
// =============================================================================

#[tokio::test]
async fn test_cold_start_delivers_loading_exactly_once() {
    let ctx = TestContext::new();
    let mut events = ctx.manager.subscribe();

    assert_eq!(expect_next(&mut events).await, SessionState::Loading);
    // Nothing else until the provider speaks.
    expect_silence(&mut events).await;
}

#[tokio::test]
async fn test_anonymous_to_authenticated_without_intermediate_loading() {
    let ctx = TestContext::new();
    let mut events = ctx
        .subscribe_expecting(&SessionState::Loading)
        .await;

    ctx.provider.emit_session(None);
    assert_eq!(expect_next(&mut events).await, SessionState::Anonymous);

    // Hold the profile fetch until registration has written the record,
    // so the merge deterministically sees the full profile.
    let _gate = ctx.profiles.gate_fetches();
    ctx.manager
        .register("ann@example.com", "correct-horse", "Ann Byrne")
        .await
        .expect("registration should succeed");
    ctx.profiles.release_fetches();

    let state = expect_next(&mut events).await;
    let user = state.user().expect("expected authenticated state");
    assert_eq!(user.role, Some(Role::User));
    assert_eq!(user.display_name.as_deref(), Some("Ann Byrne"));

    // Anonymous -> Authenticated directly; Loading never reappears.
    expect_silence(&mut events).await;
}

#[tokio::test]
async fn test_late_subscriber_sees_only_current_state() {
    let ctx = TestContext::new();
    ctx.provider.emit_session(None);

    let mut events = ctx
        .subscribe_expecting(&SessionState::Anonymous)
        .await;
    expect_silence(&mut events).await;
}

#[tokio::test]
async fn test_all_subscribers_observe_the_same_sequence() {
    let ctx = TestContext::new();
    let mut first = ctx.manager.subscribe();
    let mut second = ctx.manager.subscribe();

    ctx.provider.emit_session(None);
    ctx.manager
        .register("ann@example.com", "correct-horse", "Ann")
        .await
        .expect("registration should succeed");

    // Drain the first subscriber up to the merged state before signing
    // out, so logout cannot supersede the in-flight profile fetch.
    assert_eq!(expect_next(&mut first).await, SessionState::Loading);
    assert_eq!(expect_next(&mut first).await, SessionState::Anonymous);
    assert!(expect_next(&mut first).await.is_authenticated());

    ctx.manager.logout().await.expect("logout should succeed");
    assert_eq!(expect_next(&mut first).await, SessionState::Anonymous);

    // The second subscriber observed the identical sequence.
    assert_eq!(expect_next(&mut second).await, SessionState::Loading);
    assert_eq!(expect_next(&mut second).await, SessionState::Anonymous);
    assert!(expect_next(&mut second).await.is_authenticated());
    assert_eq!(expect_next(&mut second).await, SessionState::Anonymous);
}

// =============================================================================
// Stale fetch discard
// =============================================================================

#[tokio::test]
async fn test_slow_profile_fetch_never_resurfaces_after_logout() {
    let ctx = TestContext::new();
    let mut events = ctx
        .subscribe_expecting(&SessionState::Loading)
        .await;

    // Sign-in event arrives and its profile fetch hangs.
    let gate = ctx.profiles.gate_fetches();
    ctx.provider
        .emit_session(Some(&test_handle("sub-a", "ann@example.com")));

    // Logout wins the race: anonymous is published immediately.
    ctx.provider.emit_session(None);
    assert_eq!(expect_next(&mut events).await, SessionState::Anonymous);

    // The stale fetch settles; its result must be discarded, not
    // published out of order.
    gate.add_permits(1);
    expect_silence(&mut events).await;
    assert!(ctx.manager.current().is_anonymous());
}

#[tokio::test]
async fn test_newer_session_supersedes_older_pending_fetch() {
    let ctx = TestContext::new();
    let mut events = ctx
        .subscribe_expecting(&SessionState::Loading)
        .await;

    let gate = ctx.profiles.gate_fetches();
    ctx.provider
        .emit_session(Some(&test_handle("sub-a", "ann@example.com")));
    ctx.provider
        .emit_session(Some(&test_handle("sub-b", "ben@example.com")));

    // Both fetches settle in an arbitrary order; only the newer identity
    // may be published.
    gate.add_permits(2);

    let state = expect_next(&mut events).await;
    let user = state.user().expect("expected authenticated state");
    assert_eq!(user.id.as_str(), "sub-b");
    expect_silence(&mut events).await;
}

// =============================================================================
// Logout idempotence
// =============================================================================

#[tokio::test]
async fn test_logout_while_anonymous_is_a_silent_no_op() {
    let ctx = TestContext::new();
    let mut events = ctx
        .subscribe_expecting(&SessionState::Loading)
        .await;

    ctx.provider.emit_session(None);
    assert_eq!(expect_next(&mut events).await, SessionState::Anonymous);

    ctx.manager.logout().await.expect("logout should resolve");
    expect_silence(&mut events).await;
}

// =============================================================================
// Partial registration failure
// =============================================================================

#[tokio::test]
async fn test_profile_creation_failure_still_registers_the_identity() {
    let ctx = TestContext::new();
    let mut events = ctx
        .subscribe_expecting(&SessionState::Loading)
        .await;

    ctx.profiles.fail_next_creates(1);
    ctx.manager
        .register("ann@example.com", "correct-horse", "Ann Byrne")
        .await
        .expect("identity side of registration should resolve");

    // The merge finds no record: authenticated, but no role yet.
    let state = expect_next(&mut events).await;
    let user = state.user().expect("expected authenticated state");
    assert_eq!(user.role, None);
    assert_eq!(ctx.profiles.create_count(), 1);
}

#[tokio::test]
async fn test_refresh_after_degraded_fetch_carries_full_profile() {
    let ctx = TestContext::new();
    let mut events = ctx
        .subscribe_expecting(&SessionState::Loading)
        .await;

    // Record is written fine, but the first fetch fails.
    ctx.profiles.fail_next_fetches(1);
    ctx.manager
        .register("ann@example.com", "correct-horse", "Ann Byrne")
        .await
        .expect("registration should succeed");

    let degraded = expect_next(&mut events).await;
    assert_eq!(degraded.user().expect("authenticated").role, None);

    // Manual retry: a fresh notification carries the complete profile.
    ctx.manager.refresh().await;
    let upgraded = expect_next(&mut events).await;
    assert_eq!(upgraded.user().expect("authenticated").role, Some(Role::User));
    assert_eq!(ctx.profiles.fetch_count(), 2);
}

// =============================================================================
// Login flow
// =============================================================================

#[tokio::test]
async fn test_login_state_change_arrives_through_the_event() {
    let ctx = TestContext::new();
    ctx.manager
        .register("ann@example.com", "correct-horse", "Ann")
        .await
        .expect("registration should succeed");
    ctx.manager.logout().await.expect("logout should succeed");

    let mut events = ctx
        .subscribe_expecting(&SessionState::Anonymous)
        .await;

    ctx.manager
        .login("ann@example.com", "correct-horse")
        .await
        .expect("login should succeed");

    assert!(expect_next(&mut events).await.is_authenticated());
}

#[tokio::test]
async fn test_failed_login_surfaces_and_changes_nothing() {
    let ctx = TestContext::new();
    ctx.provider.emit_session(None);
    let mut events = ctx
        .subscribe_expecting(&SessionState::Anonymous)
        .await;

    let result = ctx.manager.login("ann@example.com", "wrong").await;
    assert!(result.is_err());
    expect_silence(&mut events).await;
    assert!(ctx.manager.current().is_anonymous());
}
