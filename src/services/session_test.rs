use super::*;

fn manager() -> SessionManager {
    SessionManager {
        store: Arc::new(MemorySessionStore::new()),
        idle_timeout: time::Duration::minutes(30),
        guest_ttl: time::Duration::hours(24),
    }
}

fn t0() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

// =============================================================================
// bytes_to_hex / token generators
// =============================================================================

#[test]
fn bytes_to_hex_known_values() {
    assert_eq!(bytes_to_hex(&[]), "");
    assert_eq!(bytes_to_hex(&[0x0a]), "0a");
    assert_eq!(bytes_to_hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
}

#[test]
fn generate_token_is_64_hex_chars() {
    let token = generate_token();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn generate_token_two_calls_differ() {
    assert_ne!(generate_token(), generate_token());
}

#[test]
fn generate_ws_ticket_is_32_hex_chars() {
    let ticket = generate_ws_ticket();
    assert_eq!(ticket.len(), 32);
    assert!(ticket.chars().all(|c| c.is_ascii_hexdigit()));
}

// =============================================================================
// Subject
// =============================================================================

#[test]
fn subject_accessors() {
    let id = Uuid::new_v4();
    assert_eq!(Subject::User(id).id(), id);
    assert_eq!(Subject::Guest(id).id(), id);
    assert!(Subject::Guest(id).is_guest());
    assert!(!Subject::User(id).is_guest());
    assert_eq!(Subject::User(id).as_user(), Some(id));
    assert_eq!(Subject::Guest(id).as_user(), None);
}

#[test]
fn subject_display_is_prefixed() {
    let id = Uuid::nil();
    assert_eq!(Subject::User(id).to_string(), format!("user:{id}"));
    assert_eq!(Subject::Guest(id).to_string(), format!("guest:{id}"));
}

// =============================================================================
// SessionManager
// =============================================================================

#[tokio::test]
async fn user_session_starts_and_resolves() {
    let mgr = manager();
    let user_id = Uuid::new_v4();
    let now = t0();

    let token = mgr.start_user_session_at(user_id, now).await.unwrap();
    let session = mgr
        .current_session_at(&token, now + time::Duration::minutes(1))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(session.subject, Subject::User(user_id));
    assert!(session.expires_at.is_none());
    assert_eq!(session.trial_credits, 0);
}

#[tokio::test]
async fn guest_session_carries_deadline_and_budget() {
    let mgr = manager();
    let now = t0();

    let (token, guest_id) = mgr.start_guest_session_at(20, now).await.unwrap();
    let session = mgr.current_session_at(&token, now).await.unwrap().unwrap();

    assert_eq!(session.subject, Subject::Guest(guest_id));
    assert_eq!(session.expires_at, Some(now + time::Duration::hours(24)));
    assert_eq!(session.trial_credits, 20);
}

#[tokio::test]
async fn idle_session_is_deleted_on_read() {
    let mgr = manager();
    let now = t0();
    let token = mgr.start_user_session_at(Uuid::new_v4(), now).await.unwrap();

    let resolved = mgr
        .current_session_at(&token, now + time::Duration::minutes(31))
        .await
        .unwrap();
    assert!(resolved.is_none());

    // Deleted, not just hidden.
    assert!(mgr.store.fetch(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn session_alive_exactly_at_idle_boundary() {
    let mgr = manager();
    let now = t0();
    let token = mgr.start_user_session_at(Uuid::new_v4(), now).await.unwrap();

    let resolved = mgr
        .current_session_at(&token, now + time::Duration::minutes(30))
        .await
        .unwrap();
    assert!(resolved.is_some());
}

#[tokio::test]
async fn activity_ping_extends_life() {
    let mgr = manager();
    let now = t0();
    let token = mgr.start_user_session_at(Uuid::new_v4(), now).await.unwrap();

    mgr.update_activity_at(&token, now + time::Duration::minutes(25)).await.unwrap();

    let resolved = mgr
        .current_session_at(&token, now + time::Duration::minutes(50))
        .await
        .unwrap();
    assert!(resolved.is_some());
}

#[tokio::test]
async fn guest_deadline_overrides_activity() {
    let mgr = manager();
    let now = t0();
    let (token, _) = mgr.start_guest_session_at(20, now).await.unwrap();

    mgr.update_activity_at(&token, now + time::Duration::hours(24) - time::Duration::minutes(1))
        .await
        .unwrap();

    let resolved = mgr
        .current_session_at(&token, now + time::Duration::hours(25))
        .await
        .unwrap();
    assert!(resolved.is_none());
    assert!(mgr.store.fetch(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn end_session_is_idempotent() {
    let mgr = manager();
    let now = t0();
    let token = mgr.start_user_session_at(Uuid::new_v4(), now).await.unwrap();

    mgr.end_session(&token).await.unwrap();
    mgr.end_session(&token).await.unwrap();

    assert!(mgr.current_session_at(&token, now).await.unwrap().is_none());
}

#[tokio::test]
async fn update_activity_on_missing_token_is_noop() {
    let mgr = manager();
    mgr.update_activity("no-such-token").await.unwrap();
}

// =============================================================================
// force_cleanup
// =============================================================================

#[tokio::test]
async fn force_cleanup_wipes_distinct_subject() {
    let mgr = manager();
    let now = t0();
    let stale_user = Uuid::new_v4();
    let token = mgr.start_user_session_at(stale_user, now).await.unwrap();

    let wiped = mgr.force_cleanup_at(&token, Uuid::new_v4(), now).await.unwrap();
    assert!(wiped);
    assert!(mgr.current_session_at(&token, now).await.unwrap().is_none());
}

#[tokio::test]
async fn force_cleanup_wipes_guest_sessions_too() {
    let mgr = manager();
    let now = t0();
    let (token, _) = mgr.start_guest_session_at(20, now).await.unwrap();

    let wiped = mgr.force_cleanup_at(&token, Uuid::new_v4(), now).await.unwrap();
    assert!(wiped);
}

#[tokio::test]
async fn force_cleanup_keeps_same_user() {
    let mgr = manager();
    let now = t0();
    let user_id = Uuid::new_v4();
    let token = mgr.start_user_session_at(user_id, now).await.unwrap();

    let wiped = mgr.force_cleanup_at(&token, user_id, now).await.unwrap();
    assert!(!wiped);
    assert!(mgr.current_session_at(&token, now).await.unwrap().is_some());
}

#[tokio::test]
async fn force_cleanup_unknown_token_is_noop() {
    let mgr = manager();
    let wiped = mgr.force_cleanup_at("no-such-token", Uuid::new_v4(), t0()).await.unwrap();
    assert!(!wiped);
}

// =============================================================================
// env_parse
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: i64 = env_parse("__VITRINE_TEST_MISSING__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_invalid_returns_default() {
    unsafe { std::env::set_var("__VITRINE_TEST_INVALID__", "not-a-number") };
    let val: i64 = env_parse("__VITRINE_TEST_INVALID__", 7);
    assert_eq!(val, 7);
}
