use super::*;
use time::OffsetDateTime;

// env_bool tests use unique env var names to avoid races with parallel tests.

#[test]
fn env_bool_true_and_false_variants() {
    for (i, val) in ["1", "true", "yes", "on"].iter().enumerate() {
        let key = format!("__VITRINE_EB_TRUE_{i}__");
        unsafe { std::env::set_var(&key, val) };
        assert_eq!(env_bool(&key), Some(true), "expected true for {val:?}");
        unsafe { std::env::remove_var(&key) };
    }
    for (i, val) in ["0", "false", "no", "off"].iter().enumerate() {
        let key = format!("__VITRINE_EB_FALSE_{i}__");
        unsafe { std::env::set_var(&key, val) };
        assert_eq!(env_bool(&key), Some(false), "expected false for {val:?}");
        unsafe { std::env::remove_var(&key) };
    }
}

#[test]
fn env_bool_trims_and_ignores_case() {
    let key = "__VITRINE_EB_CI__";
    unsafe { std::env::set_var(key, "  True  ") };
    assert_eq!(env_bool(key), Some(true));
    unsafe { std::env::remove_var(key) };
}

#[test]
fn env_bool_rejects_noise() {
    let key = "__VITRINE_EB_NOISE__";
    unsafe { std::env::set_var(key, "maybe") };
    assert_eq!(env_bool(key), None);
    unsafe { std::env::remove_var(key) };

    assert_eq!(env_bool("__VITRINE_EB_SURELY_UNSET__"), None);
}

#[test]
fn session_errors_map_to_internal_error() {
    let status = session_error_to_status(session_svc::SessionError::Db(sqlx::Error::PoolClosed));
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn session_response_names_the_subject_kind() {
    let now = OffsetDateTime::now_utc();
    let user_id = Uuid::new_v4();
    let user = Session {
        token: "t".into(),
        subject: Subject::User(user_id),
        created_at: now,
        last_activity: now,
        expires_at: None,
        trial_credits: 0,
    };
    let body = session_response(&user);
    assert_eq!(body.get("kind").and_then(|v| v.as_str()), Some("user"));
    assert_eq!(
        body.get("subject_id").and_then(|v| v.as_str()),
        Some(user_id.to_string().as_str())
    );

    let guest = Session {
        token: "t".into(),
        subject: Subject::Guest(Uuid::new_v4()),
        created_at: now,
        last_activity: now,
        expires_at: Some(now),
        trial_credits: 100,
    };
    let body = session_response(&guest);
    assert_eq!(body.get("kind").and_then(|v| v.as_str()), Some("guest"));
    assert_eq!(body.get("trial_credits").and_then(serde_json::Value::as_i64), Some(100));
}
