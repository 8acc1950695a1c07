use axum::http::{HeaderMap, HeaderValue, StatusCode};

use super::authorize;
use crate::state::test_helpers::test_app_state;

fn headers_with_key(key: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(super::ADMIN_KEY_HEADER, HeaderValue::from_static(key));
    headers
}

#[tokio::test]
async fn admin_surface_pretends_not_to_exist_when_unconfigured() {
    let mut state = test_app_state();
    state.admin_key = None;

    let result = authorize(&state, &headers_with_key("anything"));
    assert_eq!(result, Err(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn admin_surface_rejects_missing_or_wrong_keys() {
    let mut state = test_app_state();
    state.admin_key = Some("hunter2".to_string());

    assert_eq!(
        authorize(&state, &HeaderMap::new()),
        Err(StatusCode::UNAUTHORIZED)
    );
    assert_eq!(
        authorize(&state, &headers_with_key("hunter3")),
        Err(StatusCode::UNAUTHORIZED)
    );
}

#[tokio::test]
async fn admin_surface_accepts_the_configured_key() {
    let mut state = test_app_state();
    state.admin_key = Some("hunter2".to_string());

    assert_eq!(authorize(&state, &headers_with_key("hunter2")), Ok(()));
}
