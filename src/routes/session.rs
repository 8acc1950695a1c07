//! Session routes — guest bootstrap, login-grant exchange, ws tickets.

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::services::session::{self as session_svc, Session, Subject};
use crate::state::AppState;

const COOKIE_NAME: &str = "vitrine_session";

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

pub(crate) fn cookie_secure() -> bool {
    if let Some(value) = env_bool("COOKIE_SECURE") {
        return value;
    }

    std::env::var("PUBLIC_BASE_URL")
        .map(|uri| uri.starts_with("https://"))
        .unwrap_or(false)
}

// =============================================================================
// AUTH EXTRACTORS
// =============================================================================

/// Live session extracted from the session cookie. Use as a handler
/// parameter to require a caller, registered or guest.
pub struct AuthSession {
    pub session: Session,
}

impl AuthSession {
    #[must_use]
    pub fn subject(&self) -> Subject {
        self.session.subject
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
        if token.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }

        let app_state = AppState::from_ref(state);
        let session = app_state
            .sessions
            .current_session(token)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(Self { session })
    }
}

/// Registered-user session. Guests are turned away with 403: the endpoint
/// exists, it just needs a login.
pub struct AuthUser {
    pub user_id: Uuid,
    pub session: Session,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let auth =
            <AuthSession as axum::extract::FromRequestParts<S>>::from_request_parts(parts, state)
                .await?;
        let Some(user_id) = auth.session.subject.as_user() else {
            return Err(StatusCode::FORBIDDEN);
        };
        Ok(Self { user_id, session: auth.session })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `POST /api/session/guest` — anonymous session with a trial budget.
pub async fn start_guest(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let trial_credits = state.trials.guest_credits();
    let (token, guest_id) = state
        .sessions
        .start_guest_session(trial_credits)
        .await
        .map_err(session_error_to_status)?;
    state.trials.register(guest_id);
    info!(%guest_id, trial_credits, "guest session started");

    let secure = cookie_secure();
    let cookie = Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure);
    let jar = CookieJar::new().add(cookie);
    Ok((
        jar,
        Json(serde_json::json!({
            "guest_id": guest_id,
            "trial_credits": trial_credits,
        })),
    ))
}

#[derive(Deserialize)]
pub struct ExchangeBody {
    pub grant: String,
}

/// `POST /api/session/exchange` — trade a one-time login grant for a user
/// session. Any stale session on this device belonging to someone else is
/// wiped before the new cookie is set.
pub async fn exchange_login_grant(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<ExchangeBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = session_svc::consume_login_grant(&state.pool, &body.grant)
        .await
        .map_err(session_error_to_status)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let presented = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
    if !presented.is_empty() {
        let stale = state
            .sessions
            .current_session(presented)
            .await
            .map_err(session_error_to_status)?;
        let wiped = state
            .sessions
            .force_cleanup(presented, user_id)
            .await
            .map_err(session_error_to_status)?;
        if wiped {
            info!(%user_id, "cleared stale session at login exchange");
            // A wiped guest session takes its trial clock with it.
            if let Some(Subject::Guest(guest_id)) = stale.map(|s| s.subject) {
                state.trials.remove(guest_id);
            }
        }
    }

    let token = state
        .sessions
        .start_user_session(user_id)
        .await
        .map_err(session_error_to_status)?;

    let secure = cookie_secure();
    let cookie = Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure);
    Ok((jar.add(cookie), Json(serde_json::json!({ "user_id": user_id }))))
}

/// `GET /api/session/me` — describe the current session. Reading your own
/// session counts as activity.
pub async fn me(State(state): State<AppState>, auth: AuthSession) -> Json<serde_json::Value> {
    let _ = state.sessions.update_activity(&auth.session.token).await;
    Json(session_response(&auth.session))
}

/// `POST /api/session/activity` — explicit idle-clock refresh.
pub async fn activity(
    State(state): State<AppState>,
    auth: AuthSession,
) -> Result<StatusCode, StatusCode> {
    state
        .sessions
        .update_activity(&auth.session.token)
        .await
        .map_err(session_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/session/logout` — end the session, clear the cookie.
pub async fn logout(State(state): State<AppState>, auth: AuthSession) -> impl IntoResponse {
    let _ = state.sessions.end_session(&auth.session.token).await;
    if let Subject::Guest(guest_id) = auth.session.subject {
        state.trials.remove(guest_id);
    }

    let secure = cookie_secure();
    let cookie = Cookie::build((COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::ZERO);

    let jar = CookieJar::new().add(cookie);
    (jar, StatusCode::NO_CONTENT)
}

/// `POST /api/ws-ticket` — one-time ticket for the websocket upgrade.
pub async fn ws_ticket(
    State(state): State<AppState>,
    auth: AuthSession,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let ticket = session_svc::create_ws_ticket(&state.pool, &auth.session.token)
        .await
        .map_err(session_error_to_status)?;
    Ok(Json(serde_json::json!({ "ticket": ticket })))
}

pub(crate) fn session_error_to_status(err: session_svc::SessionError) -> StatusCode {
    match err {
        session_svc::SessionError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn session_response(session: &Session) -> serde_json::Value {
    let (kind, subject_id) = match session.subject {
        Subject::User(id) => ("user", id),
        Subject::Guest(id) => ("guest", id),
    };
    serde_json::json!({
        "kind": kind,
        "subject_id": subject_id,
        "trial_credits": session.trial_credits,
    })
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
