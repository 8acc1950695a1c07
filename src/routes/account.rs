//! Own-account routes — credit balance, trial status, notifications.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use uuid::Uuid;

use crate::routes::session::{AuthSession, AuthUser};
use crate::services::credits::{self, CreditError};
use crate::services::notify::{self, Notification, NotifyError};
use crate::services::session::Subject;
use crate::state::AppState;

/// `GET /api/credits` — what the caller can spend right now: profile
/// credits for users, the session's trial credits for guests.
pub async fn get_credits(
    State(state): State<AppState>,
    auth: AuthSession,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let credits = match auth.subject() {
        Subject::User(user_id) => credits::balance(&state.pool, user_id)
            .await
            .map_err(credit_error_to_status)?,
        // The extractor read the session row this request; that is current.
        Subject::Guest(_) => auth.session.trial_credits,
    };
    Ok(Json(serde_json::json!({ "credits": credits })))
}

/// `GET /api/trial` — the guest trial countdown. Users have no trial.
pub async fn trial_status(
    State(state): State<AppState>,
    auth: AuthSession,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let Subject::Guest(guest_id) = auth.subject() else {
        return Err(StatusCode::NOT_FOUND);
    };

    // A clock missing from the registry (say, after a restart) reads as
    // expired: the viewer is told to log in rather than given a free trial.
    let snapshot = state.trials.snapshot(guest_id);
    let (remaining_secs, expired) =
        snapshot.map_or((0, true), |s| (s.remaining_secs, s.expired));
    Ok(Json(serde_json::json!({
        "remaining_secs": remaining_secs,
        "expired": expired,
        "trial_credits": auth.session.trial_credits,
    })))
}

/// `GET /api/notifications` — newest 50 for the logged-in user.
pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Notification>>, StatusCode> {
    let items = notify::list(&state.pool, auth.user_id)
        .await
        .map_err(notify_error_to_status)?;
    Ok(Json(items))
}

/// `POST /api/notifications/:id/read` — mark one of your own as read.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let updated = notify::mark_read(&state.pool, auth.user_id, id)
        .await
        .map_err(notify_error_to_status)?;
    if updated { Ok(StatusCode::NO_CONTENT) } else { Err(StatusCode::NOT_FOUND) }
}

pub(crate) fn credit_error_to_status(err: CreditError) -> StatusCode {
    match err {
        CreditError::Insufficient => StatusCode::PAYMENT_REQUIRED,
        CreditError::NotFound(_) => StatusCode::NOT_FOUND,
        CreditError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn notify_error_to_status(err: NotifyError) -> StatusCode {
    match err {
        NotifyError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
#[path = "account_test.rs"]
mod tests;
