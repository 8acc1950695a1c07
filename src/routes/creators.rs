//! Creator-page routes — visibility settings, access gate, room config.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::routes::session::AuthSession;
use crate::services::access::{self, AccessError};
use crate::services::queue::{self, QueueError, RoomConfig, RoomConfigPatch};
use crate::services::session::Subject;
use crate::services::visibility::{self, VisibilityError, VisibilityPatch, VisibilitySettings};
use crate::state::AppState;

// =============================================================================
// VISIBILITY SETTINGS
// =============================================================================

/// `GET /api/creators/:id/settings` — flags as this viewer may see them.
/// Non-creators always receive the edit affordances forced off.
pub async fn get_settings(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(creator_id): Path<Uuid>,
) -> Json<VisibilitySettings> {
    Json(visibility::load(&state.pool, creator_id, Some(auth.subject())).await)
}

/// `PUT /api/creators/:id/settings` — merge a flag patch. Creator-only.
pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(creator_id): Path<Uuid>,
    Json(patch): Json<VisibilityPatch>,
) -> Result<Json<VisibilitySettings>, StatusCode> {
    if patch.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let settings = visibility::update(&state.pool, creator_id, auth.subject(), &patch)
        .await
        .map_err(visibility_error_to_status)?;
    Ok(Json(settings))
}

// =============================================================================
// ACCESS GATE
// =============================================================================

/// `GET /api/creators/:id/access` — is the page gated, and does this
/// session get in.
pub async fn access_status(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(creator_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let gated = access::is_gated(&state.pool, creator_id)
        .await
        .map_err(access_error_to_status)?;
    let allowed = access::has_access(&state.pool, auth.subject(), creator_id)
        .await
        .map_err(access_error_to_status)?;
    Ok(Json(serde_json::json!({ "gated": gated, "access": allowed })))
}

#[derive(Deserialize)]
pub struct VerifyBody {
    pub code: String,
}

/// `POST /api/creators/:id/access/verify` — attempt the access code.
pub async fn verify_access(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(creator_id): Path<Uuid>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    access::verify_access_code(&state.pool, auth.subject(), creator_id, &body.code)
        .await
        .map_err(access_error_to_status)?;
    Ok(Json(serde_json::json!({ "access": true })))
}

#[derive(Deserialize)]
pub struct AccessCodeBody {
    pub code: Option<String>,
}

/// `PUT /api/creators/:id/access/code` — set or clear the page code.
/// Clearing opens the page; either way existing code grants are revoked.
pub async fn set_access_code(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(creator_id): Path<Uuid>,
    Json(body): Json<AccessCodeBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    access::set_access_code(&state.pool, creator_id, auth.subject(), body.code.as_deref())
        .await
        .map_err(access_error_to_status)?;
    let gated = body.code.as_deref().is_some_and(|c| !c.trim().is_empty());
    Ok(Json(serde_json::json!({ "gated": gated })))
}

// =============================================================================
// ROOM CONFIG AND QUEUE MIRROR
// =============================================================================

/// `GET /api/rooms/:creator_id/queue` — the caller's queue snapshot.
pub async fn queue_status(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(creator_id): Path<Uuid>,
) -> Result<Json<queue::QueueSnapshot>, StatusCode> {
    let snapshot = queue::queue_snapshot(&state, creator_id, auth.subject())
        .await
        .map_err(queue_error_to_status)?;
    Ok(Json(snapshot))
}

/// `GET /api/rooms/:creator_id/config` — room knobs. Creator-only.
pub async fn room_config(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(creator_id): Path<Uuid>,
) -> Result<Json<RoomConfig>, StatusCode> {
    if auth.subject() != Subject::User(creator_id) {
        return Err(StatusCode::FORBIDDEN);
    }
    let config = queue::load_room_config(&state.pool, creator_id)
        .await
        .map_err(queue_error_to_status)?;
    Ok(Json(config))
}

/// `PUT /api/rooms/:creator_id/config` — persist a knob patch and sync any
/// live room. Creator-only.
pub async fn update_room_config(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(creator_id): Path<Uuid>,
    Json(patch): Json<RoomConfigPatch>,
) -> Result<Json<RoomConfig>, StatusCode> {
    let config = queue::update_room_config(&state, creator_id, auth.subject(), patch)
        .await
        .map_err(queue_error_to_status)?;
    Ok(Json(config))
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

pub(crate) fn visibility_error_to_status(err: VisibilityError) -> StatusCode {
    match err {
        VisibilityError::Forbidden => StatusCode::FORBIDDEN,
        VisibilityError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn access_error_to_status(err: AccessError) -> StatusCode {
    match err {
        AccessError::Forbidden => StatusCode::FORBIDDEN,
        AccessError::InvalidCode => StatusCode::BAD_REQUEST,
        AccessError::VerificationFailed => StatusCode::FORBIDDEN,
        AccessError::LockedOut => StatusCode::TOO_MANY_REQUESTS,
        AccessError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn queue_error_to_status(err: QueueError) -> StatusCode {
    match err {
        QueueError::RoomNotFound(_) => StatusCode::NOT_FOUND,
        QueueError::RoomFull => StatusCode::CONFLICT,
        QueueError::Forbidden => StatusCode::FORBIDDEN,
        QueueError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
#[path = "creators_test.rs"]
mod tests;
