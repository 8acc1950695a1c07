//! Vitrine routes — item listing, creator management, unlock purchases.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use uuid::Uuid;

use crate::routes::creators::access_error_to_status;
use crate::routes::session::AuthSession;
use crate::services::access;
use crate::services::vitrine::{self, NewItem, UnlockReceipt, VitrineError, VitrineItem};
use crate::state::AppState;

/// `GET /api/creators/:id/vitrine` — the page's items, redacted for this
/// viewer. Gated pages require access first.
pub async fn list_items(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(creator_id): Path<Uuid>,
) -> Result<Json<Vec<VitrineItem>>, StatusCode> {
    let allowed = access::has_access(&state.pool, auth.subject(), creator_id)
        .await
        .map_err(access_error_to_status)?;
    if !allowed {
        return Err(StatusCode::FORBIDDEN);
    }

    let items = vitrine::list_items(&state.pool, creator_id, auth.subject())
        .await
        .map_err(vitrine_error_to_status)?;
    Ok(Json(items))
}

/// `POST /api/creators/:id/vitrine` — add an item. Creator-only.
pub async fn create_item(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(creator_id): Path<Uuid>,
    Json(body): Json<NewItem>,
) -> Result<(StatusCode, Json<VitrineItem>), StatusCode> {
    let item = vitrine::create_item(&state.pool, creator_id, auth.subject(), body)
        .await
        .map_err(vitrine_error_to_status)?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// `DELETE /api/vitrine/:item_id` — remove one of your own items.
pub async fn delete_item(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    vitrine::delete_item(&state.pool, item_id, auth.subject())
        .await
        .map_err(vitrine_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/vitrine/:item_id/unlock` — buy access to a locked item.
pub async fn unlock_item(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(item_id): Path<Uuid>,
) -> Result<Json<UnlockReceipt>, StatusCode> {
    let receipt = vitrine::unlock_item(&state, auth.subject(), item_id)
        .await
        .map_err(vitrine_error_to_status)?;
    Ok(Json(receipt))
}

pub(crate) fn vitrine_error_to_status(err: VitrineError) -> StatusCode {
    match err {
        VitrineError::ItemNotFound(_) => StatusCode::NOT_FOUND,
        VitrineError::Forbidden | VitrineError::TrialExpired => StatusCode::FORBIDDEN,
        VitrineError::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
        VitrineError::Invalid(_) => StatusCode::BAD_REQUEST,
        VitrineError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
#[path = "vitrine_routes_test.rs"]
mod tests;
