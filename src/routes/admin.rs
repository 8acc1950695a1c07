//! Admin routes — key-gated operational surface.
//!
//! DESIGN
//! ======
//! Everything here requires the `x-admin-key` header to match
//! `ADMIN_API_KEY`. When the key is unconfigured the surface answers 404,
//! as if it did not exist. These endpoints stand in for the platform's
//! signup/login/payment collaborators: they mint profiles and login
//! grants and top up balances so the core can run end to end.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::routes::account::credit_error_to_status;
use crate::routes::session::session_error_to_status;
use crate::services::session as session_svc;
use crate::services::{credits, notify};
use crate::state::AppState;
use crate::validate::validate_credits;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    // An unconfigured admin surface does not exist.
    let Some(expected) = state.admin_key.as_deref() else {
        return Err(StatusCode::NOT_FOUND);
    };
    let presented = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented.is_empty() || presented != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct CreateProfileBody {
    pub display_name: String,
    #[serde(default)]
    pub is_creator: bool,
}

/// `POST /api/admin/profiles` — mint a profile row. Stands in for the
/// platform signup flow.
pub async fn create_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateProfileBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    authorize(&state, &headers)?;

    let name = body.display_name.trim();
    if name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let profile_id: Uuid = sqlx::query_scalar(
        "INSERT INTO profiles (display_name, is_creator) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(body.is_creator)
    .fetch_one(&state.pool)
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    info!(%profile_id, is_creator = body.is_creator, "admin minted profile");
    Ok(Json(serde_json::json!({ "profile_id": profile_id })))
}

#[derive(Deserialize)]
pub struct LoginGrantBody {
    pub user_id: Uuid,
}

/// `POST /api/admin/login-grant` — mint a one-time login grant for the
/// session-exchange endpoint. Stands in for the platform login flow.
pub async fn mint_login_grant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginGrantBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    authorize(&state, &headers)?;

    let grant = session_svc::create_login_grant(&state.pool, body.user_id)
        .await
        .map_err(session_error_to_status)?;
    info!(user_id = %body.user_id, "admin minted login grant");
    Ok(Json(serde_json::json!({ "grant": grant })))
}

#[derive(Deserialize)]
pub struct TopupBody {
    pub profile_id: Uuid,
    pub amount: serde_json::Value,
}

/// `POST /api/admin/credits/topup` — grant credits to a profile. The
/// amount is clamped into the valid credit range; the recipient gets a
/// notification carrying it.
pub async fn topup_credits(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TopupBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    authorize(&state, &headers)?;

    let amount = validate_credits(&body.amount).data;
    let credits = credits::grant(&state.pool, body.profile_id, amount)
        .await
        .map_err(credit_error_to_status)?;

    notify::emit(
        &state,
        body.profile_id,
        "credits:topup",
        serde_json::json!({ "amount": amount }),
        Some(amount),
    );
    info!(profile_id = %body.profile_id, amount, "admin credit top-up");
    Ok(Json(serde_json::json!({ "credits": credits })))
}

#[derive(Deserialize)]
pub struct TrialResetBody {
    pub guest_id: Uuid,
}

/// `POST /api/admin/trial/reset` — restart a guest's trial clock and
/// restore the trial credit budget on the session row.
pub async fn reset_trial(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TrialResetBody>,
) -> Result<StatusCode, StatusCode> {
    authorize(&state, &headers)?;

    let budget = state.trials.guest_credits();
    sqlx::query("UPDATE sessions SET trial_credits = $2 WHERE guest_id = $1")
        .bind(body.guest_id)
        .bind(budget)
        .execute(&state.pool)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    state.trials.reset(body.guest_id);

    info!(guest_id = %body.guest_id, budget, "admin trial reset");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod tests;
