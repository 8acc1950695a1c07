//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the REST API and the websocket endpoint under a single Axum
//! router. This process is the authority for sessions, access gating,
//! queue admission, credits, and realtime signals; the creator pages
//! themselves are rendered elsewhere and talk to `/api`.

pub mod account;
pub mod admin;
pub mod creators;
pub mod session;
pub mod vitrine;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/session/guest", post(session::start_guest))
        .route("/api/session/exchange", post(session::exchange_login_grant))
        .route("/api/session/me", get(session::me))
        .route("/api/session/activity", post(session::activity))
        .route("/api/session/logout", post(session::logout))
        .route("/api/ws-ticket", post(session::ws_ticket))
        .route(
            "/api/creators/{id}/settings",
            get(creators::get_settings).put(creators::update_settings),
        )
        .route("/api/creators/{id}/access", get(creators::access_status))
        .route("/api/creators/{id}/access/verify", post(creators::verify_access))
        .route("/api/creators/{id}/access/code", put(creators::set_access_code))
        .route(
            "/api/creators/{id}/vitrine",
            get(vitrine::list_items).post(vitrine::create_item),
        )
        .route("/api/vitrine/{item_id}", delete(vitrine::delete_item))
        .route("/api/vitrine/{item_id}/unlock", post(vitrine::unlock_item))
        .route("/api/rooms/{creator_id}/queue", get(creators::queue_status))
        .route(
            "/api/rooms/{creator_id}/config",
            get(creators::room_config).put(creators::update_room_config),
        )
        .route("/api/credits", get(account::get_credits))
        .route("/api/trial", get(account::trial_status))
        .route("/api/notifications", get(account::list_notifications))
        .route("/api/notifications/{id}/read", post(account::mark_notification_read))
        .route("/api/admin/profiles", post(admin::create_profile))
        .route("/api/admin/login-grant", post(admin::mint_login_grant))
        .route("/api/admin/credits/topup", post(admin::topup_credits))
        .route("/api/admin/trial/reset", post(admin::reset_trial))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
