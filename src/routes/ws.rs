//! WebSocket handler — realtime op dispatch and push delivery.
//!
//! DESIGN
//! ======
//! The upgrade is authenticated by a one-time ticket minted over REST, so
//! the browser never puts the session cookie on a ws:// URL. On upgrade the
//! connection gets a client ID and enters a `select!` loop:
//! - Incoming client events → parse + dispatch by op prefix
//! - Pushes from the rest of the system (queue movement, capacity changes,
//!   trial ticks, notifications) → forward to the client
//!
//! Handlers return reply data for the sender only. Pushes to *other*
//! connections are owned by the services (the queue service holds each
//! waiter's sender), never by this dispatch layer.
//!
//! LIFECYCLE
//! =========
//! 1. `POST /api/ws-ticket` mints a ticket bound to the session
//! 2. `GET /api/ws?ticket=..` consumes it and upgrades
//! 3. Upgrade → send `session:connected` with `client_id`
//! 4. Client sends ops → dispatch → reply to sender
//! 5. Close → room teardown (a freed slot admits from the queue) → cleanup

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::{Data, Event, EVENT_CODE, EVENT_MESSAGE, Status};
use crate::services;
use crate::services::session::Subject;
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(ticket) = params.get("ticket") else {
        return (StatusCode::UNAUTHORIZED, "ticket required").into_response();
    };

    let token = match services::session::consume_ws_ticket(&state.pool, ticket).await {
        Ok(Some(token)) => token,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "invalid or expired ticket").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "ws ticket validation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "ticket validation error").into_response();
        }
    };

    let subject = match state.sessions.current_session(&token).await {
        Ok(Some(session)) => session.subject,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "session expired").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "ws session lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "session lookup error").into_response();
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, subject))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, subject: Subject) {
    let client_id = Uuid::new_v4();

    // Per-connection channel for pushes from the rest of the system.
    let (client_tx, mut client_rx) = mpsc::channel::<Event>(256);

    let welcome = Event::push("session:connected", Data::new())
        .with_data("client_id", client_id.to_string())
        .with_data("subject", subject.to_string());
    if send_event(&mut socket, &welcome).await.is_err() {
        return;
    }

    state.register_client(client_id, subject, client_tx.clone()).await;
    info!(%client_id, %subject, "ws: client connected");

    // Track which room this connection occupies or queues for.
    let mut current_room: Option<Uuid> = None;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        dispatch_event(&state, &mut socket, &mut current_room, client_id, subject, &client_tx, &text).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = client_rx.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    // Teardown frees any held slot (cascading an admission) or queue entry.
    if let Some(room_id) = current_room {
        services::queue::disconnect(&state, room_id, client_id).await;
    }
    state.remove_client(client_id).await;
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// EVENT DISPATCH
// =============================================================================

/// Parse an incoming JSON event, dispatch to handler, send replies.
async fn dispatch_event(
    state: &AppState,
    socket: &mut WebSocket,
    current_room: &mut Option<Uuid>,
    client_id: Uuid,
    subject: Subject,
    client_tx: &mpsc::Sender<Event>,
    text: &str,
) {
    let replies = process_inbound_text(state, current_room, client_id, subject, client_tx, text).await;
    for event in replies {
        let _ = send_event(socket, &event).await;
    }
}

/// Parse and process one inbound text event and return events for the sender.
///
/// This keeps the websocket transport concerns separate from event handling,
/// so tests can exercise dispatch without real sockets.
async fn process_inbound_text(
    state: &AppState,
    current_room: &mut Option<Uuid>,
    client_id: Uuid,
    subject: Subject,
    client_tx: &mpsc::Sender<Event>,
    text: &str,
) -> Vec<Event> {
    let mut req: Event = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound event");
            let err = Event::push("gateway:error", Data::new())
                .with_data(EVENT_MESSAGE, format!("invalid json: {e}"));
            return vec![err];
        }
    };

    // Stamp the authenticated subject; clients never speak for others.
    req.from = Some(subject.to_string());

    info!(%client_id, id = %req.id, op = %req.op, status = ?req.status, "ws: recv event");

    let result = match req.prefix() {
        "room" => handle_room(state, current_room, client_id, subject, client_tx, &req).await,
        "queue" => handle_queue(state, current_room, client_id, subject, &req).await,
        prefix => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    match result {
        Ok(data) => vec![req.done_with(data)],
        Err(err_event) => vec![err_event],
    }
}

// =============================================================================
// ROOM HANDLERS
// =============================================================================

async fn handle_room(
    state: &AppState,
    current_room: &mut Option<Uuid>,
    client_id: Uuid,
    subject: Subject,
    client_tx: &mpsc::Sender<Event>,
    req: &Event,
) -> Result<Data, Event> {
    match req.action() {
        "enter" => {
            let Some(room_id) = event_room_id(req) else {
                return Err(req.error("room_id required"));
            };

            // Switching rooms drops the old membership first. Re-entering
            // the current room must NOT free the slot, or the caller could
            // lose it to the queue head.
            if let Some(old_room) = *current_room {
                if old_room != room_id {
                    services::queue::disconnect(state, old_room, client_id).await;
                    *current_room = None;
                }
            }

            match services::queue::enter_room(state, room_id, client_id, subject, client_tx.clone()).await {
                Ok(outcome) => {
                    *current_room = Some(room_id);
                    let mut data = Data::new();
                    match outcome {
                        services::queue::EnterOutcome::Admitted => {
                            data.insert("admitted".into(), serde_json::json!(true));
                        }
                        services::queue::EnterOutcome::Queued { position, estimated_wait_secs } => {
                            data.insert("admitted".into(), serde_json::json!(false));
                            data.insert("position".into(), serde_json::json!(position));
                            data.insert("estimated_wait_secs".into(), serde_json::json!(estimated_wait_secs));
                        }
                    }
                    Ok(data)
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "leave" => {
            let Some(room_id) = *current_room else {
                return Err(req.error("not in a room"));
            };
            // Only admitted viewers leave this way; a queued connection
            // keeps its place until `queue:leave` or disconnect.
            if services::queue::leave_room(state, room_id, client_id).await {
                *current_room = None;
                Ok(Data::new())
            } else {
                Err(req.error("not admitted to the room"))
            }
        }
        op => Err(req.error(format!("unknown room op: {op}"))),
    }
}

// =============================================================================
// QUEUE HANDLERS
// =============================================================================

async fn handle_queue(
    state: &AppState,
    current_room: &mut Option<Uuid>,
    client_id: Uuid,
    subject: Subject,
    req: &Event,
) -> Result<Data, Event> {
    match req.action() {
        "leave" => {
            let Some(room_id) = *current_room else {
                return Err(req.error("not queued for a room"));
            };
            if services::queue::leave_queue(state, room_id, client_id).await {
                *current_room = None;
                Ok(Data::new())
            } else {
                Err(req.error("not in the queue"))
            }
        }
        "status" => {
            let Some(room_id) = event_room_id(req).or(*current_room) else {
                return Err(req.error("room_id required"));
            };
            match services::queue::queue_snapshot(state, room_id, subject).await {
                Ok(snapshot) => Ok(flatten(&snapshot)),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        op => Err(req.error(format!("unknown queue op: {op}"))),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Room id from the event envelope or, failing that, its data map.
fn event_room_id(req: &Event) -> Option<Uuid> {
    req.room_id.or_else(|| {
        req.data
            .get("room_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    })
}

/// Serialize a flat struct into event data. Anything non-object (which
/// serde-derived structs never produce) becomes empty data.
fn flatten<T: serde::Serialize>(value: &T) -> Data {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => Data::new(),
    }
}

async fn send_event(socket: &mut WebSocket, event: &Event) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize event");
            return Err(());
        }
    };
    // Trial ticks arrive once a second; logging them would drown the rest.
    let is_tick = event.op == "trial:tick";
    if !is_tick {
        if event.status == Status::Error {
            let code = event.data.get(EVENT_CODE).and_then(|v| v.as_str()).unwrap_or("-");
            let message = event.data.get(EVENT_MESSAGE).and_then(|v| v.as_str()).unwrap_or("-");
            warn!(id = %event.id, op = %event.op, code, message, "ws: send event status=Error");
        } else {
            info!(id = %event.id, op = %event.op, status = ?event.status, "ws: send event");
        }
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
