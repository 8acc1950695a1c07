//! Room admission control — bounded occupancy with a FIFO waiting queue.
//!
//! ARCHITECTURE
//! ============
//! Rooms live in memory (`state::RoomState`), hydrated from the creator's
//! profile row on entry and evicted when the last connection leaves. This
//! service owns every transition: enter (admit, enqueue, or refuse), leave,
//! manual queue exit, and the admission cascade that fills freed capacity
//! from the queue head within the same call.
//!
//! DESIGN
//! ======
//! Pushes are full-state and best-effort (`try_send`): a queued client is
//! told its current position and wait estimate, never a delta, so duplicate
//! or re-ordered delivery is harmless. The creator never counts against
//! their own capacity and never queues. Queue order is strictly
//! first-in-first-out; a subject re-entering while queued re-uses its
//! existing entry and keeps its place.

use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::{Data, ErrorCode, Event};
use crate::services::session::Subject;
use crate::state::{AppState, QueueEntry, RoomState, Viewer};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("room not found: {0}")]
    RoomNotFound(Uuid),
    #[error("room is full")]
    RoomFull,
    #[error("only the creator can change room settings")]
    Forbidden,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ErrorCode for QueueError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) => "E_ROOM_NOT_FOUND",
            Self::RoomFull => "E_ROOM_FULL",
            Self::Forbidden => "E_FORBIDDEN",
            Self::Db(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}

/// What happened to an `enter_room` caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOutcome {
    Admitted,
    Queued { position: usize, estimated_wait_secs: i64 },
}

/// Full queue state for one subject, served over REST and `queue:status`.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueueSnapshot {
    pub enabled: bool,
    pub is_full: bool,
    pub is_in_queue: bool,
    pub position: Option<usize>,
    pub estimated_wait_secs: Option<i64>,
}

/// Per-creator room knobs, persisted on the profile row.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RoomConfig {
    pub capacity: usize,
    pub queue_enabled: bool,
    pub avg_visit_secs: i64,
}

/// Partial room-config update. Absent fields keep their stored value.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct RoomConfigPatch {
    pub capacity: Option<i32>,
    pub queue_enabled: Option<bool>,
    pub avg_visit_secs: Option<i32>,
}

// =============================================================================
// ENTER / LEAVE
// =============================================================================

/// Enter a creator's room: admitted when capacity allows, queued when full
/// with the queue enabled, refused otherwise. The creator always enters
/// their own room directly.
///
/// # Errors
///
/// `RoomNotFound` for unknown creators, `RoomFull` when full with the
/// queue disabled.
pub async fn enter_room(
    state: &AppState,
    creator_id: Uuid,
    client_id: Uuid,
    subject: Subject,
    tx: mpsc::Sender<Event>,
) -> Result<EnterOutcome, QueueError> {
    // Hydrate before locking: the config read doubles as the existence
    // check, and no lock is held across the query.
    let config = load_room_config(&state.pool, creator_id).await?;

    let mut rooms = state.rooms.write().await;
    let room = rooms.entry(creator_id).or_insert_with(|| {
        RoomState::new(creator_id, config.capacity, config.queue_enabled, config.avg_visit_secs)
    });

    // The creator bypasses capacity and queue outright.
    if subject == Subject::User(creator_id) {
        room.viewers.insert(client_id, Viewer { subject, tx });
        return Ok(EnterOutcome::Admitted);
    }

    // A queued subject reconnecting keeps its place; only the delivery
    // channel moves to the new connection.
    if let Some((idx, entry)) =
        room.queue.iter_mut().enumerate().find(|(_, e)| e.subject == subject)
    {
        entry.client_id = client_id;
        entry.tx = tx;
        let position = idx + 1;
        return Ok(EnterOutcome::Queued {
            position,
            estimated_wait_secs: wait_secs(position, room.avg_visit_secs),
        });
    }

    if !room.is_full() {
        room.viewers.insert(client_id, Viewer { subject, tx });
        broadcast_capacity(room);
        return Ok(EnterOutcome::Admitted);
    }

    if !room.queue_enabled {
        return Err(QueueError::RoomFull);
    }

    room.queue.push_back(QueueEntry { client_id, subject, tx });
    let position = room.queue.len();
    info!(%creator_id, %subject, position, "queued for room");
    Ok(EnterOutcome::Queued {
        position,
        estimated_wait_secs: wait_secs(position, room.avg_visit_secs),
    })
}

/// Leave a room. Freed capacity admits from the queue head in this same
/// call; an empty room is evicted. Unknown rooms and clients are no-ops.
pub async fn leave_room(state: &AppState, creator_id: Uuid, client_id: Uuid) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(&creator_id) else {
        return false;
    };
    if room.viewers.remove(&client_id).is_none() {
        return false;
    }

    let admitted = admit_waiting(room);
    if admitted > 0 {
        push_queue_updates(room);
    }
    broadcast_capacity(room);

    if room.viewers.is_empty() && room.queue.is_empty() {
        rooms.remove(&creator_id);
        debug!(%creator_id, "room evicted");
    }
    true
}

/// Manual queue exit — the only way out of a queue besides admission.
/// Positions behind the leaver renumber contiguously.
pub async fn leave_queue(state: &AppState, creator_id: Uuid, client_id: Uuid) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(&creator_id) else {
        return false;
    };
    let Some(idx) = room.queue.iter().position(|e| e.client_id == client_id) else {
        return false;
    };
    room.queue.remove(idx);
    push_queue_updates(room);

    if room.viewers.is_empty() && room.queue.is_empty() {
        rooms.remove(&creator_id);
        debug!(%creator_id, "room evicted");
    }
    true
}

/// Connection teardown: drop the client wherever it is. Viewers free a
/// slot (cascading an admission), queue entries renumber.
pub async fn disconnect(state: &AppState, creator_id: Uuid, client_id: Uuid) {
    if leave_room(state, creator_id, client_id).await {
        return;
    }
    leave_queue(state, creator_id, client_id).await;
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Queue state as seen by one subject. A room nobody is in reports itself
/// empty without being hydrated.
///
/// # Errors
///
/// `RoomNotFound` for unknown creators.
pub async fn queue_snapshot(
    state: &AppState,
    creator_id: Uuid,
    subject: Subject,
) -> Result<QueueSnapshot, QueueError> {
    {
        let rooms = state.rooms.read().await;
        if let Some(room) = rooms.get(&creator_id) {
            return Ok(snapshot_from_room(room, subject));
        }
    }
    let config = load_room_config(&state.pool, creator_id).await?;
    Ok(QueueSnapshot {
        enabled: config.queue_enabled,
        is_full: false,
        is_in_queue: false,
        position: None,
        estimated_wait_secs: None,
    })
}

fn snapshot_from_room(room: &RoomState, subject: Subject) -> QueueSnapshot {
    let position = room.queue.iter().position(|e| e.subject == subject).map(|i| i + 1);
    QueueSnapshot {
        enabled: room.queue_enabled,
        is_full: room.is_full(),
        is_in_queue: position.is_some(),
        position,
        estimated_wait_secs: position.map(|p| wait_secs(p, room.avg_visit_secs)),
    }
}

// =============================================================================
// ROOM CONFIG
// =============================================================================

/// Room knobs from the creator's profile row.
///
/// # Errors
///
/// `RoomNotFound` when the id is not a creator profile.
pub async fn load_room_config(pool: &PgPool, creator_id: Uuid) -> Result<RoomConfig, QueueError> {
    let row = sqlx::query_as::<_, (i32, bool, i32)>(
        "SELECT room_capacity, queue_enabled, avg_visit_secs
         FROM profiles WHERE id = $1 AND is_creator = true",
    )
    .bind(creator_id)
    .fetch_optional(pool)
    .await?;

    let Some((capacity, queue_enabled, avg_visit_secs)) = row else {
        return Err(QueueError::RoomNotFound(creator_id));
    };
    Ok(RoomConfig {
        capacity: usize::try_from(capacity).unwrap_or(1),
        queue_enabled,
        avg_visit_secs: i64::from(avg_visit_secs),
    })
}

/// Persist a config patch and sync any live room. Creator-only. Raising
/// capacity admits from the queue immediately; lowering it never evicts
/// admitted viewers, it only blocks new admissions.
///
/// # Errors
///
/// `Forbidden` for non-creators, `RoomNotFound` for unknown creators.
pub async fn update_room_config(
    state: &AppState,
    creator_id: Uuid,
    caller: Subject,
    patch: RoomConfigPatch,
) -> Result<RoomConfig, QueueError> {
    if caller != Subject::User(creator_id) {
        return Err(QueueError::Forbidden);
    }

    let row = sqlx::query_as::<_, (i32, bool, i32)>(
        "UPDATE profiles SET
             room_capacity = GREATEST(COALESCE($2, room_capacity), 1),
             queue_enabled = COALESCE($3, queue_enabled),
             avg_visit_secs = GREATEST(COALESCE($4, avg_visit_secs), 1)
         WHERE id = $1 AND is_creator = true
         RETURNING room_capacity, queue_enabled, avg_visit_secs",
    )
    .bind(creator_id)
    .bind(patch.capacity)
    .bind(patch.queue_enabled)
    .bind(patch.avg_visit_secs)
    .fetch_optional(&state.pool)
    .await?;

    let Some((capacity, queue_enabled, avg_visit_secs)) = row else {
        return Err(QueueError::RoomNotFound(creator_id));
    };
    let config = RoomConfig {
        capacity: usize::try_from(capacity).unwrap_or(1),
        queue_enabled,
        avg_visit_secs: i64::from(avg_visit_secs),
    };

    let mut rooms = state.rooms.write().await;
    if let Some(room) = rooms.get_mut(&creator_id) {
        room.capacity = config.capacity;
        room.queue_enabled = config.queue_enabled;
        room.avg_visit_secs = config.avg_visit_secs;

        let admitted = admit_waiting(room);
        if admitted > 0 {
            push_queue_updates(room);
        }
        broadcast_capacity(room);
    }
    Ok(config)
}

// =============================================================================
// ADMISSION CASCADE AND PUSHES
// =============================================================================

/// Admit queue heads while capacity allows. Each admission removes the
/// queue entry (auto-leave) and pushes `queue:admitted` to it.
fn admit_waiting(room: &mut RoomState) -> usize {
    let mut admitted = 0;
    while !room.is_full() {
        let Some(entry) = room.queue.pop_front() else {
            break;
        };
        let event = Event::push("queue:admitted", Data::new()).with_room_id(room.creator_id);
        push_event(&entry.tx, &event);
        info!(creator_id = %room.creator_id, subject = %entry.subject, "admitted from queue");
        room.viewers.insert(entry.client_id, Viewer { subject: entry.subject, tx: entry.tx });
        admitted += 1;
    }
    admitted
}

/// Re-send every waiting entry its current 1-based position and estimate.
fn push_queue_updates(room: &RoomState) {
    for (idx, entry) in room.queue.iter().enumerate() {
        let position = idx + 1;
        let mut data = Data::new();
        data.insert("position".into(), position.into());
        data.insert(
            "estimated_wait_secs".into(),
            wait_secs(position, room.avg_visit_secs).into(),
        );
        let event = Event::push("queue:update", data).with_room_id(room.creator_id);
        push_event(&entry.tx, &event);
    }
}

/// Tell everyone admitted how full the room is.
fn broadcast_capacity(room: &RoomState) {
    let mut data = Data::new();
    data.insert("visitor_count".into(), room.visitor_count().into());
    data.insert("capacity".into(), room.capacity.into());
    data.insert("is_full".into(), room.is_full().into());
    let event = Event::push("room:capacity", data).with_room_id(room.creator_id);
    for viewer in room.viewers.values() {
        push_event(&viewer.tx, &event);
    }
}

fn push_event(tx: &mpsc::Sender<Event>, event: &Event) {
    if tx.try_send(event.clone()).is_err() {
        debug!(op = %event.op, "queue push skipped slow connection");
    }
}

fn wait_secs(position: usize, avg_visit_secs: i64) -> i64 {
    i64::try_from(position).unwrap_or(i64::MAX).saturating_mul(avg_visit_secs)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
