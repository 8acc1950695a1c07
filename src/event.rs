//! Event — the universal realtime message type for Vitrine.
//!
//! ARCHITECTURE
//! ============
//! Every websocket exchange is an Event. Clients send request events, the
//! server dispatches by op prefix ("room:", "queue:", ...), and responses
//! flow back as item/done/error events. Server-initiated pushes (queue
//! positions, trial ticks, notifications) are item-status events with no
//! parent.
//!
//! DESIGN
//! ======
//! - Flat data: payload is always `Map<String, Value>`, never nested.
//! - Responses correlate to requests via `parent_id`.
//! - The WS handler routes on the `op` prefix and never inspects `data`.
//! - Consumers tolerate duplicate or re-ordered pushes: every push carries
//!   the full current state for its topic, not a delta.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Event data key for error messages.
pub const EVENT_MESSAGE: &str = "message";

/// Event data key for grepable error codes.
pub const EVENT_CODE: &str = "code";

/// Event data key for the retryable flag on error events.
pub const EVENT_RETRYABLE: &str = "retryable";

// =============================================================================
// TYPES
// =============================================================================

/// Flat key-value payload. Alias to reduce noise in signatures.
pub type Data = HashMap<String, serde_json::Value>;

/// Lifecycle position of an event in a request/response stream.
///
/// Every exchange is `request → item* → done` or `request → error`.
/// No special cases, no "ok" shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Request,
    Item,
    Done,
    Error,
    Cancel,
}

impl Status {
    /// Terminal statuses end a response stream.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Error | Status::Cancel)
    }
}

/// The universal message type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    pub ts: i64,
    /// Creator room this event concerns, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<Uuid>,
    /// Subject id of the sender, stamped by the server on inbound events.
    pub from: Option<String>,
    pub op: String,
    pub status: Status,
    pub data: Data,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error events.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Event {
    /// Create a request event. Entry point for every client op.
    pub fn request(op: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            room_id: None,
            from: None,
            op: op.into(),
            status: Status::Request,
            data,
        }
    }

    /// Create a server-initiated push. No parent: nothing asked for it.
    pub fn push(op: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            room_id: None,
            from: None,
            op: op.into(),
            status: Status::Item,
            data,
        }
    }

    /// Create an item response carrying one result.
    #[must_use]
    pub fn item(&self, data: Data) -> Self {
        self.reply(Status::Item, data)
    }

    /// Create a done response. Terminal.
    #[must_use]
    pub fn done(&self) -> Self {
        self.reply(Status::Done, Data::new())
    }

    /// Create a done response carrying final data. Terminal.
    #[must_use]
    pub fn done_with(&self, data: Data) -> Self {
        self.reply(Status::Done, data)
    }

    /// Create an error response from a plain string. Terminal.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Self {
        let mut data = Data::new();
        data.insert(EVENT_MESSAGE.into(), serde_json::Value::String(message.into()));
        self.reply(Status::Error, data)
    }

    /// Create a structured error response from a typed error. Terminal.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        let mut data = Data::new();
        data.insert(EVENT_CODE.into(), serde_json::Value::String(err.error_code().to_string()));
        data.insert(EVENT_MESSAGE.into(), serde_json::Value::String(err.to_string()));
        data.insert(EVENT_RETRYABLE.into(), serde_json::Value::Bool(err.retryable()));
        self.reply(Status::Error, data)
    }

    /// Build a reply event. Inherits `parent_id`, `room_id`, and `op`.
    fn reply(&self, status: Status, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            ts: now_ms(),
            room_id: self.room_id,
            from: None,
            op: self.op.clone(),
            status,
            data,
        }
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Event {
    #[must_use]
    pub fn with_room_id(mut self, room_id: Uuid) -> Self {
        self.room_id = Some(room_id);
        self
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// ROUTING
// =============================================================================

impl Event {
    /// Extract the op prefix (everything before the first ':').
    #[must_use]
    pub fn prefix(&self) -> &str {
        let Some((prefix, _)) = self.op.split_once(':') else {
            return &self.op;
        };
        prefix
    }

    /// Extract the op suffix (everything after the first ':').
    #[must_use]
    pub fn action(&self) -> &str {
        self.op.split_once(':').map_or("", |(_, action)| action)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_sets_fields() {
        let event = Event::request("room:enter", Data::new());
        assert_eq!(event.op, "room:enter");
        assert_eq!(event.status, Status::Request);
        assert!(event.parent_id.is_none());
        assert!(event.room_id.is_none());
        assert!(event.ts > 0);
    }

    #[test]
    fn reply_inherits_context() {
        let room_id = Uuid::new_v4();
        let req = Event::request("queue:status", Data::new()).with_room_id(room_id);
        let item = req.item(Data::new());

        assert_eq!(item.parent_id, Some(req.id));
        assert_eq!(item.room_id, Some(room_id));
        assert_eq!(item.op, "queue:status");
        assert_eq!(item.status, Status::Item);
    }

    #[test]
    fn done_is_terminal() {
        assert!(Status::Done.is_terminal());
        assert!(Status::Error.is_terminal());
        assert!(Status::Cancel.is_terminal());
        assert!(!Status::Request.is_terminal());
        assert!(!Status::Item.is_terminal());
    }

    #[test]
    fn prefix_and_action_extraction() {
        let event = Event::request("queue:leave", Data::new());
        assert_eq!(event.prefix(), "queue");
        assert_eq!(event.action(), "leave");

        let event = Event::request("noseparator", Data::new());
        assert_eq!(event.prefix(), "noseparator");
        assert_eq!(event.action(), "");
    }

    #[test]
    fn json_round_trip() {
        let room_id = Uuid::new_v4();
        let original = Event::request("room:enter", Data::new())
            .with_room_id(room_id)
            .with_from("guest-1")
            .with_data("key", "value");

        let json = serde_json::to_string(&original).expect("serialize");
        let restored: Event = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(restored.id, original.id);
        assert_eq!(restored.room_id, Some(room_id));
        assert_eq!(restored.op, "room:enter");
        assert_eq!(restored.from.as_deref(), Some("guest-1"));
        assert_eq!(restored.data.get("key").and_then(|v| v.as_str()), Some("value"));
    }

    #[test]
    fn error_from_typed() {
        #[derive(Debug, thiserror::Error)]
        #[error("room is full")]
        struct RoomFull;

        impl ErrorCode for RoomFull {
            fn error_code(&self) -> &'static str {
                "E_ROOM_FULL"
            }

            fn retryable(&self) -> bool {
                true
            }
        }

        let req = Event::request("room:enter", Data::new());
        let err = req.error_from(&RoomFull);

        assert_eq!(err.status, Status::Error);
        assert_eq!(err.data.get("code").and_then(|v| v.as_str()), Some("E_ROOM_FULL"));
        assert_eq!(err.data.get("message").and_then(|v| v.as_str()), Some("room is full"));
        assert_eq!(err.data.get("retryable").and_then(serde_json::Value::as_bool), Some(true));
    }
}
