//! Notifications — fire-and-forget records plus best-effort live pushes.
//!
//! Writers never wait on the outcome: a lost notification is an acceptable
//! cost, a blocked unlock is not. The insert runs on a spawned task; when it
//! lands and the recipient has a live connection, a `notify:new` push
//! follows on the non-blocking send path.

use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::event::{Data, ErrorCode, Event};
use crate::services::session::Subject;
use crate::state::AppState;

const LIST_LIMIT: i64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ErrorCode for NotifyError {
    fn error_code(&self) -> &'static str {
        "E_DATABASE"
    }

    fn retryable(&self) -> bool {
        true
    }
}

/// One notification as served to its recipient. Timestamps are milliseconds
/// since Unix epoch, like every event `ts`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: String,
    pub body: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_amount: Option<i64>,
    pub created_at: i64,
    pub read: bool,
}

/// Record a notification for a user and nudge any live connection.
/// Fire-and-forget: the caller never learns about storage failures.
pub fn emit(
    state: &AppState,
    recipient_id: Uuid,
    kind: &str,
    body: serde_json::Value,
    credit_amount: Option<i64>,
) {
    let state = state.clone();
    let kind = kind.to_string();
    tokio::spawn(async move {
        let inserted: Result<Uuid, sqlx::Error> = sqlx::query_scalar(
            "INSERT INTO notifications (recipient_id, kind, body, credit_amount)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(recipient_id)
        .bind(&kind)
        .bind(&body)
        .bind(credit_amount)
        .fetch_one(&state.pool)
        .await;

        match inserted {
            Ok(id) => {
                let mut data = Data::new();
                data.insert("id".into(), serde_json::json!(id));
                data.insert("kind".into(), serde_json::Value::String(kind));
                data.insert("body".into(), body);
                if let Some(amount) = credit_amount {
                    data.insert("credit_amount".into(), amount.into());
                }
                state
                    .push_to_subject(Subject::User(recipient_id), &Event::push("notify:new", data))
                    .await;
            }
            Err(e) => {
                warn!(%recipient_id, kind = %kind, error = %e, "notification insert failed");
            }
        }
    });
}

/// The newest notifications for a recipient, most recent first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list(pool: &PgPool, recipient_id: Uuid) -> Result<Vec<Notification>, NotifyError> {
    type Row = (Uuid, String, serde_json::Value, Option<i64>, OffsetDateTime, Option<OffsetDateTime>);
    let rows = sqlx::query_as::<_, Row>(
        "SELECT id, kind, body, credit_amount, created_at, read_at
         FROM notifications
         WHERE recipient_id = $1
         ORDER BY created_at DESC
         LIMIT $2",
    )
    .bind(recipient_id)
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, kind, body, credit_amount, created_at, read_at)| Notification {
            id,
            kind,
            body,
            credit_amount,
            created_at: to_ms(created_at),
            read: read_at.is_some(),
        })
        .collect())
}

/// Mark one of the recipient's notifications read. `false` when the id does
/// not exist or belongs to someone else; marking twice is harmless.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn mark_read(pool: &PgPool, recipient_id: Uuid, id: Uuid) -> Result<bool, NotifyError> {
    let result = sqlx::query(
        "UPDATE notifications SET read_at = COALESCE(read_at, now())
         WHERE id = $1 AND recipient_id = $2",
    )
    .bind(id)
    .bind(recipient_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

fn to_ms(ts: OffsetDateTime) -> i64 {
    i64::try_from(ts.unix_timestamp_nanos() / 1_000_000).unwrap_or(0)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "notify_test.rs"]
mod tests;
