//! Background sweep of expired rows.
//!
//! Sessions already die on read (`current_session` deletes stale rows), so
//! the sweeper is about rows nobody presents anymore: abandoned sessions,
//! unconsumed grants and tickets, expired guest access grants. Deleting a
//! guest session here also drops its in-memory trial clock.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::services::session::env_parse;
use crate::state::AppState;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepCounts {
    pub sessions: u64,
    pub login_grants: u64,
    pub ws_tickets: u64,
    pub access_grants: u64,
}

/// Spawn the periodic sweep. Returns a handle for shutdown.
pub fn spawn_sweeper(state: AppState) -> JoinHandle<()> {
    let interval_secs = env_parse("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS);
    info!(interval_secs, "sweeper started");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match sweep(&state).await {
                Ok(counts) => {
                    debug!(
                        sessions = counts.sessions,
                        login_grants = counts.login_grants,
                        ws_tickets = counts.ws_tickets,
                        access_grants = counts.access_grants,
                        "sweep complete"
                    );
                }
                Err(e) => error!(error = %e, "sweep failed"),
            }
        }
    })
}

/// One full sweep pass. Split out so tests can run it directly.
///
/// # Errors
///
/// Returns the first database error; the task logs it and retries next tick.
pub async fn sweep(state: &AppState) -> Result<SweepCounts, sqlx::Error> {
    let idle_cutoff = OffsetDateTime::now_utc() - state.sessions.idle_timeout();

    // Stale sessions: idle past the window or past their hard deadline.
    let dead: Vec<Option<Uuid>> = sqlx::query_scalar(
        "DELETE FROM sessions
         WHERE last_activity < $1
            OR (expires_at IS NOT NULL AND expires_at <= now())
         RETURNING guest_id",
    )
    .bind(idle_cutoff)
    .fetch_all(&state.pool)
    .await?;
    for guest_id in dead.iter().flatten() {
        state.trials.remove(*guest_id);
    }

    let login_grants = sqlx::query("DELETE FROM login_grants WHERE expires_at <= now()")
        .execute(&state.pool)
        .await?
        .rows_affected();

    let ws_tickets = sqlx::query("DELETE FROM ws_tickets WHERE expires_at <= now()")
        .execute(&state.pool)
        .await?
        .rows_affected();

    let access_grants = sqlx::query(
        "DELETE FROM access_grants WHERE expires_at IS NOT NULL AND expires_at <= now()",
    )
    .execute(&state.pool)
    .await?
    .rows_affected();

    Ok(SweepCounts {
        sessions: dead.len() as u64,
        login_grants,
        ws_tickets,
        access_grants,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "sweeper_test.rs"]
mod tests;
