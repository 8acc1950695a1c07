//! Guest trial clocks and per-minute credit charging.
//!
//! DESIGN
//! ======
//! A pure countdown core (`TrialTimer`) wrapped in a process-wide registry
//! (`TrialRegistry`, shared `Arc<Mutex<HashMap>>`). The timer is
//! deterministic and side-effect free: `tick(now)` consumes whole elapsed
//! seconds and returns the commands the caller must apply, a credit
//! deduction at each minute boundary and a single terminal expiry. The 1s
//! background task owns all effects: atomic balance updates and WebSocket
//! pushes happen after the tick, never inside it.
//!
//! TRADE-OFFS
//! ==========
//! Clocks are in-memory only. A process restart hands every live guest a
//! fresh budget, which costs nothing worse than extra trial minutes; guest
//! sessions themselves still expire server-side.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::event::{Data, ErrorCode, Event};
use crate::services::credits;
use crate::services::session::Subject;
use crate::state::AppState;

const DEFAULT_TRIAL_INITIAL_SECS: i64 = 300;
const DEFAULT_TRIAL_CREDITS_PER_MINUTE: i64 = 4;
const DEFAULT_TRIAL_GUEST_CREDITS: i64 = 20;

/// One charge per this many elapsed trial seconds.
const CHARGE_INTERVAL_SECS: i64 = 60;

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Clone, Copy)]
struct TrialConfig {
    initial_secs: i64,
    credits_per_minute: i64,
    guest_credits: i64,
}

impl TrialConfig {
    fn from_env() -> Self {
        Self {
            initial_secs: env_parse("TRIAL_INITIAL_SECS", DEFAULT_TRIAL_INITIAL_SECS),
            credits_per_minute: env_parse("TRIAL_CREDITS_PER_MINUTE", DEFAULT_TRIAL_CREDITS_PER_MINUTE),
            guest_credits: env_parse("TRIAL_GUEST_CREDITS", DEFAULT_TRIAL_GUEST_CREDITS),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TrialError {
    #[error("trial expired, login required")]
    Expired,
}

impl ErrorCode for TrialError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Expired => "E_TRIAL_EXPIRED",
        }
    }
}

// =============================================================================
// TIMER
// =============================================================================

/// Effect the caller must apply after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialCommand {
    DeductCredits { amount: i64 },
    Expire,
}

/// Countdown for one guest. Pure: mutating it never touches storage or
/// sockets.
#[derive(Debug)]
pub struct TrialTimer {
    remaining_secs: i64,
    minutes_charged: i64,
    expired: bool,
    last_tick: Instant,
    initial_secs: i64,
    credits_per_minute: i64,
}

impl TrialTimer {
    fn new(config: &TrialConfig, now: Instant) -> Self {
        Self {
            remaining_secs: config.initial_secs,
            minutes_charged: 0,
            expired: false,
            last_tick: now,
            initial_secs: config.initial_secs,
            credits_per_minute: config.credits_per_minute,
        }
    }

    /// Consume whole elapsed seconds since the last tick and return the
    /// commands due. Sub-second remainders carry over, so an uneven caller
    /// cadence still decrements exactly once per elapsed second. `Expire`
    /// is emitted exactly once; after it, ticks are no-ops.
    pub fn tick(&mut self, now: Instant) -> Vec<TrialCommand> {
        if self.expired {
            return Vec::new();
        }
        let elapsed_secs = now.duration_since(self.last_tick).as_secs();
        if elapsed_secs == 0 {
            return Vec::new();
        }
        self.last_tick += Duration::from_secs(elapsed_secs);
        let elapsed = i64::try_from(elapsed_secs).unwrap_or(i64::MAX);
        self.remaining_secs = self.remaining_secs.saturating_sub(elapsed).max(0);

        let mut commands = Vec::new();
        let minutes_due = (self.initial_secs - self.remaining_secs) / CHARGE_INTERVAL_SECS;
        while self.minutes_charged < minutes_due {
            self.minutes_charged += 1;
            commands.push(TrialCommand::DeductCredits { amount: self.credits_per_minute });
        }
        if self.remaining_secs == 0 {
            self.expired = true;
            commands.push(TrialCommand::Expire);
        }
        commands
    }

    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        self.remaining_secs
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired
    }
}

/// Read-only view for status endpoints.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrialSnapshot {
    pub remaining_secs: i64,
    pub expired: bool,
}

/// One guest's outcome from a registry sweep.
#[derive(Debug)]
pub struct TrialUpdate {
    pub guest_id: Uuid,
    pub remaining_secs: i64,
    pub commands: Vec<TrialCommand>,
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Clone)]
pub struct TrialRegistry {
    inner: Arc<Mutex<HashMap<Uuid, TrialTimer>>>,
    config: TrialConfig,
}

impl TrialRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            config: TrialConfig::from_env(),
        }
    }

    /// Trial credit balance a fresh guest session row starts with.
    #[must_use]
    pub fn guest_credits(&self) -> i64 {
        self.config.guest_credits
    }

    /// Start a fresh clock for a new guest session.
    pub fn register(&self, guest_id: Uuid) {
        self.register_at(guest_id, Instant::now());
    }

    fn register_at(&self, guest_id: Uuid, now: Instant) {
        self.lock().insert(guest_id, TrialTimer::new(&self.config, now));
    }

    /// Restart an expired (or running) clock. Admin surface only.
    pub fn reset(&self, guest_id: Uuid) {
        self.register(guest_id);
    }

    /// Drop a guest's clock on logout or session expiry.
    pub fn remove(&self, guest_id: Uuid) {
        self.lock().remove(&guest_id);
    }

    /// Gate for guest protected actions: `false` once the trial has expired,
    /// until an explicit reset.
    #[must_use]
    pub fn check_action(&self, guest_id: Uuid) -> bool {
        self.check_action_at(guest_id, Instant::now())
    }

    fn check_action_at(&self, guest_id: Uuid, now: Instant) -> bool {
        let mut inner = self.lock();
        match inner.get(&guest_id) {
            Some(timer) => !timer.expired,
            None => {
                // A restart loses every clock; a still-live guest session
                // gets a fresh one on first contact.
                inner.insert(guest_id, TrialTimer::new(&self.config, now));
                true
            }
        }
    }

    #[must_use]
    pub fn snapshot(&self, guest_id: Uuid) -> Option<TrialSnapshot> {
        self.lock().get(&guest_id).map(|timer| TrialSnapshot {
            remaining_secs: timer.remaining_secs,
            expired: timer.expired,
        })
    }

    /// Advance every clock, returning only the guests whose state moved.
    #[must_use]
    pub fn tick_all(&self) -> Vec<TrialUpdate> {
        self.tick_all_at(Instant::now())
    }

    fn tick_all_at(&self, now: Instant) -> Vec<TrialUpdate> {
        let mut inner = self.lock();
        let mut updates = Vec::new();
        for (guest_id, timer) in inner.iter_mut() {
            let before = timer.remaining_secs;
            let commands = timer.tick(now);
            if timer.remaining_secs != before || !commands.is_empty() {
                updates.push(TrialUpdate {
                    guest_id: *guest_id,
                    remaining_secs: timer.remaining_secs,
                    commands,
                });
            }
        }
        updates
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, TrialTimer>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for TrialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TICKER TASK
// =============================================================================

/// Spawn the 1s sweep: advance clocks, apply deductions, push updates.
pub fn spawn_trial_ticker(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(period_secs = TICK_PERIOD.as_secs(), "trial ticker started");
        let mut interval = tokio::time::interval(TICK_PERIOD);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            for update in state.trials.tick_all() {
                apply_update(&state, update).await;
            }
        }
    })
}

async fn apply_update(state: &AppState, update: TrialUpdate) {
    let mut data = Data::new();
    data.insert("remaining_secs".into(), update.remaining_secs.into());

    let mut expired = false;
    for command in update.commands {
        match command {
            TrialCommand::DeductCredits { amount } => {
                match credits::deduct_trial(&state.pool, update.guest_id, amount).await {
                    Ok(balance) => {
                        data.insert("trial_credits".into(), balance.into());
                    }
                    Err(e) => {
                        error!(guest_id = %update.guest_id, error = %e, "trial charge failed");
                    }
                }
            }
            TrialCommand::Expire => expired = true,
        }
    }

    state
        .push_to_subject(Subject::Guest(update.guest_id), &Event::push("trial:tick", data))
        .await;
    if expired {
        let mut data = Data::new();
        data.insert("login_required".into(), true.into());
        state
            .push_to_subject(Subject::Guest(update.guest_id), &Event::push("trial:expired", data))
            .await;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "trial_test.rs"]
mod tests;
