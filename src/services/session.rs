//! Session lifecycle, login-grant exchange, and WS tickets.
//!
//! ARCHITECTURE
//! ============
//! HTTP auth uses long-lived session tokens in an HttpOnly cookie; WebSocket
//! upgrades use one-time short-lived tickets so the cookie never rides a
//! query string. A session belongs to exactly one subject, a registered
//! user or an anonymous guest on a trial, never both.
//!
//! Storage sits behind the `SessionStore` trait: Postgres in production,
//! in-memory fixtures in tests. Every staleness check takes the clock as a
//! parameter; public wrappers default it to `now_utc()`.
//!
//! TRADE-OFFS
//! ==========
//! Stale rows are deleted on read, not only by the background sweeper, so a
//! dead token stops resolving on first contact. Grant and ticket consumption
//! is destructive (`DELETE .. RETURNING`) to guarantee single use; this
//! favors replay safety over retry convenience.

use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use rand::Rng;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::event::ErrorCode;

const DEFAULT_SESSION_IDLE_SECS: i64 = 30 * 60;
const DEFAULT_GUEST_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Clone, Copy)]
struct SessionConfig {
    idle_secs: i64,
    guest_ttl_secs: i64,
}

impl SessionConfig {
    fn from_env() -> Self {
        Self {
            idle_secs: env_parse("SESSION_IDLE_SECS", DEFAULT_SESSION_IDLE_SECS),
            guest_ttl_secs: env_parse("SESSION_GUEST_TTL_SECS", DEFAULT_GUEST_TTL_SECS),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// TOKENS
// =============================================================================

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Generate a short-lived 16-byte hex WS ticket.
#[must_use]
pub(crate) fn generate_ws_ticket() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Db(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

// =============================================================================
// SUBJECT AND SESSION
// =============================================================================

/// Who owns a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    User(Uuid),
    Guest(Uuid),
}

impl Subject {
    #[must_use]
    pub fn id(self) -> Uuid {
        match self {
            Self::User(id) | Self::Guest(id) => id,
        }
    }

    #[must_use]
    pub fn is_guest(self) -> bool {
        matches!(self, Self::Guest(_))
    }

    #[must_use]
    pub fn as_user(self) -> Option<Uuid> {
        match self {
            Self::User(id) => Some(id),
            Self::Guest(_) => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Guest(id) => write!(f, "guest:{id}"),
        }
    }
}

/// One live session as stored. Guests carry their remaining trial credit
/// balance on the row; for users it stays 0 and the profile balance rules.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub subject: Subject,
    pub created_at: OffsetDateTime,
    pub last_activity: OffsetDateTime,
    /// Hard deadline for guests; users have none.
    pub expires_at: Option<OffsetDateTime>,
    pub trial_credits: i64,
}

// =============================================================================
// SESSION STORE
// =============================================================================

/// Storage seam for session rows. Enables in-memory fixtures in tests.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), SessionError>;
    async fn fetch(&self, token: &str) -> Result<Option<Session>, SessionError>;
    async fn touch(&self, token: &str, now: OffsetDateTime) -> Result<(), SessionError>;
    async fn delete(&self, token: &str) -> Result<(), SessionError>;
}

/// Postgres-backed store over the `sessions` table.
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &Session) -> Result<(), SessionError> {
        let (user_id, guest_id) = match session.subject {
            Subject::User(id) => (Some(id), None),
            Subject::Guest(id) => (None, Some(id)),
        };
        sqlx::query(
            "INSERT INTO sessions (token, user_id, guest_id, trial_credits, created_at, last_activity, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&session.token)
        .bind(user_id)
        .bind(guest_id)
        .bind(session.trial_credits)
        .bind(session.created_at)
        .bind(session.last_activity)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, token: &str) -> Result<Option<Session>, SessionError> {
        let row = sqlx::query(
            "SELECT token, user_id, guest_id, trial_credits, created_at, last_activity, expires_at
             FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().and_then(row_to_session))
    }

    async fn touch(&self, token: &str, now: OffsetDateTime) -> Result<(), SessionError> {
        sqlx::query("UPDATE sessions SET last_activity = $2 WHERE token = $1")
            .bind(token)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_session(row: &PgRow) -> Option<Session> {
    let user_id: Option<Uuid> = row.get("user_id");
    let guest_id: Option<Uuid> = row.get("guest_id");
    // The schema CHECK makes exactly one of the two non-null.
    let subject = match (user_id, guest_id) {
        (Some(id), None) => Subject::User(id),
        (None, Some(id)) => Subject::Guest(id),
        _ => return None,
    };
    Some(Session {
        token: row.get("token"),
        subject,
        created_at: row.get("created_at"),
        last_activity: row.get("last_activity"),
        expires_at: row.get("expires_at"),
        trial_credits: row.get("trial_credits"),
    })
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    idle_timeout: time::Duration,
    guest_ttl: time::Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        let config = SessionConfig::from_env();
        Self {
            store,
            idle_timeout: time::Duration::seconds(config.idle_secs),
            guest_ttl: time::Duration::seconds(config.guest_ttl_secs),
        }
    }

    /// Idle window after which a session stops resolving.
    #[must_use]
    pub fn idle_timeout(&self) -> time::Duration {
        self.idle_timeout
    }

    /// Start a session for a registered user, returning the token.
    pub async fn start_user_session(&self, user_id: Uuid) -> Result<String, SessionError> {
        self.start_user_session_at(user_id, OffsetDateTime::now_utc()).await
    }

    async fn start_user_session_at(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<String, SessionError> {
        let session = Session {
            token: generate_token(),
            subject: Subject::User(user_id),
            created_at: now,
            last_activity: now,
            expires_at: None,
            trial_credits: 0,
        };
        self.store.insert(&session).await?;
        Ok(session.token)
    }

    /// Start an anonymous guest session with a hard deadline and a trial
    /// credit budget, returning the token and the minted guest id.
    pub async fn start_guest_session(&self, trial_credits: i64) -> Result<(String, Uuid), SessionError> {
        self.start_guest_session_at(trial_credits, OffsetDateTime::now_utc()).await
    }

    async fn start_guest_session_at(
        &self,
        trial_credits: i64,
        now: OffsetDateTime,
    ) -> Result<(String, Uuid), SessionError> {
        let guest_id = Uuid::new_v4();
        let session = Session {
            token: generate_token(),
            subject: Subject::Guest(guest_id),
            created_at: now,
            last_activity: now,
            expires_at: Some(now + self.guest_ttl),
            trial_credits,
        };
        self.store.insert(&session).await?;
        Ok((session.token, guest_id))
    }

    /// Resolve a token. Stale sessions, idle past the timeout or guests past
    /// their hard deadline, are deleted on read and resolve to `None`.
    pub async fn current_session(&self, token: &str) -> Result<Option<Session>, SessionError> {
        self.current_session_at(token, OffsetDateTime::now_utc()).await
    }

    async fn current_session_at(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Session>, SessionError> {
        let Some(session) = self.store.fetch(token).await? else {
            return Ok(None);
        };
        if self.is_stale(&session, now) {
            self.store.delete(token).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    fn is_stale(&self, session: &Session, now: OffsetDateTime) -> bool {
        if now - session.last_activity > self.idle_timeout {
            return true;
        }
        if let Some(deadline) = session.expires_at {
            if now >= deadline {
                return true;
            }
        }
        false
    }

    /// Refresh `last_activity`. Missing tokens are a no-op.
    pub async fn update_activity(&self, token: &str) -> Result<(), SessionError> {
        self.update_activity_at(token, OffsetDateTime::now_utc()).await
    }

    async fn update_activity_at(&self, token: &str, now: OffsetDateTime) -> Result<(), SessionError> {
        self.store.touch(token, now).await
    }

    /// End a session. Idempotent: a second call is a no-op.
    pub async fn end_session(&self, token: &str) -> Result<(), SessionError> {
        self.store.delete(token).await
    }

    /// Login-exchange hygiene: when the presented cookie still resolves to a
    /// different subject, delete that session before minting the new one so
    /// two accounts on a shared device never see each other's state. Returns
    /// whether anything was wiped.
    pub async fn force_cleanup(
        &self,
        presented_token: &str,
        new_user_id: Uuid,
    ) -> Result<bool, SessionError> {
        self.force_cleanup_at(presented_token, new_user_id, OffsetDateTime::now_utc()).await
    }

    async fn force_cleanup_at(
        &self,
        presented_token: &str,
        new_user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<bool, SessionError> {
        let Some(session) = self.current_session_at(presented_token, now).await? else {
            return Ok(false);
        };
        if session.subject == Subject::User(new_user_id) {
            return Ok(false);
        }
        self.store.delete(presented_token).await?;
        Ok(true)
    }
}

// =============================================================================
// LOGIN GRANTS AND WS TICKETS
// =============================================================================

/// Mint a one-time login grant for a user. The auth collaborator (or the
/// admin surface) hands this to the browser for the exchange endpoint.
pub async fn create_login_grant(pool: &PgPool, user_id: Uuid) -> Result<String, SessionError> {
    let grant = generate_token();
    sqlx::query("INSERT INTO login_grants (grant_token, user_id) VALUES ($1, $2)")
        .bind(&grant)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(grant)
}

/// Consume a login grant atomically, returning the user it was minted for.
/// `None` when unknown, expired, or already used.
pub async fn consume_login_grant(pool: &PgPool, grant_token: &str) -> Result<Option<Uuid>, SessionError> {
    let row = sqlx::query(
        "DELETE FROM login_grants WHERE grant_token = $1 AND expires_at > now() RETURNING user_id",
    )
    .bind(grant_token)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.get("user_id")))
}

/// Create a short-lived WS ticket bound to a session.
pub async fn create_ws_ticket(pool: &PgPool, session_token: &str) -> Result<String, SessionError> {
    let ticket = generate_ws_ticket();
    sqlx::query("INSERT INTO ws_tickets (ticket, session_token) VALUES ($1, $2)")
        .bind(&ticket)
        .bind(session_token)
        .execute(pool)
        .await?;
    Ok(ticket)
}

/// Consume a WS ticket atomically, returning the bound session token.
pub async fn consume_ws_ticket(pool: &PgPool, ticket: &str) -> Result<Option<String>, SessionError> {
    let row = sqlx::query(
        "DELETE FROM ws_tickets WHERE ticket = $1 AND expires_at > now() RETURNING session_token",
    )
    .bind(ticket)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.get("session_token")))
}

// =============================================================================
// IN-MEMORY STORE (TESTS)
// =============================================================================

#[cfg(test)]
pub struct MemorySessionStore {
    rows: std::sync::Mutex<std::collections::HashMap<String, Session>>,
}

#[cfg(test)]
impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self { rows: std::sync::Mutex::new(std::collections::HashMap::new()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, std::collections::HashMap<String, Session>> {
        self.rows.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<(), SessionError> {
        self.lock().insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn fetch(&self, token: &str) -> Result<Option<Session>, SessionError> {
        Ok(self.lock().get(token).cloned())
    }

    async fn touch(&self, token: &str, now: OffsetDateTime) -> Result<(), SessionError> {
        if let Some(session) = self.lock().get_mut(token) {
            session.last_activity = now;
        }
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), SessionError> {
        self.lock().remove(token);
        Ok(())
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
