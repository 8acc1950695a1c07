//! Page access gate — creator access codes and grant checks.
//!
//! DESIGN
//! ======
//! A creator page is open unless its creator has set an access code. Codes
//! are six characters from an unambiguous alphabet, stored only as a SHA-256
//! hash. Verification is two guarded single-statement updates: the first
//! matches hash + unlocked row and resets the attempt counter, the second
//! (on miss) increments it. Five failures lock the row, for the correct
//! code too, until the creator rotates it. A successful verification writes
//! a durable `access_grants` row; guest grants expire with the guest TTL so
//! the sweeper can reap them.

use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::event::ErrorCode;
use crate::services::session::{Subject, bytes_to_hex};

const CODE_LEN: usize = 6;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const MAX_FAILED_ATTEMPTS: i32 = 5;

/// Guest grants die with the guest session window.
const GUEST_GRANT_TTL: time::Duration = time::Duration::hours(24);

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("only the creator can manage the access code")]
    Forbidden,
    #[error("invalid code format")]
    InvalidCode,
    #[error("incorrect access code")]
    VerificationFailed,
    #[error("too many failed attempts")]
    LockedOut,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ErrorCode for AccessError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Forbidden => "E_FORBIDDEN",
            Self::InvalidCode => "E_INVALID_CODE",
            Self::VerificationFailed => "E_ACCESS_DENIED",
            Self::LockedOut => "E_LOCKED_OUT",
            Self::Db(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}

// =============================================================================
// CODES
// =============================================================================

#[must_use]
pub fn normalize_code(code: &str) -> Option<String> {
    let normalized = code.trim().to_ascii_uppercase();
    if normalized.len() != CODE_LEN
        || !normalized
            .chars()
            .all(|c| CODE_ALPHABET.contains(&(c as u8)))
    {
        return None;
    }
    Some(normalized)
}

#[must_use]
pub fn generate_page_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

#[must_use]
pub fn hash_page_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    bytes_to_hex(hasher.finalize().as_slice())
}

// =============================================================================
// GATE CHECK
// =============================================================================

/// Whether the page has an access code set at all.
///
/// # Errors
///
/// Returns a database error if the probe fails.
pub async fn is_gated(pool: &PgPool, creator_id: Uuid) -> Result<bool, AccessError> {
    let row: Option<i32> = sqlx::query_scalar("SELECT 1 FROM access_codes WHERE creator_id = $1")
        .bind(creator_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// The authorization boundary: may this subject view this page? True for
/// the creator, for any page without a code, and for holders of a live
/// grant.
///
/// # Errors
///
/// Returns a database error if a probe fails.
pub async fn has_access(pool: &PgPool, subject: Subject, creator_id: Uuid) -> Result<bool, AccessError> {
    if subject == Subject::User(creator_id) {
        return Ok(true);
    }
    if !is_gated(pool, creator_id).await? {
        return Ok(true);
    }
    let row: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM access_grants
         WHERE subject_id = $1 AND creator_id = $2
           AND (expires_at IS NULL OR expires_at > now())",
    )
    .bind(subject.id())
    .bind(creator_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

// =============================================================================
// SET / VERIFY
// =============================================================================

/// Set or clear the page code. Creator-only. `None` (or a cleared code)
/// opens the page. Rotating or clearing revokes every code-sourced grant,
/// so a new code re-gates past visitors.
///
/// # Errors
///
/// `Forbidden` for non-creators, `InvalidCode` for malformed codes.
pub async fn set_access_code(
    pool: &PgPool,
    creator_id: Uuid,
    caller: Subject,
    code: Option<&str>,
) -> Result<(), AccessError> {
    if caller != Subject::User(creator_id) {
        return Err(AccessError::Forbidden);
    }

    match code.map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => {
            let normalized = normalize_code(raw).ok_or(AccessError::InvalidCode)?;
            let code_hash = hash_page_code(&normalized);
            sqlx::query(
                "INSERT INTO access_codes (creator_id, code_hash, attempts, updated_at)
                 VALUES ($1, $2, 0, now())
                 ON CONFLICT (creator_id)
                 DO UPDATE SET code_hash = EXCLUDED.code_hash, attempts = 0, updated_at = now()",
            )
            .bind(creator_id)
            .bind(&code_hash)
            .execute(pool)
            .await?;
        }
        None => {
            sqlx::query("DELETE FROM access_codes WHERE creator_id = $1")
                .bind(creator_id)
                .execute(pool)
                .await?;
        }
    }

    sqlx::query("DELETE FROM access_grants WHERE creator_id = $1 AND source = 'code'")
        .bind(creator_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Attempt a page code. Success resets the attempt counter and writes a
/// grant (source 'code'); a wrong code increments it. At five failures the
/// row locks, even for the correct code, until the creator rotates it.
/// Verifying an open page trivially succeeds.
///
/// # Errors
///
/// `InvalidCode`, `VerificationFailed`, or `LockedOut` per the rules above.
pub async fn verify_access_code(
    pool: &PgPool,
    subject: Subject,
    creator_id: Uuid,
    code: &str,
) -> Result<(), AccessError> {
    if subject == Subject::User(creator_id) {
        return Ok(());
    }
    let normalized = normalize_code(code).ok_or(AccessError::InvalidCode)?;
    let code_hash = hash_page_code(&normalized);

    let hit: Option<Uuid> = sqlx::query_scalar(
        "UPDATE access_codes SET attempts = 0
         WHERE creator_id = $1 AND code_hash = $2 AND attempts < $3
         RETURNING creator_id",
    )
    .bind(creator_id)
    .bind(&code_hash)
    .bind(MAX_FAILED_ATTEMPTS)
    .fetch_optional(pool)
    .await?;

    if hit.is_none() {
        let attempts: Option<i32> = sqlx::query_scalar(
            "UPDATE access_codes SET attempts = attempts + 1
             WHERE creator_id = $1 AND attempts < $2
             RETURNING attempts",
        )
        .bind(creator_id)
        .bind(MAX_FAILED_ATTEMPTS)
        .fetch_optional(pool)
        .await?;

        return match attempts {
            Some(n) if n >= MAX_FAILED_ATTEMPTS => Err(AccessError::LockedOut),
            Some(_) => Err(AccessError::VerificationFailed),
            // No incrementable row: the page is open, or the row is
            // already locked.
            None => {
                if is_gated(pool, creator_id).await? {
                    Err(AccessError::LockedOut)
                } else {
                    Ok(())
                }
            }
        };
    }

    let expires_at = match subject {
        Subject::Guest(_) => Some(OffsetDateTime::now_utc() + GUEST_GRANT_TTL),
        Subject::User(_) => None,
    };
    sqlx::query(
        "INSERT INTO access_grants (subject_id, creator_id, source, expires_at)
         VALUES ($1, $2, 'code', $3)
         ON CONFLICT (subject_id, creator_id)
         DO UPDATE SET source = 'code', created_at = now(), expires_at = EXCLUDED.expires_at",
    )
    .bind(subject.id())
    .bind(creator_id)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "access_test.rs"]
mod tests;
