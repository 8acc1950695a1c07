//! Credit balances — single-statement, guard-checked mutations.
//!
//! DESIGN
//! ======
//! Every spend is one SQL statement: the balance check and the decrement
//! travel together (`WHERE credits >= $2 .. RETURNING`), so two concurrent
//! spenders can never both pass a read-then-write check. The schema CHECK
//! (`credits >= 0`) backstops the guard. Trial deductions differ in one way:
//! a guest shortfall clamps to zero instead of failing, because running the
//! trial balance out is the expected end of a trial, not an error.

use sqlx::PgPool;
use uuid::Uuid;

use crate::event::ErrorCode;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CreditError {
    #[error("insufficient credits")]
    Insufficient,
    #[error("profile not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ErrorCode for CreditError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Insufficient => "E_INSUFFICIENT_CREDITS",
            Self::NotFound(_) => "E_PROFILE_NOT_FOUND",
            Self::Db(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}

// =============================================================================
// PROFILE BALANCE
// =============================================================================

/// Spend from a profile balance, returning what remains. Zero rows updated
/// means the guard refused: the balance was short (or the profile is gone)
/// and nothing changed.
///
/// # Errors
///
/// `Insufficient` when the balance cannot cover `amount`.
pub async fn deduct(pool: &PgPool, profile_id: Uuid, amount: i64) -> Result<i64, CreditError> {
    let balance: Option<i64> = sqlx::query_scalar(
        "UPDATE profiles SET credits = credits - $2
         WHERE id = $1 AND credits >= $2
         RETURNING credits",
    )
    .bind(profile_id)
    .bind(amount)
    .fetch_optional(pool)
    .await?;
    balance.ok_or(CreditError::Insufficient)
}

/// Add to a profile balance, returning the new total.
///
/// # Errors
///
/// `NotFound` when no such profile exists.
pub async fn grant(pool: &PgPool, profile_id: Uuid, amount: i64) -> Result<i64, CreditError> {
    let balance: Option<i64> = sqlx::query_scalar(
        "UPDATE profiles SET credits = credits + $2 WHERE id = $1 RETURNING credits",
    )
    .bind(profile_id)
    .bind(amount)
    .fetch_optional(pool)
    .await?;
    balance.ok_or(CreditError::NotFound(profile_id))
}

/// Current balance. Non-negative by schema CHECK.
///
/// # Errors
///
/// `NotFound` when no such profile exists.
pub async fn balance(pool: &PgPool, profile_id: Uuid) -> Result<i64, CreditError> {
    let balance: Option<i64> = sqlx::query_scalar("SELECT credits FROM profiles WHERE id = $1")
        .bind(profile_id)
        .fetch_optional(pool)
        .await?;
    balance.ok_or(CreditError::NotFound(profile_id))
}

// =============================================================================
// TRIAL BALANCE
// =============================================================================

/// Charge a guest's trial balance, clamping at zero. The trial ticker calls
/// this once per charged minute; a shortfall just empties the balance.
///
/// # Errors
///
/// `NotFound` when the guest no longer has a live session row.
pub async fn deduct_trial(pool: &PgPool, guest_id: Uuid, amount: i64) -> Result<i64, CreditError> {
    let balance: Option<i64> = sqlx::query_scalar(
        "UPDATE sessions SET trial_credits = GREATEST(trial_credits - $2, 0)
         WHERE guest_id = $1
         RETURNING trial_credits",
    )
    .bind(guest_id)
    .bind(amount)
    .fetch_optional(pool)
    .await?;
    balance.ok_or(CreditError::NotFound(guest_id))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "credits_test.rs"]
mod tests;
