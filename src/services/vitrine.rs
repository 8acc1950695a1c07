//! Vitrine showcase — creator media items with credit-gated unlocks.
//!
//! DESIGN
//! ======
//! Listing redacts `media_url` on locked items the viewer has not paid for;
//! the creator and past unlockers see everything. An unlock is one database
//! transaction: guarded viewer deduction, unlock row, creator grant. The
//! unique unlock key aborts a concurrent double-purchase, rolling the charge
//! back with it. The earning notification fires after commit and never
//! blocks the purchase.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::event::ErrorCode;
use crate::services::notify;
use crate::services::session::Subject;
use crate::state::AppState;
use crate::validate::{sanitize_url, validate_credits};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VitrineError {
    #[error("vitrine item not found: {0}")]
    ItemNotFound(Uuid),
    #[error("only the creator can manage vitrine items")]
    Forbidden,
    #[error("trial expired, login required")]
    TrialExpired,
    #[error("insufficient credits")]
    InsufficientCredits,
    #[error("{0}")]
    Invalid(&'static str),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ErrorCode for VitrineError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ItemNotFound(_) => "E_ITEM_NOT_FOUND",
            Self::Forbidden => "E_FORBIDDEN",
            Self::TrialExpired => "E_TRIAL_EXPIRED",
            Self::InsufficientCredits => "E_INSUFFICIENT_CREDITS",
            Self::Invalid(_) => "E_INVALID_INPUT",
            Self::Db(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}

/// One showcase item as a viewer sees it. `media_url` is `None` while the
/// item stays locked for this viewer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VitrineItem {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub kind: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub locked: bool,
    pub price_credits: i64,
    pub position: i32,
}

/// Creator input for a new item. Price arrives as raw JSON so the credit
/// validator can clamp whatever the client sent.
#[derive(Debug, serde::Deserialize)]
pub struct NewItem {
    pub kind: Option<String>,
    pub title: String,
    pub media_url: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub price_credits: serde_json::Value,
    pub position: Option<i32>,
}

/// What an unlock cost and what the buyer has left.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct UnlockReceipt {
    pub item_id: Uuid,
    pub paid_credits: i64,
    pub remaining_credits: i64,
}

// =============================================================================
// LISTING
// =============================================================================

/// Every item on a creator's page, redacted for this viewer. The creator
/// sees all media; others see media only on open or purchased items.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_items(
    pool: &PgPool,
    creator_id: Uuid,
    subject: Subject,
) -> Result<Vec<VitrineItem>, VitrineError> {
    type Row = (Uuid, Uuid, String, String, String, bool, i64, i32, bool);
    let rows = sqlx::query_as::<_, Row>(
        "SELECT v.id, v.creator_id, v.kind, v.title, v.media_url, v.locked,
                v.price_credits, v.position,
                (u.subject_id IS NOT NULL) AS unlocked
         FROM vitrine_items v
         LEFT JOIN unlocks u ON u.item_id = v.id AND u.subject_id = $2
         WHERE v.creator_id = $1
         ORDER BY v.position ASC, v.created_at ASC",
    )
    .bind(creator_id)
    .bind(subject.id())
    .fetch_all(pool)
    .await?;

    let is_creator = subject == Subject::User(creator_id);
    let items = rows
        .into_iter()
        .map(|(id, creator_id, kind, title, media_url, locked, price_credits, position, unlocked)| {
            let visible = is_creator || !locked || unlocked;
            VitrineItem {
                id,
                creator_id,
                kind,
                title,
                media_url: visible.then_some(media_url),
                locked,
                price_credits,
                position,
            }
        })
        .collect();
    Ok(items)
}

// =============================================================================
// UNLOCK
// =============================================================================

/// Buy access to a locked item. Already-owned, open, and creator-owned
/// items cost nothing. The charge, the unlock row, and the creator's
/// earning commit or roll back together.
///
/// # Errors
///
/// `TrialExpired` for guests whose trial ran out, `InsufficientCredits`
/// when the guarded deduction refuses, `ItemNotFound` for unknown items.
pub async fn unlock_item(
    state: &AppState,
    subject: Subject,
    item_id: Uuid,
) -> Result<UnlockReceipt, VitrineError> {
    if let Subject::Guest(guest_id) = subject {
        if !state.trials.check_action(guest_id) {
            return Err(VitrineError::TrialExpired);
        }
    }

    let mut tx = state.pool.begin().await?;

    let item = sqlx::query_as::<_, (Uuid, String, bool, i64)>(
        "SELECT creator_id, title, locked, price_credits FROM vitrine_items WHERE id = $1",
    )
    .bind(item_id)
    .fetch_optional(tx.as_mut())
    .await?;
    let Some((creator_id, title, locked, price)) = item else {
        return Err(VitrineError::ItemNotFound(item_id));
    };

    // Nothing to buy: own item, open item, or a repeat purchase.
    let owned = sqlx::query_scalar::<_, i64>(
        "SELECT paid_credits FROM unlocks WHERE subject_id = $1 AND item_id = $2",
    )
    .bind(subject.id())
    .bind(item_id)
    .fetch_optional(tx.as_mut())
    .await?;
    if subject == Subject::User(creator_id) || !locked || owned.is_some() {
        let remaining = viewer_balance(tx.as_mut(), subject).await?;
        return Ok(UnlockReceipt { item_id, paid_credits: 0, remaining_credits: remaining });
    }

    // Guarded deduction: the sufficiency check and the charge are one
    // statement, so a refusal leaves the balance untouched.
    let remaining = match subject {
        Subject::User(user_id) => {
            sqlx::query_scalar::<_, i64>(
                "UPDATE profiles SET credits = credits - $2
                 WHERE id = $1 AND credits >= $2
                 RETURNING credits",
            )
            .bind(user_id)
            .bind(price)
            .fetch_optional(tx.as_mut())
            .await?
        }
        Subject::Guest(guest_id) => {
            sqlx::query_scalar::<_, i64>(
                "UPDATE sessions SET trial_credits = trial_credits - $2
                 WHERE guest_id = $1 AND trial_credits >= $2
                 RETURNING trial_credits",
            )
            .bind(guest_id)
            .bind(price)
            .fetch_optional(tx.as_mut())
            .await?
        }
    };
    let Some(remaining) = remaining else {
        return Err(VitrineError::InsufficientCredits);
    };

    // Unique key (subject_id, item_id): a racing double-purchase aborts
    // here and takes its deduction down with it.
    sqlx::query("INSERT INTO unlocks (subject_id, item_id, paid_credits) VALUES ($1, $2, $3)")
        .bind(subject.id())
        .bind(item_id)
        .bind(price)
        .execute(tx.as_mut())
        .await?;

    sqlx::query("UPDATE profiles SET credits = credits + $2 WHERE id = $1")
        .bind(creator_id)
        .bind(price)
        .execute(tx.as_mut())
        .await?;

    tx.commit().await?;
    info!(%item_id, %subject, price, "vitrine item unlocked");

    notify::emit(
        state,
        creator_id,
        "vitrine:unlock",
        serde_json::json!({ "item_id": item_id, "title": title, "buyer": subject.to_string() }),
        Some(price),
    );

    Ok(UnlockReceipt { item_id, paid_credits: price, remaining_credits: remaining })
}

/// Current spendable balance: profile credits for users, the session's
/// trial credits for guests. Missing rows read as zero.
async fn viewer_balance(
    conn: &mut sqlx::PgConnection,
    subject: Subject,
) -> Result<i64, sqlx::Error> {
    let balance = match subject {
        Subject::User(user_id) => {
            sqlx::query_scalar::<_, i64>("SELECT credits FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&mut *conn)
                .await?
        }
        Subject::Guest(guest_id) => {
            sqlx::query_scalar::<_, i64>("SELECT trial_credits FROM sessions WHERE guest_id = $1")
                .bind(guest_id)
                .fetch_optional(&mut *conn)
                .await?
        }
    };
    Ok(balance.unwrap_or(0))
}

// =============================================================================
// CREATOR ITEM MANAGEMENT
// =============================================================================

/// Add an item to the caller's own page. The media URL must survive
/// sanitization; the price is clamped into the valid credit range.
///
/// # Errors
///
/// `Forbidden` for anyone but the creator, `Invalid` for rejected URLs
/// or empty titles.
pub async fn create_item(
    pool: &PgPool,
    creator_id: Uuid,
    caller: Subject,
    item: NewItem,
) -> Result<VitrineItem, VitrineError> {
    if caller != Subject::User(creator_id) {
        return Err(VitrineError::Forbidden);
    }

    let title = item.title.trim();
    if title.is_empty() {
        return Err(VitrineError::Invalid("title is empty"));
    }

    let url = sanitize_url(&item.media_url);
    if !url.is_valid {
        return Err(VitrineError::Invalid(url.error.unwrap_or("media_url rejected")));
    }

    let price = validate_credits(&item.price_credits).data;
    let kind = item.kind.as_deref().unwrap_or("image");

    let row = sqlx::query_as::<_, (Uuid, String, i32)>(
        "INSERT INTO vitrine_items (creator_id, kind, title, media_url, locked, price_credits, position)
         VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7,
             (SELECT COALESCE(MAX(position) + 1, 0) FROM vitrine_items WHERE creator_id = $1)))
         RETURNING id, media_url, position",
    )
    .bind(creator_id)
    .bind(kind)
    .bind(title)
    .bind(&url.data)
    .bind(item.locked)
    .bind(price)
    .bind(item.position)
    .fetch_one(pool)
    .await?;

    let (id, media_url, position) = row;
    info!(%creator_id, item_id = %id, locked = item.locked, price, "vitrine item created");
    Ok(VitrineItem {
        id,
        creator_id,
        kind: kind.to_string(),
        title: title.to_string(),
        media_url: Some(media_url),
        locked: item.locked,
        price_credits: price,
        position,
    })
}

/// Remove one of the caller's own items. Unlock rows cascade away with it.
///
/// # Errors
///
/// `Forbidden` for guests, `ItemNotFound` when the item does not exist or
/// belongs to someone else.
pub async fn delete_item(
    pool: &PgPool,
    item_id: Uuid,
    caller: Subject,
) -> Result<(), VitrineError> {
    let Some(user_id) = caller.as_user() else {
        return Err(VitrineError::Forbidden);
    };

    let result = sqlx::query("DELETE FROM vitrine_items WHERE id = $1 AND creator_id = $2")
        .bind(item_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(VitrineError::ItemNotFound(item_id));
    }
    info!(%item_id, %user_id, "vitrine item deleted");
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "vitrine_test.rs"]
mod tests;
