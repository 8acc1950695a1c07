//! Per-creator visibility settings.
//!
//! DESIGN
//! ======
//! One explicit struct of twenty boolean flags replaces the free-form flag
//! blob: every field is named, every merge step is defined. Resolution
//! precedence is defaults < stored row < visitor safety override. Whenever
//! the viewer is not the creator, the seven edit-affordance flags come back
//! `false` no matter what is stored: hiding a control from its owner is an
//! annoyance, leaking one to a visitor is an incident.
//!
//! Loads never fail: a missing row, a malformed `flags` blob, or a database
//! error resolves to defaults (plus the visitor override) with a logged
//! warning. Updates are stricter and do propagate database errors, so a
//! transient failure can never silently reset a creator's settings.

use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::event::ErrorCode;
use crate::services::session::Subject;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VisibilityError {
    #[error("only the creator can change these settings")]
    Forbidden,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ErrorCode for VisibilityError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Forbidden => "E_FORBIDDEN",
            Self::Db(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// The full flag set for one creator page. Everything defaults to shown;
/// the visitor override below is what hides controls from non-creators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct VisibilitySettings {
    // Page layout.
    pub show_profile_header: bool,
    pub show_avatar: bool,
    pub show_social_links: bool,
    pub show_vitrine: bool,
    pub show_locked_previews: bool,
    pub show_support_button: bool,
    // Presence and queue.
    pub show_online_status: bool,
    pub show_visitor_count: bool,
    pub show_queue_status: bool,
    // Chat and notifications.
    pub show_chat: bool,
    pub show_notifications_bell: bool,
    pub show_trial_banner: bool,
    pub show_credit_balance: bool,
    // Edit affordances. Forced off for every non-creator viewer.
    pub show_edit_icons: bool,
    pub show_upload_buttons: bool,
    pub show_settings_button: bool,
    pub show_menu_dropdown: bool,
    pub show_password_protection: bool,
    pub show_chat_editing: bool,
    pub show_chat_message_edit: bool,
}

impl Default for VisibilitySettings {
    fn default() -> Self {
        Self {
            show_profile_header: true,
            show_avatar: true,
            show_social_links: true,
            show_vitrine: true,
            show_locked_previews: true,
            show_support_button: true,
            show_online_status: true,
            show_visitor_count: true,
            show_queue_status: true,
            show_chat: true,
            show_notifications_bell: true,
            show_trial_banner: true,
            show_credit_balance: true,
            show_edit_icons: true,
            show_upload_buttons: true,
            show_settings_button: true,
            show_menu_dropdown: true,
            show_password_protection: true,
            show_chat_editing: true,
            show_chat_message_edit: true,
        }
    }
}

impl VisibilitySettings {
    /// Force-disable every edit affordance. Applied whenever the viewer is
    /// not the creator, whatever the stored flags say.
    pub fn disable_edit_affordances(&mut self) {
        self.show_edit_icons = false;
        self.show_upload_buttons = false;
        self.show_settings_button = false;
        self.show_menu_dropdown = false;
        self.show_password_protection = false;
        self.show_chat_editing = false;
        self.show_chat_message_edit = false;
    }
}

/// Partial update: only the named flags change. Unknown keys in stored
/// blobs are ignored on read, which is also how old rows self-heal.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct VisibilityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_profile_header: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_avatar: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_social_links: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_vitrine: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_locked_previews: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_support_button: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_online_status: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_visitor_count: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_queue_status: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_chat: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_notifications_bell: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_trial_banner: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_credit_balance: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_edit_icons: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_upload_buttons: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_settings_button: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_menu_dropdown: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_password_protection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_chat_editing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_chat_message_edit: Option<bool>,
}

impl VisibilityPatch {
    pub fn apply(&self, settings: &mut VisibilitySettings) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = self.$field { settings.$field = v; })*
            };
        }
        merge!(
            show_profile_header,
            show_avatar,
            show_social_links,
            show_vitrine,
            show_locked_previews,
            show_support_button,
            show_online_status,
            show_visitor_count,
            show_queue_status,
            show_chat,
            show_notifications_bell,
            show_trial_banner,
            show_credit_balance,
            show_edit_icons,
            show_upload_buttons,
            show_settings_button,
            show_menu_dropdown,
            show_password_protection,
            show_chat_editing,
            show_chat_message_edit,
        );
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        serde_json::to_value(self).is_ok_and(|v| v.as_object().is_some_and(serde_json::Map::is_empty))
    }
}

fn is_creator(viewer: Option<Subject>, creator_id: Uuid) -> bool {
    viewer == Some(Subject::User(creator_id))
}

// =============================================================================
// LOAD / UPDATE
// =============================================================================

/// Resolve the settings a viewer is allowed to see. Infallible: any storage
/// problem degrades to defaults, never to an error page.
pub async fn load(pool: &PgPool, creator_id: Uuid, viewer: Option<Subject>) -> VisibilitySettings {
    let mut settings = match fetch_flags(pool, creator_id).await {
        Ok(Some(flags)) => parse_flags(creator_id, flags),
        Ok(None) => VisibilitySettings::default(),
        Err(e) => {
            warn!(%creator_id, error = %e, "settings load failed, serving defaults");
            VisibilitySettings::default()
        }
    };
    if !is_creator(viewer, creator_id) {
        settings.disable_edit_affordances();
    }
    settings
}

/// Merge a patch over the stored flags. Creator-only.
pub async fn update(
    pool: &PgPool,
    creator_id: Uuid,
    caller: Subject,
    patch: &VisibilityPatch,
) -> Result<VisibilitySettings, VisibilityError> {
    if caller != Subject::User(creator_id) {
        return Err(VisibilityError::Forbidden);
    }

    let mut settings = match fetch_flags(pool, creator_id).await? {
        Some(flags) => parse_flags(creator_id, flags),
        None => VisibilitySettings::default(),
    };
    patch.apply(&mut settings);

    let flags = serde_json::to_value(settings).unwrap_or_else(|_| serde_json::json!({}));
    sqlx::query(
        "INSERT INTO visibility_settings (creator_id, flags, updated_at)
         VALUES ($1, $2, now())
         ON CONFLICT (creator_id) DO UPDATE SET flags = EXCLUDED.flags, updated_at = now()",
    )
    .bind(creator_id)
    .bind(flags)
    .execute(pool)
    .await?;

    Ok(settings)
}

async fn fetch_flags(pool: &PgPool, creator_id: Uuid) -> Result<Option<serde_json::Value>, sqlx::Error> {
    sqlx::query_scalar("SELECT flags FROM visibility_settings WHERE creator_id = $1")
        .bind(creator_id)
        .fetch_optional(pool)
        .await
}

/// Stored blob -> typed settings. Malformed blobs self-heal to defaults;
/// the next update overwrites them with a complete typed row.
fn parse_flags(creator_id: Uuid, flags: serde_json::Value) -> VisibilitySettings {
    let mut settings = VisibilitySettings::default();
    match serde_json::from_value::<VisibilityPatch>(flags) {
        Ok(stored) => stored.apply(&mut settings),
        Err(e) => {
            warn!(%creator_id, error = %e, "malformed stored flags, serving defaults");
        }
    }
    settings
}

#[cfg(test)]
#[path = "visibility_test.rs"]
mod tests;
