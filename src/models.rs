use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RepositoryError;

// --- Roles ---

/// Role
///
/// Privilege classification of an identity. `None` means no role row exists; it is
/// treated exactly like `User` by every access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    #[default]
    None,
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Parses the value stored in `user_roles.role`.
    pub fn from_db(value: &str) -> Result<Self, RepositoryError> {
        match value {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(RepositoryError::Malformed(format!(
                "unknown role '{other}' in user_roles"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::None => "none",
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    /// Collapses `None` and `User`, which grant the same privileges.
    pub fn privilege(&self) -> Role {
        match self {
            Role::None => Role::User,
            other => *other,
        }
    }
}

/// RoleRecord
///
/// Canonical role row from `public.user_roles`.
#[derive(Debug, Clone, FromRow)]
pub struct RoleRecord {
    pub user_id: Uuid,
    pub role: String,
}

/// LegacyAdminRecord
///
/// Row from the older boolean-flag table `public.admin_users`. Only read to detect
/// disagreement with `user_roles` and by the one-time migration.
#[derive(Debug, Clone, FromRow, Default)]
pub struct LegacyAdminRecord {
    pub user_id: Uuid,
    pub is_admin: bool,
    pub is_super_admin: bool,
}

impl LegacyAdminRecord {
    pub fn role(&self) -> Role {
        if self.is_super_admin {
            Role::SuperAdmin
        } else if self.is_admin {
            Role::Admin
        } else {
            Role::User
        }
    }
}

// --- Journal ---

/// JournalEntry
///
/// A journal entry from `public.journal_entries`. Owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct JournalEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub mood: Option<String>,
    // Latest AI analysis text, if one has been requested.
    pub analysis: Option<String>,
    #[ts(type = "string | null")]
    pub analyzed_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// CreateJournalEntryRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateJournalEntryRequest {
    pub title: String,
    pub content: String,
    pub mood: Option<String>,
}

/// UpdateJournalEntryRequest
///
/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateJournalEntryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

// --- Prompt templates ---

/// PromptTemplate
///
/// An AI prompt template managed from the admin panel (`public.prompt_templates`).
/// The `template` text must contain the `{{entry}}` placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct PromptTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub template: String,
    pub is_active: bool,
    pub created_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

pub const ENTRY_PLACEHOLDER: &str = "{{entry}}";

impl PromptTemplate {
    /// Substitutes the entry text into the template.
    pub fn render(&self, entry: &JournalEntry) -> String {
        let body = format!("{}\n\n{}", entry.title, entry.content);
        self.template.replace(ENTRY_PLACEHOLDER, &body)
    }
}

/// CreatePromptTemplateRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePromptTemplateRequest {
    pub name: String,
    pub description: Option<String>,
    pub template: String,
}

/// UpdatePromptTemplateRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePromptTemplateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

// --- Auth payloads ---

/// SignUpRequest
///
/// The password is forwarded to Supabase Auth and never stored or logged here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
}

/// SignInRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    /// Local path to return to after sign-in.
    #[serde(default, rename = "redirectedFrom")]
    pub redirected_from: Option<String>,
}

// --- Output schemas ---

/// UserProfile
///
/// Output of `GET /profile`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// AdminLoginPage
///
/// Output of `GET /admin/login`: where to post credentials and where the caller came from.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AdminLoginPage {
    pub action: String,
    #[serde(rename = "redirectedFrom")]
    pub redirected_from: Option<String>,
}

/// AdminDashboardStats
///
/// Output of `GET /admin/dashboard`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_entries: i64,
    pub analyzed_entries: i64,
    pub total_authors: i64,
    pub prompt_templates: i64,
    pub admins: i64,
}

/// LegacyRoleMigration
///
/// Outcome of copying `admin_users` rows into `user_roles`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyRoleMigration {
    pub copied: u64,
    // Rows skipped because a canonical row already existed.
    pub skipped: u64,
}
