use crate::{
    error::RepositoryError,
    models::{
        AdminDashboardStats, CreateJournalEntryRequest, CreatePromptTemplateRequest, JournalEntry,
        LegacyAdminRecord, LegacyRoleMigration, PromptTemplate, RoleRecord,
        UpdateJournalEntryRequest, UpdatePromptTemplateRequest,
    },
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers and the access gate only
/// ever see `Arc<dyn Repository>`, so tests swap in in-memory implementations.
///
/// A missing row is `Ok(None)` / `Ok(false)`; `Err` is reserved for infrastructure failures so
/// callers can tell "no such record" apart from "could not ask".
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Roles ---
    // Canonical enumerated role row (`user_roles`).
    async fn get_role_record(&self, user_id: Uuid) -> RepoResult<Option<RoleRecord>>;
    // Legacy boolean flags row (`admin_users`).
    async fn get_legacy_admin_record(&self, user_id: Uuid) -> RepoResult<Option<LegacyAdminRecord>>;
    // One-time copy of legacy rows into the canonical table. Never overwrites.
    async fn migrate_legacy_roles(&self) -> RepoResult<LegacyRoleMigration>;
    // Grants super_admin to `user_id` only if no admin exists yet. Returns true if granted.
    async fn bootstrap_super_admin(&self, user_id: Uuid) -> RepoResult<bool>;

    // --- Journal (Owner-Only) ---
    async fn list_entries(&self, user_id: Uuid) -> RepoResult<Vec<JournalEntry>>;
    async fn get_entry(&self, id: Uuid, user_id: Uuid) -> RepoResult<Option<JournalEntry>>;
    async fn create_entry(
        &self,
        user_id: Uuid,
        req: CreateJournalEntryRequest,
    ) -> RepoResult<JournalEntry>;
    async fn update_entry(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: UpdateJournalEntryRequest,
    ) -> RepoResult<Option<JournalEntry>>;
    async fn delete_entry(&self, id: Uuid, user_id: Uuid) -> RepoResult<bool>;
    async fn save_analysis(
        &self,
        id: Uuid,
        user_id: Uuid,
        analysis: String,
    ) -> RepoResult<Option<JournalEntry>>;

    // --- Prompt templates (Admin) ---
    async fn list_prompts(&self) -> RepoResult<Vec<PromptTemplate>>;
    async fn get_active_prompt(&self) -> RepoResult<Option<PromptTemplate>>;
    async fn create_prompt(
        &self,
        req: CreatePromptTemplateRequest,
        created_by: Uuid,
    ) -> RepoResult<PromptTemplate>;
    async fn update_prompt(
        &self,
        id: Uuid,
        req: UpdatePromptTemplateRequest,
    ) -> RepoResult<Option<PromptTemplate>>;
    async fn delete_prompt(&self, id: Uuid) -> RepoResult<bool>;
    // Makes `id` the only active template.
    async fn activate_prompt(&self, id: Uuid) -> RepoResult<Option<PromptTemplate>>;

    async fn get_stats(&self) -> RepoResult<AdminDashboardStats>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by the Supabase Postgres database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ENTRY_COLUMNS: &str =
    "id, user_id, title, content, mood, analysis, analyzed_at, created_at, updated_at";
const PROMPT_COLUMNS: &str =
    "id, name, description, template, is_active, created_by, created_at, updated_at";

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_role_record(&self, user_id: Uuid) -> RepoResult<Option<RoleRecord>> {
        let record = sqlx::query_as::<_, RoleRecord>(
            "SELECT user_id, role FROM user_roles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn get_legacy_admin_record(&self, user_id: Uuid) -> RepoResult<Option<LegacyAdminRecord>> {
        let record = sqlx::query_as::<_, LegacyAdminRecord>(
            "SELECT user_id, is_admin, is_super_admin FROM admin_users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// migrate_legacy_roles
    ///
    /// Runs in a single transaction. Existing canonical rows win: `ON CONFLICT DO NOTHING`.
    async fn migrate_legacy_roles(&self) -> RepoResult<LegacyRoleMigration> {
        let mut tx = self.pool.begin().await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_users")
            .fetch_one(&mut *tx)
            .await?;

        let copied = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role)
            SELECT user_id,
                   CASE WHEN is_super_admin THEN 'super_admin'
                        WHEN is_admin THEN 'admin'
                        ELSE 'user' END
            FROM admin_users
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(LegacyRoleMigration {
            copied,
            skipped: (total as u64).saturating_sub(copied),
        })
    }

    async fn bootstrap_super_admin(&self, user_id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role)
            SELECT $1, 'super_admin'
            WHERE NOT EXISTS (
                SELECT 1 FROM user_roles WHERE role IN ('admin', 'super_admin')
            )
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- JOURNAL ---

    async fn list_entries(&self, user_id: Uuid) -> RepoResult<Vec<JournalEntry>> {
        let entries = sqlx::query_as::<_, JournalEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn get_entry(&self, id: Uuid, user_id: Uuid) -> RepoResult<Option<JournalEntry>> {
        let entry = sqlx::query_as::<_, JournalEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn create_entry(
        &self,
        user_id: Uuid,
        req: CreateJournalEntryRequest,
    ) -> RepoResult<JournalEntry> {
        let entry = sqlx::query_as::<_, JournalEntry>(&format!(
            r#"INSERT INTO journal_entries (id, user_id, title, content, mood, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
               RETURNING {ENTRY_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(req.title)
        .bind(req.content)
        .bind(req.mood)
        .fetch_one(&self.pool)
        .await?;
        Ok(entry)
    }

    /// update_entry
    ///
    /// Owner-Only partial update using `COALESCE` so absent fields keep their value.
    async fn update_entry(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: UpdateJournalEntryRequest,
    ) -> RepoResult<Option<JournalEntry>> {
        let entry = sqlx::query_as::<_, JournalEntry>(&format!(
            r#"UPDATE journal_entries
               SET title = COALESCE($3, title),
                   content = COALESCE($4, content),
                   mood = COALESCE($5, mood),
                   updated_at = NOW()
               WHERE id = $1 AND user_id = $2
               RETURNING {ENTRY_COLUMNS}"#
        ))
        .bind(id)
        .bind(user_id)
        .bind(req.title)
        .bind(req.content)
        .bind(req.mood)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn delete_entry(&self, id: Uuid, user_id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM journal_entries WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_analysis(
        &self,
        id: Uuid,
        user_id: Uuid,
        analysis: String,
    ) -> RepoResult<Option<JournalEntry>> {
        let entry = sqlx::query_as::<_, JournalEntry>(&format!(
            r#"UPDATE journal_entries
               SET analysis = $3, analyzed_at = NOW()
               WHERE id = $1 AND user_id = $2
               RETURNING {ENTRY_COLUMNS}"#
        ))
        .bind(id)
        .bind(user_id)
        .bind(analysis)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    // --- PROMPT TEMPLATES ---

    async fn list_prompts(&self) -> RepoResult<Vec<PromptTemplate>> {
        let prompts = sqlx::query_as::<_, PromptTemplate>(&format!(
            "SELECT {PROMPT_COLUMNS} FROM prompt_templates ORDER BY is_active DESC, updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(prompts)
    }

    async fn get_active_prompt(&self) -> RepoResult<Option<PromptTemplate>> {
        let prompt = sqlx::query_as::<_, PromptTemplate>(&format!(
            "SELECT {PROMPT_COLUMNS} FROM prompt_templates WHERE is_active = true LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(prompt)
    }

    async fn create_prompt(
        &self,
        req: CreatePromptTemplateRequest,
        created_by: Uuid,
    ) -> RepoResult<PromptTemplate> {
        let prompt = sqlx::query_as::<_, PromptTemplate>(&format!(
            r#"INSERT INTO prompt_templates (id, name, description, template, is_active, created_by, created_at, updated_at)
               VALUES ($1, $2, $3, $4, false, $5, NOW(), NOW())
               RETURNING {PROMPT_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(req.name)
        .bind(req.description)
        .bind(req.template)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(prompt)
    }

    async fn update_prompt(
        &self,
        id: Uuid,
        req: UpdatePromptTemplateRequest,
    ) -> RepoResult<Option<PromptTemplate>> {
        let prompt = sqlx::query_as::<_, PromptTemplate>(&format!(
            r#"UPDATE prompt_templates
               SET name = COALESCE($2, name),
                   description = COALESCE($3, description),
                   template = COALESCE($4, template),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {PROMPT_COLUMNS}"#
        ))
        .bind(id)
        .bind(req.name)
        .bind(req.description)
        .bind(req.template)
        .fetch_optional(&self.pool)
        .await?;
        Ok(prompt)
    }

    async fn delete_prompt(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM prompt_templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// activate_prompt
    ///
    /// Deactivate-all and activate-one happen in one transaction; an unknown id rolls back
    /// and leaves the current active template untouched.
    async fn activate_prompt(&self, id: Uuid) -> RepoResult<Option<PromptTemplate>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE prompt_templates SET is_active = false WHERE is_active = true AND id <> $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let prompt = sqlx::query_as::<_, PromptTemplate>(&format!(
            r#"UPDATE prompt_templates SET is_active = true, updated_at = NOW()
               WHERE id = $1
               RETURNING {PROMPT_COLUMNS}"#
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        match prompt {
            Some(prompt) => {
                tx.commit().await?;
                Ok(Some(prompt))
            }
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    async fn get_stats(&self) -> RepoResult<AdminDashboardStats> {
        Ok(AdminDashboardStats {
            total_entries: count(&self.pool, "SELECT COUNT(*) FROM journal_entries").await?,
            analyzed_entries: count(
                &self.pool,
                "SELECT COUNT(*) FROM journal_entries WHERE analysis IS NOT NULL",
            )
            .await?,
            total_authors: count(&self.pool, "SELECT COUNT(DISTINCT user_id) FROM journal_entries")
                .await?,
            prompt_templates: count(&self.pool, "SELECT COUNT(*) FROM prompt_templates").await?,
            admins: count(
                &self.pool,
                "SELECT COUNT(*) FROM user_roles WHERE role IN ('admin', 'super_admin')",
            )
            .await?,
        })
    }
}

async fn count(pool: &PgPool, sql: &str) -> RepoResult<i64> {
    Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await?)
}
