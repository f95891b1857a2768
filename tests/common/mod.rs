#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
    response::IntoResponse,
};
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use juna_backend::{
    AppState,
    auth::Claims,
    config::AppConfig,
    create_router,
    error::RepositoryError,
    llm::{AnalyzerState, MockAnalyzer},
    models::{
        AdminDashboardStats, CreateJournalEntryRequest, CreatePromptTemplateRequest, JournalEntry,
        LegacyAdminRecord, LegacyRoleMigration, PromptTemplate, RoleRecord,
        UpdateJournalEntryRequest, UpdatePromptTemplateRequest,
    },
    repository::{RepoResult, Repository, RepositoryState},
    session_flag,
    supabase::{AuthProviderState, MockAuthProvider},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse-battery";

// --- In-memory Repository ---

/// MockRepo
///
/// In-memory `Repository` shared between the test and the router through an `Arc`, so tests
/// can change role rows or inject failures after the app is built.
#[derive(Default)]
pub struct MockRepo {
    pub roles: Mutex<HashMap<Uuid, String>>,
    pub legacy: Mutex<HashMap<Uuid, LegacyAdminRecord>>,
    pub entries: Mutex<Vec<JournalEntry>>,
    pub prompts: Mutex<Vec<PromptTemplate>>,
    /// Role and legacy queries fail like a lost connection.
    pub fail_role_queries: AtomicBool,
    /// Artificial latency on role queries, for the timeout path.
    pub role_query_delay: Option<Duration>,
    /// Number of canonical role queries served (or attempted).
    pub role_queries: AtomicUsize,
}

impl MockRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            role_query_delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn set_role(&self, user_id: Uuid, role: &str) {
        self.roles.lock().unwrap().insert(user_id, role.to_string());
    }

    pub fn remove_role(&self, user_id: Uuid) {
        self.roles.lock().unwrap().remove(&user_id);
    }

    pub fn set_legacy(&self, user_id: Uuid, is_admin: bool, is_super_admin: bool) {
        self.legacy.lock().unwrap().insert(
            user_id,
            LegacyAdminRecord {
                user_id,
                is_admin,
                is_super_admin,
            },
        );
    }

    pub fn fail_roles(&self, fail: bool) {
        self.fail_role_queries.store(fail, Ordering::SeqCst);
    }

    pub fn role_query_count(&self) -> usize {
        self.role_queries.load(Ordering::SeqCst)
    }

    pub fn add_prompt(&self, template: &str, is_active: bool) -> PromptTemplate {
        let prompt = PromptTemplate {
            id: Uuid::new_v4(),
            name: "reflection".to_string(),
            description: None,
            template: template.to_string(),
            is_active,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.prompts.lock().unwrap().push(prompt.clone());
        prompt
    }

    pub fn add_entry(&self, user_id: Uuid, title: &str, content: &str) -> JournalEntry {
        let entry = JournalEntry {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            ..JournalEntry::default()
        };
        self.entries.lock().unwrap().push(entry.clone());
        entry
    }

    async fn role_gate(&self) -> RepoResult<()> {
        if let Some(delay) = self.role_query_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_role_queries.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MockRepo {
    async fn get_role_record(&self, user_id: Uuid) -> RepoResult<Option<RoleRecord>> {
        self.role_queries.fetch_add(1, Ordering::SeqCst);
        self.role_gate().await?;
        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|role| RoleRecord {
                user_id,
                role: role.clone(),
            }))
    }

    async fn get_legacy_admin_record(&self, user_id: Uuid) -> RepoResult<Option<LegacyAdminRecord>> {
        self.role_gate().await?;
        Ok(self.legacy.lock().unwrap().get(&user_id).cloned())
    }

    async fn migrate_legacy_roles(&self) -> RepoResult<LegacyRoleMigration> {
        let legacy: Vec<LegacyAdminRecord> = self.legacy.lock().unwrap().values().cloned().collect();
        let mut roles = self.roles.lock().unwrap();
        let mut outcome = LegacyRoleMigration::default();
        for record in legacy {
            if roles.contains_key(&record.user_id) {
                outcome.skipped += 1;
            } else {
                roles.insert(record.user_id, record.role().as_str().to_string());
                outcome.copied += 1;
            }
        }
        Ok(outcome)
    }

    async fn bootstrap_super_admin(&self, user_id: Uuid) -> RepoResult<bool> {
        let mut roles = self.roles.lock().unwrap();
        if roles.values().any(|r| r == "admin" || r == "super_admin") {
            return Ok(false);
        }
        roles.insert(user_id, "super_admin".to_string());
        Ok(true)
    }

    async fn list_entries(&self, user_id: Uuid) -> RepoResult<Vec<JournalEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_entry(&self, id: Uuid, user_id: Uuid) -> RepoResult<Option<JournalEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id && e.user_id == user_id)
            .cloned())
    }

    async fn create_entry(
        &self,
        user_id: Uuid,
        req: CreateJournalEntryRequest,
    ) -> RepoResult<JournalEntry> {
        let entry = JournalEntry {
            id: Uuid::new_v4(),
            user_id,
            title: req.title,
            content: req.content,
            mood: req.mood,
            analysis: None,
            analyzed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.entries.lock().unwrap().push(entry.clone());
        Ok(entry)
    }

    async fn update_entry(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: UpdateJournalEntryRequest,
    ) -> RepoResult<Option<JournalEntry>> {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries
            .iter_mut()
            .find(|e| e.id == id && e.user_id == user_id)
        else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            entry.title = title;
        }
        if let Some(content) = req.content {
            entry.content = content;
        }
        if req.mood.is_some() {
            entry.mood = req.mood;
        }
        entry.updated_at = Utc::now();
        Ok(Some(entry.clone()))
    }

    async fn delete_entry(&self, id: Uuid, user_id: Uuid) -> RepoResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !(e.id == id && e.user_id == user_id));
        Ok(entries.len() < before)
    }

    async fn save_analysis(
        &self,
        id: Uuid,
        user_id: Uuid,
        analysis: String,
    ) -> RepoResult<Option<JournalEntry>> {
        let mut entries = self.entries.lock().unwrap();
        Ok(entries
            .iter_mut()
            .find(|e| e.id == id && e.user_id == user_id)
            .map(|entry| {
                entry.analysis = Some(analysis);
                entry.analyzed_at = Some(Utc::now());
                entry.clone()
            }))
    }

    async fn list_prompts(&self) -> RepoResult<Vec<PromptTemplate>> {
        Ok(self.prompts.lock().unwrap().clone())
    }

    async fn get_active_prompt(&self) -> RepoResult<Option<PromptTemplate>> {
        Ok(self
            .prompts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.is_active)
            .cloned())
    }

    async fn create_prompt(
        &self,
        req: CreatePromptTemplateRequest,
        created_by: Uuid,
    ) -> RepoResult<PromptTemplate> {
        let prompt = PromptTemplate {
            id: Uuid::new_v4(),
            name: req.name,
            description: req.description,
            template: req.template,
            is_active: false,
            created_by,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(prompt)
    }

    async fn update_prompt(
        &self,
        id: Uuid,
        req: UpdatePromptTemplateRequest,
    ) -> RepoResult<Option<PromptTemplate>> {
        let mut prompts = self.prompts.lock().unwrap();
        let Some(prompt) = prompts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            prompt.name = name;
        }
        if req.description.is_some() {
            prompt.description = req.description;
        }
        if let Some(template) = req.template {
            prompt.template = template;
        }
        Ok(Some(prompt.clone()))
    }

    async fn delete_prompt(&self, id: Uuid) -> RepoResult<bool> {
        let mut prompts = self.prompts.lock().unwrap();
        let before = prompts.len();
        prompts.retain(|p| p.id != id);
        Ok(prompts.len() < before)
    }

    async fn activate_prompt(&self, id: Uuid) -> RepoResult<Option<PromptTemplate>> {
        let mut prompts = self.prompts.lock().unwrap();
        if !prompts.iter().any(|p| p.id == id) {
            return Ok(None);
        }
        for prompt in prompts.iter_mut() {
            prompt.is_active = prompt.id == id;
        }
        Ok(prompts.iter().find(|p| p.id == id).cloned())
    }

    async fn get_stats(&self) -> RepoResult<AdminDashboardStats> {
        let entries = self.entries.lock().unwrap();
        let mut authors: Vec<Uuid> = entries.iter().map(|e| e.user_id).collect();
        authors.sort();
        authors.dedup();
        Ok(AdminDashboardStats {
            total_entries: entries.len() as i64,
            analyzed_entries: entries.iter().filter(|e| e.analysis.is_some()).count() as i64,
            total_authors: authors.len() as i64,
            prompt_templates: self.prompts.lock().unwrap().len() as i64,
            admins: self
                .roles
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.as_str() == "admin" || r.as_str() == "super_admin")
                .count() as i64,
        })
    }
}

// --- App Assembly ---

pub fn test_config() -> AppConfig {
    AppConfig {
        role_query_timeout: Duration::from_millis(200),
        ..AppConfig::default()
    }
}

pub fn app_state(
    repo: Arc<MockRepo>,
    auth_provider: MockAuthProvider,
    analyzer: MockAnalyzer,
    config: AppConfig,
) -> AppState {
    AppState::new(
        repo as RepositoryState,
        Arc::new(auth_provider) as AuthProviderState,
        Arc::new(analyzer) as AnalyzerState,
        config,
    )
}

/// Router over `repo` with a default analyzer and an empty auth provider.
pub fn build_app(repo: Arc<MockRepo>, config: AppConfig) -> Router {
    let provider = MockAuthProvider::new(&config.jwt_secret);
    create_router(app_state(repo, provider, MockAnalyzer::new(), config))
}

// --- Tokens & Cookies ---

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn token_with_exp(config: &AppConfig, user_id: Uuid, exp: u64) -> String {
    let claims = Claims {
        sub: user_id,
        email: Some(format!("{}@juna.test", user_id.simple())),
        exp: exp as usize,
        iat: Some(now() as usize),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .unwrap()
}

pub fn token_for(config: &AppConfig, user_id: Uuid) -> String {
    token_with_exp(config, user_id, now() + 3600)
}

/// `name=value` pair for the session cookie.
pub fn session_cookie(config: &AppConfig, user_id: Uuid) -> String {
    format!("{}={}", config.session_cookie_name, token_for(config, user_id))
}

/// `name=value` pair for a correctly signed admin_session flag.
pub fn signed_flag_cookie(config: &AppConfig) -> String {
    let jar = SignedCookieJar::new(session_flag::cookie_key(&config.cookie_secret));
    let response = session_flag::write_flag(jar, config.admin_session_ttl, false).into_response();
    cookie_pairs(&response).join("; ")
}

// --- Requests & Responses ---

pub fn get(uri: &str, cookies: &[&str]) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if !cookies.is_empty() {
        builder = builder.header(header::COOKIE, cookies.join("; "));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, cookies: &[&str], body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if !cookies.is_empty() {
        builder = builder.header(header::COOKIE, cookies.join("; "));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: &str, uri: &str, cookies: &[&str]) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if !cookies.is_empty() {
        builder = builder.header(header::COOKIE, cookies.join("; "));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string())
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Full `Set-Cookie` header values.
pub fn set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// The `name=value` part of every `Set-Cookie`, ready to be replayed in a `Cookie` header.
pub fn cookie_pairs<B>(response: &Response<B>) -> Vec<String> {
    set_cookies(response)
        .into_iter()
        .filter_map(|v| v.split(';').next().map(str::to_string))
        .collect()
}
