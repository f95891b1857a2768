use axum::{Router, extract::FromRef, http::HeaderName, middleware};
use axum_extra::extract::cookie::Key;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access control: session resolution, role lookup, the decision and its cache.
pub mod access;
pub mod auth;
pub mod session_flag;

// Core application services and components.
pub mod config;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod models;
pub mod repository;
pub mod supabase;

// Routes grouped by access class (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use access::AccessGate;
pub use config::AppConfig;
pub use llm::{AnalyzerState, MockAnalyzer, OpenAiAnalyzer};
pub use repository::{PostgresRepository, RepositoryState};
pub use supabase::{AuthProviderState, MockAuthProvider, SupabaseAuthClient};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI document
/// served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::sign_up, handlers::sign_in, handlers::sign_out,
        handlers::get_profile, handlers::list_entries, handlers::create_entry,
        handlers::get_entry, handlers::update_entry, handlers::delete_entry,
        handlers::analyze_entry, handlers::admin_login_page, handlers::admin_login,
        handlers::get_dashboard, handlers::list_prompts, handlers::create_prompt,
        handlers::update_prompt, handlers::delete_prompt, handlers::activate_prompt
    ),
    components(
        schemas(
            models::Role, models::JournalEntry, models::CreateJournalEntryRequest,
            models::UpdateJournalEntryRequest, models::PromptTemplate,
            models::CreatePromptTemplateRequest, models::UpdatePromptTemplateRequest,
            models::SignUpRequest, models::SignInRequest, models::UserProfile,
            models::AdminLoginPage, models::AdminDashboardStats,
        )
    ),
    tags(
        (name = "juna", description = "Juna Journal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container for every service the handlers use. Cloned per request; all
/// members are `Arc`s or cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: Postgres access via the pool.
    pub repo: RepositoryState,
    /// Supabase Auth (sign-up and password grant).
    pub auth_provider: AuthProviderState,
    /// LLM completion provider for entry analysis.
    pub analyzer: AnalyzerState,
    /// Configuration: The loaded, immutable environment configuration.
    pub config: AppConfig,
    /// Signing key for the `admin_session` flag, derived from `COOKIE_SECRET`.
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(
        repo: RepositoryState,
        auth_provider: AuthProviderState,
        analyzer: AnalyzerState,
        config: AppConfig,
    ) -> Self {
        let cookie_key = session_flag::cookie_key(&config.cookie_secret);
        Self {
            repo,
            auth_provider,
            analyzer,
            config,
            cookie_key,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

// Required by `SignedCookieJar`.
impl FromRef<AppState> for Key {
    fn from_ref(app_state: &AppState) -> Key {
        app_state.cookie_key.clone()
    }
}

/// create_router
///
/// Assembles the routes, wraps them in the access gate and the observability stack, and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        .nest("/admin", admin::admin_routes())
        // 3. Access Gate: one evaluation per request, in front of every route. Unmatched paths
        // are classified too, so `/admin/anything` redirects rather than 404s for non-admins.
        .layer(middleware::from_fn_with_state(
            AccessGate::from_ref(&state),
            access::access_gate,
        ))
        .with_state(state);

    // 4. Observability and Correlation Layers (outermost)
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` set by
/// `SetRequestIdLayer`, so every log line of a request (access decisions included) can be
/// correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
