use juna_backend::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    llm::{AnalyzerState, OpenAiAnalyzer},
    repository::{PostgresRepository, RepositoryState},
    supabase::{AuthProviderState, SupabaseAuthClient},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, database (migrations, legacy role migration, bootstrap
/// admin), external clients and the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "juna_backend=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!(
        failure_policy = ?config.failure_policy,
        check_legacy_roles = config.check_legacy_roles,
        "Application starting in {:?} mode",
        config.env
    );

    // 3. Database Initialization (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 4. Role schema housekeeping
    if config.migrate_legacy_roles {
        let migration = repo
            .migrate_legacy_roles()
            .await
            .expect("FATAL: Legacy role migration failed.");
        tracing::info!(
            copied = migration.copied,
            skipped = migration.skipped,
            "legacy admin_users rows migrated to user_roles"
        );
    }

    if let Some(user_id) = config.bootstrap_super_admin {
        match repo.bootstrap_super_admin(user_id).await {
            Ok(true) => tracing::warn!(%user_id, "bootstrap super_admin granted"),
            Ok(false) => tracing::info!(%user_id, "admin already present, bootstrap skipped"),
            Err(e) => tracing::error!(%user_id, error = %e, "bootstrap super_admin failed"),
        }
    }

    // 5. External clients
    let auth_provider = Arc::new(SupabaseAuthClient::new(
        &config.supabase_url,
        &config.supabase_anon_key,
    )) as AuthProviderState;

    let analyzer = Arc::new(
        OpenAiAnalyzer::new(
            &config.llm_base_url,
            &config.llm_api_key,
            &config.llm_model,
            config.llm_timeout,
        )
        .expect("FATAL: Failed to build the LLM HTTP client."),
    ) as AnalyzerState;

    // 6. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(repo, auth_provider, analyzer, config);

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("FATAL: HTTP server error.");

    tracing::info!("Server stopped");
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
