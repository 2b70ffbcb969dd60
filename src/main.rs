use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method, header::CONTENT_TYPE};
use axum::{Router, routing::get};
use deadpool_diesel::Runtime as DeadpoolRuntime;
use deadpool_diesel::postgres::Manager as DeadpoolManager;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use pluto_backend::PgPool;
use pluto_backend::auth::user_store::Backend as AuthBackend;
use pluto_backend::config::Config;
use pluto_backend::llm::cache::InMemoryResponseCache;
use pluto_backend::llm::gemini_client::build_gemini_client;
use pluto_backend::logging::init_subscriber;
use pluto_backend::routes::auth::auth_routes;
use pluto_backend::routes::drawings::drawing_routes;
use pluto_backend::routes::health::health_check;
use pluto_backend::services::htp::{HtpPipeline, PromptLibrary};
use pluto_backend::state::AppState;

// Imports for axum-login and tower-sessions
use axum_login::AuthManagerLayerBuilder;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

// Define the embedded migrations macro
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_subscriber();

    tracing::info!("Starting Pluto backend server...");

    let config = Config::load().context("Failed to load configuration")?;

    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set")?;
    tracing::info!("Connecting to database...");
    let manager = DeadpoolManager::new(database_url, DeadpoolRuntime::Tokio1);
    let pool: PgPool = PgPool::builder(manager)
        .runtime(DeadpoolRuntime::Tokio1)
        .build()
        .expect("Failed to create DB pool.");
    tracing::info!("Database connection pool established.");

    run_migrations(&pool).await?;

    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; analysis runs will fail");
    }

    // --- Analysis pipeline setup ---
    let prompts = PromptLibrary::load(Path::new(&config.prompt_dir), &config.prompt_language)?;
    let ai_client = build_gemini_client()?;
    let mut pipeline = HtpPipeline::new(
        ai_client,
        Arc::new(prompts),
        config.analysis_model.clone(),
        Duration::from_secs(config.analysis_call_timeout_secs),
    );
    if config.analysis_cache_enabled {
        let capacity = NonZeroUsize::new(config.analysis_cache_entries)
            .context("analysis_cache_entries must be greater than zero")?;
        pipeline = pipeline.with_cache(Arc::new(InMemoryResponseCache::new(capacity)));
    }

    tokio::fs::create_dir_all(&config.upload_storage_path)
        .await
        .context("Failed to create upload storage directory")?;

    // --- Session & auth setup ---
    let session_store = MemoryStore::default();
    let session_manager_layer = SessionManagerLayer::new(session_store)
        .with_secure(false) // Set based on env/config in production
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(7)));

    let auth_backend = AuthBackend::new(pool.clone());
    let auth_layer = AuthManagerLayerBuilder::new(auth_backend, session_manager_layer).build();

    let app_state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        pipeline: Arc::new(pipeline),
    };

    // CORS for the local frontend dev server.
    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true);

    let app = Router::new()
        .route("/api/health", get(health_check))
        .nest("/api/auth", auth_routes())
        .nest("/api", drawing_routes())
        .nest_service("/uploads", ServeDir::new(&config.upload_storage_path))
        .layer(auth_layer)
        .with_state(app_state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port)
        .parse()
        .expect("Invalid address format");

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// Extracted migration logic
async fn run_migrations(pool: &PgPool) -> Result<()> {
    tracing::info!("Attempting to run database migrations...");
    let conn = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get connection for migration: {}", e))?;
    conn.interact(|conn| match conn.run_pending_migrations(MIGRATIONS) {
        Ok(versions) => {
            if versions.is_empty() {
                tracing::info!("No pending migrations found.");
            } else {
                tracing::info!("Successfully ran migrations: {:?}", versions);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Failed to run database migrations: {:?}", e);
            Err(anyhow::anyhow!("Migration diesel error: {:?}", e))
        }
    })
    .await
    .map_err(|e| anyhow::anyhow!("Migration interact task failed: {}", e))??;
    Ok(())
}
