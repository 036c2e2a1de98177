use recipe_portal::{
    AppState,
    cache::{CacheState, MemoryReadCache},
    config::{AppConfig, Env},
    create_router,
    credentials::Credentials,
    repository::{PostgresRepository, RepositoryState},
    storage::{AssetState, AssetStore, S3AssetStore},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: loads configuration, sets up logging, connects the record store,
/// asset store, and read cache, then serves HTTP until killed.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise fall back to verbose defaults for this crate.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "recipe_portal=debug,tower_http=info".into());

    // 3. Pretty logs locally, JSON in production.
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

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Record Store (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Asset Store (S3/MinIO)
    let s3_store = S3AssetStore::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.s3_bucket,
        &config.s3_public_url,
    )
    .await;

    // LOCAL-ONLY: create the MinIO bucket for the dockerized setup.
    if config.env == Env::Local {
        s3_store.ensure_bucket_exists().await;
    }

    let assets = Arc::new(s3_store) as AssetState;

    // 6. Read Cache & Credentials
    let cache = Arc::new(MemoryReadCache::new()) as CacheState;
    let credentials = Credentials::from_config(&config);

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .expect("FATAL: Cannot create UPLOAD_DIR.");

    let port = config.port;

    // 7. Unified State Assembly
    let app_state = AppState {
        repo,
        assets,
        cache,
        credentials,
        config,
    };

    // 8. Router and Server Startup
    let app = create_router(app_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{port}/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
