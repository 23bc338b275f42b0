use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use marksheet::auth::jwt::JwtService;
use marksheet::batch::registry::BatchRegistry;
use marksheet::config::AppConfig;
use marksheet::db;
use marksheet::render::PdfiumRenderer;
use marksheet::routes;
use marksheet::s3::build_client;
use marksheet::state::AppState;
use marksheet::storage::S3Storage;
use marksheet::store::postgres::PgRecordStore;

const EVICTION_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        s3_bucket = %config.s3_bucket,
        institution = %config.institution_name,
        "loaded marksheet configuration"
    );
    let pool = db::init_pool(&config)?;
    let applied = db::run_blocking(&pool, marksheet::run_migrations).await?;
    tracing::info!(applied, "database migrations applied");

    let s3_client = build_client(&config).await?;
    let storage = Arc::new(S3Storage::new(s3_client, config.s3_bucket.clone()));
    let jwt = JwtService::from_config(&config)?;
    let store = Arc::new(PgRecordStore::new(pool));
    let renderer = Arc::new(PdfiumRenderer::new());

    let state = AppState::new(store, config, storage, jwt, renderer);
    BatchRegistry::spawn_eviction(state.registry.clone(), EVICTION_PERIOD);

    let listen_addr: SocketAddr =
        format!("{}:{}", state.config.server_host, state.config.server_port).parse()?;
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("server received shutdown signal");
        })
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
