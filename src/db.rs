use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

use crate::config::AppConfig;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 4;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_pool(config: &AppConfig) -> Result<PgPool> {
    init_pool_with_size(&config.database_url, config.database_max_pool_size)
}

pub fn init_pool_with_size(database_url: &str, max_size: u32) -> Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size.max(1))
        .connection_timeout(CONNECTION_TIMEOUT)
        .build(manager)
        .context("failed to build database pool")
}

/// Runs `f` with a pooled connection on the blocking thread pool.
pub async fn run_blocking<F, T>(pool: &PgPool, f: F) -> Result<T>
where
    F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("database pool error: {err}"))?;
        f(&mut conn)
    })
    .await
    .context("database task panicked")?
}
