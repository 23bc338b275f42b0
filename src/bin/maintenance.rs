use std::env;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;

use marksheet::{
    config::AppConfig,
    db::{self, PgPool},
    models::ExportArchive,
    s3,
    schema::export_archives,
    storage::{ObjectStorage, S3Storage},
};

const USAGE: &str = "Usage: maintenance migrate | maintenance purge-exports <days>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("migrate") => migrate().await?,
        Some("purge-exports") => {
            let days = args
                .next()
                .context(USAGE)?
                .parse::<i64>()
                .context("days must be a whole number")?;
            purge_exports(days).await?
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect(config: &AppConfig) -> Result<PgPool> {
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        "loaded marksheet configuration"
    );
    db::init_pool(config)
}

async fn migrate() -> Result<()> {
    let config = AppConfig::from_env()?;
    let pool = connect(&config)?;
    let applied = db::run_blocking(&pool, marksheet::run_migrations).await?;
    println!("Applied {applied} migrations.");
    Ok(())
}

async fn purge_exports(days: i64) -> Result<()> {
    if days < 0 {
        bail!("days must not be negative");
    }
    let config = AppConfig::from_env()?;
    let pool = connect(&config)?;
    let s3_client = s3::build_client(&config).await?;
    let storage = S3Storage::new(s3_client, config.s3_bucket.clone());

    let mut conn = pool.get().context("failed to get database connection")?;
    let cutoff = Utc::now() - Duration::days(days);

    let archives: Vec<ExportArchive> = export_archives::table
        .filter(export_archives::created_at.lt(cutoff))
        .order(export_archives::created_at.asc())
        .load(&mut conn)
        .context("failed to load export archives")?;

    if archives.is_empty() {
        println!("No export archives older than {days} days.");
        return Ok(());
    }

    println!("Purging {} export archives…", archives.len());

    let mut purged = Vec::with_capacity(archives.len());
    for archive in &archives {
        match storage.delete_object(&archive.storage_key).await {
            Ok(()) => purged.push(archive.id),
            Err(err) => {
                tracing::warn!(
                    archive_id = %archive.id,
                    storage_key = %archive.storage_key,
                    error = %err,
                    "failed to delete archive from storage; keeping its record"
                );
            }
        }
    }

    let removed = diesel::delete(export_archives::table.filter(export_archives::id.eq_any(&purged)))
        .execute(&mut conn)
        .context("failed to remove export archive records")?;

    println!("Removed {removed} export archive records.");
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
