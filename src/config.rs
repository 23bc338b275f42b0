use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertificateWording {
    Standard,
    Neutral,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub cors_allowed_origin: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub s3_bucket: String,
    pub institution_name: String,
    pub program_years: i32,
    pub certificate_wording: CertificateWording,
    pub progress_interval_ms: u64,
    pub batch_retention_minutes: u64,
    pub archive_url_expiry_seconds: u64,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{name} has an invalid value `{value}`")),
        Err(_) => Ok(default),
    }
}

fn parse_wording(value: &str) -> Result<CertificateWording> {
    match value.trim().to_ascii_lowercase().as_str() {
        "standard" => Ok(CertificateWording::Standard),
        "neutral" => Ok(CertificateWording::Neutral),
        other => bail!("CERTIFICATE_WORDING must be `standard` or `neutral`, got `{other}`"),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "marksheet".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "marksheet-clients".to_string());
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let aws_endpoint_url = env::var("AWS_ENDPOINT_URL").ok();
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let s3_bucket = env::var("S3_BUCKET").context("S3_BUCKET must be set")?;
        let institution_name = env::var("INSTITUTION_NAME")
            .unwrap_or_else(|_| "Institute of Technology".to_string());
        let program_years = parse_or("PROGRAM_YEARS", 4)?;
        let certificate_wording = match env::var("CERTIFICATE_WORDING") {
            Ok(value) => parse_wording(&value)?,
            Err(_) => CertificateWording::Standard,
        };
        let progress_interval_ms = parse_or("PROGRESS_INTERVAL_MS", 500)?;
        let batch_retention_minutes = parse_or("BATCH_RETENTION_MINUTES", 60)?;
        let archive_url_expiry_seconds = parse_or("ARCHIVE_URL_EXPIRY_SECONDS", 300)?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            cors_allowed_origin,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            s3_bucket,
            institution_name,
            program_years,
            certificate_wording,
            progress_interval_ms,
            batch_retention_minutes,
            archive_url_expiry_seconds,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(50))
    }

    pub fn batch_retention(&self) -> Duration {
        Duration::from_secs(self.batch_retention_minutes * 60)
    }

    pub fn archive_url_expiry(&self) -> Duration {
        Duration::from_secs(self.archive_url_expiry_seconds)
    }
}

fn redact_database_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return "***".to_string();
    };
    if parsed.password().is_none() {
        return parsed.to_string();
    }
    match parsed.set_password(Some("*****")) {
        Ok(()) => parsed.to_string(),
        Err(()) => "***".to_string(),
    }
}
