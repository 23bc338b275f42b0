use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};
use tracing::debug;

use crate::config::AppConfig;

const FALLBACK_REGION: &str = "us-east-1";

/// Static keys are only used when both halves are configured; otherwise the default
/// provider chain applies.
fn static_credentials(config: &AppConfig) -> Option<Credentials> {
    match (&config.aws_access_key_id, &config.aws_secret_access_key) {
        (Some(access_key), Some(secret_key)) => Some(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "marksheet-static",
        )),
        _ => None,
    }
}

/// Client for the archive bucket. A custom endpoint (MinIO and similar) switches to
/// path-style addressing.
pub async fn build_client(config: &AppConfig) -> Result<S3Client> {
    let region_provider = RegionProviderChain::first_try(Some(Region::new(config.aws_region.clone())))
        .or_default_provider()
        .or_else(FALLBACK_REGION);

    #[allow(deprecated)]
    let mut loader = aws_config::from_env().region(region_provider);
    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    if let Some(credentials) = static_credentials(config) {
        loader = loader.credentials_provider(credentials);
    }

    let base_config = loader.load().await;
    let s3_config = S3ConfigBuilder::from(&base_config)
        .force_path_style(config.aws_endpoint_url.is_some())
        .build();
    debug!(
        bucket = %config.s3_bucket,
        custom_endpoint = config.aws_endpoint_url.is_some(),
        "object storage client configured"
    );

    Ok(S3Client::from_conf(s3_config))
}
