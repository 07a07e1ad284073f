use anyhow::{ensure, Result};
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};

use crate::{config::AppConfig, storage::S3Storage};

const FALLBACK_REGION: &str = "us-east-1";
const CREDENTIALS_SOURCE: &str = "panel-invoice-env";

/// Invoice storage backed by the configured bucket. Path-style addressing
/// keeps MinIO and other S3-compatible endpoints working.
pub async fn invoice_storage(config: &AppConfig) -> Result<S3Storage> {
    let bucket = invoice_bucket(&config.s3_bucket)?;
    let client = invoice_client(config).await;
    tracing::info!(
        bucket = %bucket,
        endpoint = config.aws_endpoint_url.as_deref().unwrap_or("aws"),
        static_credentials = env_credentials(config).is_some(),
        "invoice storage ready"
    );
    Ok(S3Storage::new(client, bucket))
}

fn invoice_bucket(raw: &str) -> Result<String> {
    let bucket = raw.trim();
    ensure!(!bucket.is_empty(), "S3_BUCKET must not be blank");
    Ok(bucket.to_string())
}

fn env_credentials(config: &AppConfig) -> Option<Credentials> {
    static_credentials(
        config.aws_access_key_id.as_deref(),
        config.aws_secret_access_key.as_deref(),
    )
}

/// Keys from the environment are only used as a pair.
fn static_credentials(access_key: Option<&str>, secret_key: Option<&str>) -> Option<Credentials> {
    let access_key = access_key?.trim();
    let secret_key = secret_key?.trim();
    if access_key.is_empty() || secret_key.is_empty() {
        return None;
    }
    Some(Credentials::new(
        access_key,
        secret_key,
        None,
        None,
        CREDENTIALS_SOURCE,
    ))
}

async fn invoice_client(config: &AppConfig) -> S3Client {
    let region_provider = RegionProviderChain::first_try(Some(Region::new(config.aws_region.clone())))
        .or_default_provider()
        .or_else(FALLBACK_REGION);

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    if let Some(credentials) = env_credentials(config) {
        loader = loader.credentials_provider(credentials);
    }

    let shared = loader.load().await;
    S3Client::from_conf(S3ConfigBuilder::from(&shared).force_path_style(true).build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_bucket_is_rejected() {
        assert!(invoice_bucket("  ").is_err());
        assert_eq!(invoice_bucket(" facturas ").unwrap(), "facturas");
    }

    #[test]
    fn credentials_need_both_keys() {
        assert!(static_credentials(Some("minio"), None).is_none());
        assert!(static_credentials(Some("minio"), Some("   ")).is_none());

        let credentials = static_credentials(Some("minio"), Some("minio-secret")).unwrap();
        assert_eq!(credentials.access_key_id(), "minio");
        assert_eq!(credentials.secret_access_key(), "minio-secret");
    }
}
