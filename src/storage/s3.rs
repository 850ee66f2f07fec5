//! AWS S3 source checks.

use async_trait::async_trait;
use aws_sdk_s3::Client;

use crate::error::{AppError, Result};
use crate::storage::SourceProbe;
use crate::utils::aws::{error_message, load_sdk_config, parse_s3_uri};

/// Checks staging sources with read-only S3 calls.
#[derive(Clone)]
pub struct S3Preflight {
    client: Client,
}

impl S3Preflight {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a preflight client for the configured region.
    pub async fn from_region(region: &str) -> Self {
        let config = load_sdk_config(region).await;
        Self::new(Client::new(&config))
    }

    fn split(uri: &str) -> Result<(&str, &str)> {
        parse_s3_uri(uri).ok_or_else(|| AppError::config(format!("not an s3:// URI: {uri}")))
    }
}

#[async_trait]
impl SourceProbe for S3Preflight {
    async fn verify_prefix(&self, uri: &str) -> Result<()> {
        let (bucket, prefix) = Self::split(uri)?;
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| AppError::connection(uri, error_message(&e)))?;

        if output.contents().is_empty() {
            return Err(AppError::connection(uri, "no objects under prefix"));
        }
        log::debug!("Source {} is readable", uri);
        Ok(())
    }

    async fn verify_object(&self, uri: &str) -> Result<()> {
        let (bucket, key) = Self::split(uri)?;
        self.client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::connection(uri, error_message(&e)))?;
        log::debug!("Object {} exists", uri);
        Ok(())
    }
}
