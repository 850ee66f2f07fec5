// src/utils/aws.rs

//! Shared AWS SDK setup.

use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Load SDK configuration for `region` with the default credential chain
/// (environment, profile, instance role).
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// Render an SDK error with its full source chain.
pub fn error_message<E: std::error::Error>(err: &E) -> String {
    aws_sdk_s3::error::DisplayErrorContext(err).to_string()
}

/// Split `s3://bucket/key` into bucket and key.
pub fn parse_s3_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("s3://")?;
    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    (!bucket.is_empty()).then_some((bucket, key))
}
