//! Object-storage access for the staging sources.
//!
//! The warehouse reads S3 itself during COPY; this crate only checks that
//! the sources are reachable first, so an unreadable path fails fast with
//! the path in the error instead of deep inside a load.

pub mod s3;

use async_trait::async_trait;

use crate::error::Result;

pub use s3::S3Preflight;

/// Verifies staging sources before they are bulk-loaded.
#[async_trait]
pub trait SourceProbe: Send + Sync {
    /// Succeed if at least one object exists under the `s3://` prefix.
    async fn verify_prefix(&self, uri: &str) -> Result<()>;

    /// Succeed if the single `s3://` object exists.
    async fn verify_object(&self, uri: &str) -> Result<()>;
}
