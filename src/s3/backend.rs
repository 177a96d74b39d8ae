//! The S3 calls the application consumes, behind a trait so operations can
//! run against any implementation.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::credentials::Credentials;
use crate::error::Result;
use crate::settings::AppSettings;

use super::{BucketSummary, ObjectPage, ObjectVersionRef, VersionPage, VersioningStatus};

#[async_trait]
pub trait S3Backend: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>>;

    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
        max_keys: Option<i32>,
    ) -> Result<ObjectPage>;

    /// Streams the object into `destination`, returning the bytes written.
    async fn download_object(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64>;

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Deletes up to 1000 keys (optionally pinned to versions) in one request.
    async fn delete_object_batch(&self, bucket: &str, entries: &[ObjectVersionRef]) -> Result<()>;

    async fn list_object_versions_page(
        &self,
        bucket: &str,
        key_marker: Option<String>,
        version_marker: Option<String>,
    ) -> Result<VersionPage>;

    /// Normalized region name of the bucket.
    async fn bucket_location(&self, bucket: &str) -> Result<String>;

    async fn bucket_versioning(&self, bucket: &str) -> Result<VersioningStatus>;

    async fn get_bucket_encryption(&self, bucket: &str) -> Result<()>;

    async fn get_bucket_acl(&self, bucket: &str) -> Result<()>;

    async fn cors_rule_count(&self, bucket: &str) -> Result<usize>;

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub credentials: Option<Credentials>,
    pub region: String,
    pub endpoint: Option<String>,
}

impl ClientConfig {
    pub fn from_settings(settings: &AppSettings, credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            region: settings.default_region.clone(),
            endpoint: settings.endpoint.clone(),
        }
    }

    pub fn with_region(&self, region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..self.clone()
        }
    }
}

/// Builds a fresh backend for each operation so credential changes never
/// leave a stale client behind.
pub trait ClientFactory: Send + Sync {
    fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn S3Backend>>;
}
