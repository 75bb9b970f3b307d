mod s3;

#[cfg(test)]
pub mod fake;

pub use s3::S3ObjectStore;

#[cfg(test)]
pub use fake::InMemoryObjectStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Error taxonomy surfaced by an object-store adapter, independent of the
/// backing provider. `Throttled`/`Transient` are retried by the adapter
/// itself (see `resilience::presets::object_storage_config`); callers only
/// ever see the post-retry outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("object not found")]
    NotFound,
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("throttled: {0}")]
    Throttled(String),
    #[error("transient error: {0}")]
    Transient(String),
    #[error("permanent failure: {0}")]
    PermanentFailure(String),
}

impl StorageError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::Throttled(_) | StorageError::Transient(_))
    }
}

#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: i64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

#[derive(Debug, Clone)]
pub struct IncompleteUpload {
    pub key: String,
    pub upload_id: String,
    pub initiated_at: DateTime<Utc>,
}

/// The object-store seam the session manager, lifecycle controller, and
/// abandoned-upload collector all program against. `S3ObjectStore` is the
/// only implementation; the trait exists so those callers can be tested
/// against an in-memory fake.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn mint_single_put(
        &self,
        key: &str,
        content_type: &str,
        ttl_secs: u64,
        checksum_sha256: Option<&str>,
    ) -> Result<String, StorageError>;

    async fn initiate_multipart(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn mint_part_put(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        ttl_secs: u64,
    ) -> Result<String, StorageError>;

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError>;

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StorageError>;

    async fn head(&self, key: &str) -> Result<ObjectMeta, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn range_get(
        &self,
        key: &str,
        start: u64,
        end_inclusive: u64,
    ) -> Result<Vec<u8>, StorageError>;

    async fn list_incomplete_multipart(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<IncompleteUpload>, StorageError>;
}
