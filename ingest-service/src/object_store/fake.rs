//! In-memory `ObjectStore` fake, used by session/lifecycle/collector unit
//! tests so they exercise real control flow without live S3.

use super::{CompletedPart, IncompleteUpload, ObjectMeta, ObjectStore, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

struct MultipartUpload {
    key: String,
    parts: HashMap<u32, CompletedPart>,
    initiated_at: chrono::DateTime<Utc>,
    completed: bool,
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    multipart: Mutex<HashMap<String, MultipartUpload>>,
    next_upload_id: Mutex<u64>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: seed bytes at `key` as if a client had PUT them directly.
    pub fn put_object(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }

    fn next_id(&self) -> String {
        let mut guard = self.next_upload_id.lock().unwrap();
        *guard += 1;
        format!("fake-upload-{}", *guard)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn mint_single_put(
        &self,
        key: &str,
        _content_type: &str,
        _ttl_secs: u64,
        _checksum_sha256: Option<&str>,
    ) -> Result<String, StorageError> {
        Ok(format!("https://fake-store.test/{key}"))
    }

    async fn initiate_multipart(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let upload_id = self.next_id();
        self.multipart.lock().unwrap().insert(
            upload_id.clone(),
            MultipartUpload {
                key: key.to_string(),
                parts: HashMap::new(),
                initiated_at: Utc::now(),
                completed: false,
            },
        );
        Ok(upload_id)
    }

    async fn mint_part_put(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        _ttl_secs: u64,
    ) -> Result<String, StorageError> {
        if !self.multipart.lock().unwrap().contains_key(upload_id) {
            return Err(StorageError::NotFound);
        }
        Ok(format!("https://fake-store.test/{key}?partNumber={part_number}&uploadId={upload_id}"))
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let mut multipart = self.multipart.lock().unwrap();
        let upload = multipart
            .get_mut(upload_id)
            .ok_or(StorageError::NotFound)?;

        let mut sorted = parts;
        sorted.sort_by_key(|p| p.part_number);
        for (expected, part) in (1u32..).zip(sorted.iter()) {
            if part.part_number != expected {
                return Err(StorageError::PreconditionFailed(format!(
                    "parts must be contiguous starting at 1, gap at {expected}"
                )));
            }
        }

        for part in sorted {
            upload.parts.insert(part.part_number, part);
        }
        upload.completed = true;

        let size: usize = upload.parts.len() * 1024;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), vec![0u8; size]);

        Ok(())
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> Result<(), StorageError> {
        self.multipart.lock().unwrap().remove(upload_id);
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StorageError> {
        let objects = self.objects.lock().unwrap();
        let bytes = objects.get(key).ok_or(StorageError::NotFound)?;
        Ok(ObjectMeta {
            size: bytes.len() as i64,
            etag: format!("\"{key}\""),
            last_modified: Utc::now(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn range_get(
        &self,
        key: &str,
        start: u64,
        end_inclusive: u64,
    ) -> Result<Vec<u8>, StorageError> {
        let objects = self.objects.lock().unwrap();
        let bytes = objects.get(key).ok_or(StorageError::NotFound)?;
        let start = start as usize;
        let end = (end_inclusive as usize + 1).min(bytes.len());
        Ok(bytes[start.min(end)..end].to_vec())
    }

    async fn list_incomplete_multipart(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<IncompleteUpload>, StorageError> {
        let multipart = self.multipart.lock().unwrap();
        Ok(multipart
            .iter()
            .filter(|(_, u)| !u.completed)
            .filter(|(_, u)| prefix.map(|p| u.key.starts_with(p)).unwrap_or(true))
            .map(|(upload_id, u)| IncompleteUpload {
                key: u.key.clone(),
                upload_id: upload_id.clone(),
                initiated_at: u.initiated_at,
            })
            .collect())
    }
}
