//! Upload Session Manager — §4.3: selection, URL refresh, the part
//! checksum registry, completion, and abort.

use crate::config::UploadConfig;
use crate::db::{upload_session_repo, video_repo};
use crate::error::AppError;
use crate::lifecycle::LifecycleController;
use crate::models::{CompletedPartEntry, PartChecksumEntry, PartUrl};
use crate::object_store::{CompletedPart, ObjectStore};
use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;
use video_core::{UploadSession, UploadSessionStatus, UploadedPart, Video, VideoStatus};

pub struct SessionManager {
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
    lifecycle: Arc<LifecycleController>,
    config: UploadConfig,
}

pub enum StartedSession {
    Single {
        upload_id: Uuid,
        upload_url: String,
        expires_at: chrono::DateTime<Utc>,
    },
    Multipart {
        upload_id: Uuid,
        multipart_upload_id: String,
        part_urls: Vec<PartUrl>,
        part_size: i64,
        num_parts: u32,
        expires_at: chrono::DateTime<Utc>,
    },
}

fn source_key(video_id: Uuid, filename: &str) -> String {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    format!("sources/{video_id}/original.{ext}")
}

impl SessionManager {
    pub fn new(
        pool: PgPool,
        store: Arc<dyn ObjectStore>,
        lifecycle: Arc<LifecycleController>,
        config: UploadConfig,
    ) -> Self {
        SessionManager {
            pool,
            store,
            lifecycle,
            config,
        }
    }

    /// §4.3.1 — choose single-PUT vs multipart based on declared size and
    /// mint the session.
    pub async fn start_upload(
        &self,
        title: &str,
        filename: &str,
        content_type: &str,
        size: i64,
        checksum: Option<&str>,
    ) -> Result<(Uuid, StartedSession), AppError> {
        if size <= 0 {
            return Err(AppError::Validation(format!("size must be positive, got {size}")));
        }
        if size > self.config.max_file_size {
            return Err(AppError::PayloadTooLarge {
                max_bytes: self.config.max_file_size,
                received_bytes: size,
            });
        }

        let video_id = Uuid::new_v4();
        let key = source_key(video_id, filename);
        let expires_at = Utc::now() + ChronoDuration::seconds(self.config.presign_ttl_secs);

        if size <= self.config.multipart_threshold {
            let upload_url = self
                .store
                .mint_single_put(
                    &key,
                    content_type,
                    self.config.presign_ttl_secs as u64,
                    checksum,
                )
                .await?;

            video_repo::create_video(&self.pool, video_id, title, &key, size, checksum).await?;

            Ok((
                video_id,
                StartedSession::Single {
                    upload_id: video_id,
                    upload_url,
                    expires_at,
                },
            ))
        } else {
            let part_size = self.config.multipart_chunk_bytes;
            let num_parts = ((size + part_size - 1) / part_size) as u32;
            if num_parts > self.config.max_multipart_parts {
                return Err(AppError::PartsLimit);
            }

            let multipart_upload_id = self.store.initiate_multipart(&key, content_type).await?;

            let mut part_urls = Vec::with_capacity(num_parts as usize);
            for part_number in 1..=num_parts {
                let url = self
                    .store
                    .mint_part_put(
                        &key,
                        &multipart_upload_id,
                        part_number,
                        self.config.presign_ttl_secs as u64,
                    )
                    .await?;
                part_urls.push(PartUrl { part_number, url });
            }

            video_repo::create_video(&self.pool, video_id, title, &key, size, checksum).await?;
            let session_id = Uuid::new_v4();
            upload_session_repo::create_session(
                &self.pool,
                session_id,
                video_id,
                Some(&multipart_upload_id),
                num_parts,
                expires_at,
            )
            .await?;

            Ok((
                video_id,
                StartedSession::Multipart {
                    upload_id: session_id,
                    multipart_upload_id,
                    part_urls,
                    part_size,
                    num_parts,
                    expires_at,
                },
            ))
        }
    }

    /// §4.3.2 — re-mint every part URL for a still-active session. Rejected
    /// unless the owning video is still `pending_upload`.
    pub async fn refresh_urls(
        &self,
        session_id: Uuid,
    ) -> Result<(Vec<PartUrl>, i64, chrono::DateTime<Utc>), AppError> {
        let session = upload_session_repo::get_session(&self.pool, session_id).await?;
        let video = video_repo::get_video(&self.pool, session.video_id).await?;

        if video.status != VideoStatus::PendingUpload {
            return Err(AppError::StateConflict {
                message: "refresh only valid while pending_upload".to_string(),
                current_status: Some(video.status.as_str().to_string()),
            });
        }
        let multipart_upload_id = session.multipart_upload_id.as_deref().ok_or_else(|| {
            AppError::Validation("session has no multipart upload to refresh".to_string())
        })?;

        let expires_at = Utc::now() + ChronoDuration::seconds(self.config.presign_ttl_secs);
        let mut part_urls = Vec::with_capacity(session.total_parts as usize);
        for part_number in 1..=session.total_parts {
            let url = self
                .store
                .mint_part_put(
                    &video.source_url,
                    multipart_upload_id,
                    part_number,
                    self.config.presign_ttl_secs as u64,
                )
                .await?;
            part_urls.push(PartUrl { part_number, url });
        }

        upload_session_repo::refresh_expiry(&self.pool, session_id, expires_at).await?;

        Ok((part_urls, self.config.multipart_chunk_bytes, expires_at))
    }

    /// §4.3.3 — register per-part checksums ahead of completion.
    pub async fn register_checksums(
        &self,
        session_id: Uuid,
        parts: Vec<PartChecksumEntry>,
    ) -> Result<usize, AppError> {
        let uploaded: Vec<UploadedPart> = parts
            .iter()
            .map(|p| UploadedPart {
                part_number: p.part_number,
                etag: None,
                checksum: Some(p.checksum.clone()),
                size: Some(p.size),
            })
            .collect();

        let accepted = uploaded.len();
        upload_session_repo::merge_uploaded_parts(&self.pool, session_id, &uploaded).await?;
        Ok(accepted)
    }

    /// §4.3.4 — finalize a multipart upload, or confirm a single-PUT one.
    pub async fn complete(
        &self,
        session_id: Uuid,
        multipart_upload_id_claim: Option<&str>,
        parts: Vec<CompletedPartEntry>,
    ) -> Result<Uuid, AppError> {
        // Single-PUT uploads materialize `session_id == video_id` directly
        // (see `start_upload`); try that path before assuming a session row.
        match upload_session_repo::get_session(&self.pool, session_id).await {
            Ok(session) => self.complete_multipart(session, multipart_upload_id_claim, parts).await,
            Err(AppError::NotFound(_)) => self.complete_single(session_id).await,
            Err(e) => Err(e),
        }
    }

    async fn complete_single(&self, video_id: Uuid) -> Result<Uuid, AppError> {
        let video = video_repo::get_video(&self.pool, video_id).await?;
        if video.status != VideoStatus::PendingUpload {
            return Err(AppError::StateConflict {
                message: "video is not pending upload".to_string(),
                current_status: Some(video.status.as_str().to_string()),
            });
        }

        let meta = self.store.head(&video.source_url).await?;
        if meta.size != video.source_size {
            self.lifecycle
                .fail(video_id, "uploaded object size does not match declared size")
                .await?;
            return Err(AppError::Validation(
                "uploaded object size mismatch".to_string(),
            ));
        }

        if let Some(checksum) = &video.source_checksum {
            if let Err(e) = self.verify_whole_file_checksum(&video, checksum).await {
                self.lifecycle.fail(video_id, &e.to_string()).await?;
                return Err(e);
            }
        }

        self.lifecycle
            .advance_to_processing(video_id, video_id, &video.source_url)
            .await?;
        Ok(video_id)
    }

    async fn complete_multipart(
        &self,
        session: UploadSession,
        multipart_upload_id_claim: Option<&str>,
        parts: Vec<CompletedPartEntry>,
    ) -> Result<Uuid, AppError> {
        let video_id = session.video_id;
        let video = video_repo::get_video(&self.pool, video_id).await?;

        if video.status != VideoStatus::PendingUpload {
            return Err(AppError::StateConflict {
                message: "video is not pending upload".to_string(),
                current_status: Some(video.status.as_str().to_string()),
            });
        }
        if session.status != UploadSessionStatus::Active {
            return Err(AppError::StateConflict {
                message: "upload session is not active".to_string(),
                current_status: Some(video.status.as_str().to_string()),
            });
        }

        let multipart_upload_id = session.multipart_upload_id.clone().ok_or_else(|| {
            AppError::Validation("session has no multipart upload".to_string())
        })?;
        if let Some(claim) = multipart_upload_id_claim {
            if claim != multipart_upload_id {
                return Err(AppError::Validation(
                    "multipartUploadId does not match session".to_string(),
                ));
            }
        }

        if parts.is_empty() || parts.len() as u32 != session.total_parts {
            return Err(AppError::Validation(format!(
                "expected {} parts, got {}",
                session.total_parts,
                parts.len()
            )));
        }
        let mut sorted = parts.clone();
        sorted.sort_by_key(|p| p.part_number);
        for (expected, part) in (1u32..).zip(sorted.iter()) {
            if part.part_number != expected || part.etag.is_empty() {
                return Err(AppError::Validation(format!(
                    "parts must be contiguous 1..N with non-empty ETags, problem at {expected}"
                )));
            }
        }

        let completed = sorted
            .iter()
            .map(|p| CompletedPart {
                part_number: p.part_number,
                etag: p.etag.clone(),
            })
            .collect();

        if let Err(e) = self
            .store
            .complete_multipart(&video.source_url, &multipart_upload_id, completed)
            .await
        {
            self.lifecycle.fail(video_id, &e.to_string()).await?;
            return Err(e.into());
        }

        if let Err(e) = self.verify_registered_part_checksums(&video, &session).await {
            self.lifecycle.fail(video_id, &e.to_string()).await?;
            return Err(e);
        }

        upload_session_repo::try_mark_completed(&self.pool, session.id).await?;
        self.lifecycle
            .advance_to_processing(video_id, session.id, &video.source_url)
            .await?;
        Ok(video_id)
    }

    /// §4.3.5 — client-initiated abort from `pending_upload`.
    pub async fn abort(&self, session_id: Uuid) -> Result<(), AppError> {
        let video_id = match upload_session_repo::get_session(&self.pool, session_id).await {
            Ok(session) => {
                if let Some(upload_id) = &session.multipart_upload_id {
                    let video = video_repo::get_video(&self.pool, session.video_id).await?;
                    self.store.abort_multipart(&video.source_url, upload_id).await?;
                }
                upload_session_repo::mark_failed(&self.pool, session.id).await?;
                session.video_id
            }
            Err(AppError::NotFound(_)) => session_id,
            Err(e) => return Err(e),
        };

        let video = video_repo::get_video(&self.pool, video_id).await?;
        if !matches!(
            video.status,
            VideoStatus::PendingUpload | VideoStatus::Uploading
        ) {
            return Err(AppError::StateConflict {
                message: "abort only valid before completion".to_string(),
                current_status: Some(video.status.as_str().to_string()),
            });
        }

        // A single-PUT upload may already have finalized its object before
        // the user cancels; best-effort delete it too.
        let _ = self.store.delete(&video.source_url).await;

        self.lifecycle.cancel(video_id).await?;
        Ok(())
    }

    async fn verify_whole_file_checksum(
        &self,
        video: &Video,
        expected_b64: &str,
    ) -> Result<(), AppError> {
        const CHUNK: u64 = 8 * 1024 * 1024;
        let mut hasher = Sha256::new();
        let mut offset = 0u64;
        let size = video.source_size as u64;
        while offset < size {
            let end = (offset + CHUNK - 1).min(size.saturating_sub(1));
            let bytes = self.store.range_get(&video.source_url, offset, end).await?;
            hasher.update(&bytes);
            offset = end + 1;
        }
        let actual = {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
        };
        if actual != expected_b64 {
            return Err(AppError::ChecksumMismatch {
                part_number: None,
                expected_prefix: prefix(expected_b64),
                actual_prefix: prefix(&actual),
            });
        }
        Ok(())
    }

    /// Verifies each registered part checksum against the consolidated
    /// object via ranged GET, bounded by `VALIDATION_PARALLELISM` concurrent
    /// reads, inside `MAX_VALIDATION_WALL_SECS`.
    async fn verify_registered_part_checksums(
        &self,
        video: &Video,
        session: &UploadSession,
    ) -> Result<(), AppError> {
        let registered: Vec<&UploadedPart> = session
            .uploaded_parts
            .iter()
            .filter(|p| p.checksum.is_some())
            .collect();
        if registered.is_empty() {
            return Ok(());
        }

        let part_size = session_part_size(video, session);
        let wall = tokio::time::Duration::from_secs(video_core::MAX_VALIDATION_WALL_SECS as u64);

        tokio::time::timeout(wall, async {
            let mut futs = FuturesUnordered::new();
            let mut iter = registered.into_iter();
            for part in iter.by_ref().take(self.config.validation_parallelism) {
                futs.push(self.verify_one_part(video, part, part_size));
            }
            let mut result = Ok(());
            while let Some(outcome) = futs.next().await {
                if outcome.is_err() {
                    result = outcome;
                    break;
                }
                if let Some(part) = iter.next() {
                    futs.push(self.verify_one_part(video, part, part_size));
                }
            }
            result
        })
        .await
        .map_err(|_| {
            AppError::UploadExpired("checksum validation exceeded MAX_VALIDATION_WALL".to_string())
        })?
    }

    async fn verify_one_part(
        &self,
        video: &Video,
        part: &UploadedPart,
        part_size: i64,
    ) -> Result<(), AppError> {
        let expected = part.checksum.as_deref().unwrap_or_default();
        let start = (part.part_number as i64 - 1) * part_size;
        let end = (start + part_size - 1).min(video.source_size - 1);

        let bytes = self
            .store
            .range_get(&video.source_url, start as u64, end as u64)
            .await?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let actual = {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
        };

        if actual != expected {
            return Err(AppError::ChecksumMismatch {
                part_number: Some(part.part_number),
                expected_prefix: prefix(expected),
                actual_prefix: prefix(&actual),
            });
        }
        Ok(())
    }
}

fn session_part_size(video: &Video, session: &UploadSession) -> i64 {
    if session.total_parts == 0 {
        video.source_size
    } else {
        (video.source_size + session.total_parts as i64 - 1) / session.total_parts as i64
    }
}

fn prefix(s: &str) -> String {
    s.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::InMemoryObjectStore;
    use base64::Engine;
    use transactional_outbox::SqlxOutboxRepository;
    use video_core::UploadedPart;

    fn lazy_pool() -> PgPool {
        PgPool::connect_lazy("postgresql://localhost/ingest_service_test")
            .expect("lazy pool never actually connects")
    }

    fn test_config() -> UploadConfig {
        UploadConfig {
            max_file_size: 100 * 1024 * 1024 * 1024,
            multipart_threshold: 100 * 1024 * 1024,
            multipart_chunk_bytes: 8 * 1024 * 1024,
            max_multipart_parts: 10_000,
            presign_ttl_secs: 900,
            abandoned_ttl_hours: 24,
            collector_cadence_secs: 300,
            validation_parallelism: 4,
            queue_attempts: 5,
            queue_backoff_base_secs: 2,
            subscriber_queue_depth: 256,
        }
    }

    fn test_manager(store: Arc<dyn ObjectStore>) -> SessionManager {
        let pool = lazy_pool();
        let outbox: Arc<dyn transactional_outbox::OutboxRepository> =
            Arc::new(SqlxOutboxRepository::new(pool.clone()));
        let cache: Arc<dyn crate::cache::VideoCache> = Arc::new(crate::cache::NoopCache);
        let lifecycle = Arc::new(LifecycleController::new(pool.clone(), outbox, cache));
        SessionManager::new(pool, store, lifecycle, test_config())
    }

    fn sha256_b64(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
    }

    fn stub_video(source_url: &str, source_size: i64, checksum: Option<&str>) -> Video {
        Video {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            status: VideoStatus::PendingUpload,
            source_url: source_url.to_string(),
            source_size,
            source_checksum: checksum.map(|s| s.to_string()),
            manifest_url: None,
            duration_s: None,
            width: None,
            height: None,
            codec: None,
            bitrate: None,
            fps: None,
            thumbnails: None,
            upload_session_id: None,
            processing_attempts: 0,
            last_error: None,
            is_public: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            processed_at: None,
            cancelled_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn source_key_uses_extension_or_falls_back_to_bin() {
        let id = Uuid::nil();
        assert_eq!(source_key(id, "movie.mp4"), format!("sources/{id}/original.mp4"));
        assert_eq!(source_key(id, "no_extension"), format!("sources/{id}/original.bin"));
    }

    #[test]
    fn session_part_size_divides_evenly_and_handles_zero_parts() {
        let video = stub_video("k", 1000, None);
        let mut session = UploadSession {
            id: Uuid::new_v4(),
            video_id: video.id,
            multipart_upload_id: Some("mp".to_string()),
            total_parts: 4,
            uploaded_parts: vec![],
            status: UploadSessionStatus::Active,
            expires_at: Utc::now(),
            created_at: Utc::now(),
            completed_at: None,
        };
        assert_eq!(session_part_size(&video, &session), 250);

        session.total_parts = 0;
        assert_eq!(session_part_size(&video, &session), 1000);
    }

    #[test]
    fn prefix_truncates_to_twelve_chars_and_passes_through_shorter_strings() {
        assert_eq!(prefix("abcdefghijklmnop"), "abcdefghijkl");
        assert_eq!(prefix("short"), "short");
    }

    #[tokio::test]
    async fn verify_whole_file_checksum_accepts_matching_digest() {
        let store = Arc::new(InMemoryObjectStore::new());
        let bytes = vec![7u8; 20 * 1024 * 1024 + 17];
        store.put_object("sources/v/original.bin", bytes.clone());
        let manager = test_manager(store.clone());
        let video = stub_video("sources/v/original.bin", bytes.len() as i64, None);

        let expected = sha256_b64(&bytes);
        manager
            .verify_whole_file_checksum(&video, &expected)
            .await
            .expect("checksum should match across chunk boundary");
    }

    #[tokio::test]
    async fn verify_whole_file_checksum_rejects_mismatch() {
        let store = Arc::new(InMemoryObjectStore::new());
        let bytes = vec![1u8; 1024];
        store.put_object("sources/v/original.bin", bytes.clone());
        let manager = test_manager(store.clone());
        let video = stub_video("sources/v/original.bin", bytes.len() as i64, None);

        let err = manager
            .verify_whole_file_checksum(&video, "not-the-real-digest")
            .await
            .expect_err("digest must not match arbitrary garbage");
        assert!(matches!(err, AppError::ChecksumMismatch { part_number: None, .. }));
    }

    #[tokio::test]
    async fn verify_one_part_checks_the_correct_byte_range() {
        let store = Arc::new(InMemoryObjectStore::new());
        let part_size = 10i64;
        let total = 25i64;
        let bytes: Vec<u8> = (0..total as u32).map(|i| i as u8).collect();
        store.put_object("sources/v/original.bin", bytes.clone());
        let manager = test_manager(store.clone());
        let video = stub_video("sources/v/original.bin", total, None);

        let part2_bytes = &bytes[10..20];
        let part = UploadedPart {
            part_number: 2,
            etag: None,
            checksum: Some(sha256_b64(part2_bytes)),
            size: Some(part_size),
        };

        manager
            .verify_one_part(&video, &part, part_size)
            .await
            .expect("part 2's range should hash to its registered checksum");
    }

    #[tokio::test]
    async fn verify_one_part_rejects_wrong_checksum() {
        let store = Arc::new(InMemoryObjectStore::new());
        let bytes = vec![9u8; 30];
        store.put_object("sources/v/original.bin", bytes.clone());
        let manager = test_manager(store.clone());
        let video = stub_video("sources/v/original.bin", bytes.len() as i64, None);

        let part = UploadedPart {
            part_number: 1,
            etag: None,
            checksum: Some("bogus".to_string()),
            size: Some(10),
        };

        let err = manager
            .verify_one_part(&video, &part, 10)
            .await
            .expect_err("bogus checksum must be rejected");
        assert!(matches!(
            err,
            AppError::ChecksumMismatch {
                part_number: Some(1),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn verify_registered_part_checksums_is_noop_when_none_registered() {
        let store = Arc::new(InMemoryObjectStore::new());
        let manager = test_manager(store.clone());
        let video = stub_video("sources/v/original.bin", 0, None);
        let session = UploadSession {
            id: Uuid::new_v4(),
            video_id: video.id,
            multipart_upload_id: Some("mp".to_string()),
            total_parts: 3,
            uploaded_parts: vec![UploadedPart {
                part_number: 1,
                etag: Some("etag".to_string()),
                checksum: None,
                size: None,
            }],
            status: UploadSessionStatus::Active,
            expires_at: Utc::now(),
            created_at: Utc::now(),
            completed_at: None,
        };

        manager
            .verify_registered_part_checksums(&video, &session)
            .await
            .expect("no checksums registered means nothing to verify");
    }
}
