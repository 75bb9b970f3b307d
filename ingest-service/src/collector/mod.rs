//! Abandoned-Upload Collector — §4.4. Runs on a schedule (default 6h),
//! aborts multipart uploads the store has been tracking past the TTL, and
//! reconciles the owning session/video rows.

use crate::config::UploadConfig;
use crate::db::{upload_session_repo, video_repo};
use crate::object_store::ObjectStore;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

pub struct AbandonedUploadCollector {
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
    config: UploadConfig,
}

impl AbandonedUploadCollector {
    pub fn new(pool: PgPool, store: Arc<dyn ObjectStore>, config: UploadConfig) -> Self {
        AbandonedUploadCollector {
            pool,
            store,
            config,
        }
    }

    /// Spawns the periodic sweep as a background task. Returns the join
    /// handle so callers can hold it for graceful shutdown.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(self.config.collector_cadence_secs));
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    warn!(error = %e, "abandoned-upload sweep failed");
                }
            }
        })
    }

    pub async fn sweep(&self) -> Result<(), crate::error::AppError> {
        let cutoff = Utc::now() - ChronoDuration::hours(self.config.abandoned_ttl_hours);
        let incomplete = self.store.list_incomplete_multipart(Some("sources/")).await?;

        let mut swept = 0u32;
        for upload in incomplete {
            if upload.initiated_at > cutoff {
                continue;
            }

            match self.store.abort_multipart(&upload.key, &upload.upload_id).await {
                Ok(()) => {}
                Err(e) if matches!(e, crate::object_store::StorageError::NotFound) => {
                    // No longer listable: a client's concurrent completion
                    // already finalized it. Nothing left to reconcile.
                    continue;
                }
                Err(e) => {
                    warn!(key = %upload.key, error = %e, "failed to abort abandoned multipart upload, skipping");
                    continue;
                }
            }

            if let Some(video_id) = self.reconcile(&upload.key).await? {
                swept += 1;
                info!(video_id = %video_id, key = %upload.key, "reaped abandoned upload");
            }
        }

        if swept > 0 {
            info!(count = swept, "abandoned-upload sweep complete");
        }
        Ok(())
    }

    /// Marks the owning session `expired` and, if the video is still
    /// `pending_upload`, fails it. Returns the video id when a row was
    /// reconciled.
    async fn reconcile(
        &self,
        source_key: &str,
    ) -> Result<Option<uuid::Uuid>, crate::error::AppError> {
        let videos = sqlx::query_scalar::<_, uuid::Uuid>(
            "SELECT id FROM videos WHERE source_url = $1 AND status = 'pending_upload'",
        )
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(video_id) = videos else {
            return Ok(None);
        };

        if let Ok(session) = upload_session_repo::get_session_by_video(&self.pool, video_id).await {
            upload_session_repo::mark_expired(&self.pool, session.id).await?;
        }
        video_repo::mark_failed(&self.pool, video_id, "upload expired").await?;

        Ok(Some(video_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::InMemoryObjectStore;

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

    #[tokio::test]
    async fn sweep_is_a_noop_with_nothing_incomplete() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let collector = AbandonedUploadCollector::new(lazy_pool(), store, test_config());
        collector.sweep().await.expect("empty store needs no DB access");
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_uploads_untouched() {
        let store = Arc::new(InMemoryObjectStore::new());
        let key = "sources/still-uploading/original.bin";
        let upload_id = store
            .initiate_multipart(key, "application/octet-stream")
            .await
            .unwrap();

        let collector = AbandonedUploadCollector::new(
            lazy_pool(),
            store.clone(),
            test_config(),
        );
        collector.sweep().await.expect("fresh upload must not require DB access");

        let still_listed = store
            .list_incomplete_multipart(Some("sources/"))
            .await
            .unwrap();
        assert_eq!(still_listed.len(), 1);
        assert_eq!(still_listed[0].upload_id, upload_id);
    }
}
