//! Video Lifecycle Controller — §4.2 state machine. Every advance is an
//! atomic CAS (`UPDATE ... WHERE status = ...`) so double-completes and
//! late worker callbacks are no-ops rather than errors.

use crate::cache::VideoCache;
use crate::db::{segment_repo, video_repo};
use crate::error::AppError;
use crate::queue;
use sqlx::PgPool;
use std::sync::Arc;
use transactional_outbox::OutboxRepository;
use uuid::Uuid;
use video_core::VideoStatus;

/// Every CAS below implements one edge of `VideoStatus::can_transition_to`'s
/// graph via a SQL `WHERE status = ...`/`status IN (...)` guard rather than a
/// fetch-then-check, so the shared transition table can't be consulted at
/// runtime without an extra read. This debug-only check keeps the two from
/// silently drifting apart: it trips in development the moment a CAS here is
/// edited to imply a transition the shared graph doesn't agree is legal.
fn debug_assert_transition(from: VideoStatus, to: VideoStatus) {
    debug_assert!(
        from.can_transition_to(to),
        "lifecycle CAS assumes {from:?} -> {to:?}, which video_core::VideoStatus::can_transition_to disagrees is legal"
    );
}

pub struct LifecycleController {
    pool: PgPool,
    outbox: Arc<dyn OutboxRepository>,
    cache: Arc<dyn VideoCache>,
}

impl LifecycleController {
    pub fn new(pool: PgPool, outbox: Arc<dyn OutboxRepository>, cache: Arc<dyn VideoCache>) -> Self {
        LifecycleController {
            pool,
            outbox,
            cache,
        }
    }

    /// Best-effort: a stale cache entry is a correctness bug, a cache-write
    /// failure is not — every caller treats this as fire-and-forget.
    async fn invalidate(&self, video_id: Uuid) {
        if let Err(e) = self.cache.invalidate_video(video_id).await {
            tracing::warn!(video_id = %video_id, error = %e, "failed to invalidate video cache entry");
        }
    }

    /// §4.3.4 step 3: CAS `pending_upload -> processing` and enqueue the
    /// transcode job in the same transaction. On enqueue failure the whole
    /// transaction rolls back, so the video is left in `pending_upload`
    /// rather than stranded in `processing` with no job.
    pub async fn advance_to_processing(
        &self,
        video_id: Uuid,
        upload_session_id: Uuid,
        source_url: &str,
    ) -> Result<(), AppError> {
        debug_assert_transition(VideoStatus::PendingUpload, VideoStatus::Processing);
        let mut tx = self.pool.begin().await?;

        let advanced =
            video_repo::try_advance_to_processing(&mut tx, video_id, upload_session_id).await?;
        if !advanced {
            tx.rollback().await.ok();
            // Already processing (or further along) — a retried complete()
            // call, per the idempotent-enqueue requirement.
            return Ok(());
        }

        if let Err(e) = queue::enqueue_transcode_job(&mut tx, self.outbox.as_ref(), video_id, source_url).await
        {
            tx.rollback().await.ok();
            return Err(AppError::QueueError(e.to_string()));
        }

        tx.commit().await?;
        self.invalidate(video_id).await;
        Ok(())
    }

    /// Worker `ready` status event: `processing -> ready`. Returns `false`
    /// without error if the video wasn't in `processing` with its derived
    /// fields already populated, or if no segment row exists yet — either a
    /// duplicate/late event, or one that raced ahead of the worker's own
    /// direct writes. Enforces the full `ready ⇒ manifest_url ∧ duration_s ∧
    /// ∃ segment` invariant (§8) at the single call site that sets the
    /// status, not just the subset the `videos` table UPDATE alone can check.
    pub async fn confirm_ready(&self, video_id: Uuid) -> Result<bool, AppError> {
        debug_assert_transition(VideoStatus::Processing, VideoStatus::Ready);
        if !segment_repo::exists_for_video(&self.pool, video_id).await? {
            return Ok(false);
        }
        let advanced = video_repo::confirm_ready(&self.pool, video_id).await?;
        if advanced {
            self.invalidate(video_id).await;
        }
        Ok(advanced)
    }

    /// Worker terminal failure, expiry, or validation failure: advances to
    /// `failed` with `last_error`. Never overwrites a terminal
    /// ready/cancelled/deleted video.
    pub async fn fail(&self, video_id: Uuid, reason: &str) -> Result<(), AppError> {
        for from in [
            VideoStatus::PendingUpload,
            VideoStatus::Uploading,
            VideoStatus::Processing,
        ] {
            debug_assert_transition(from, VideoStatus::Failed);
        }
        video_repo::mark_failed(&self.pool, video_id, reason).await?;
        self.invalidate(video_id).await;
        Ok(())
    }

    /// Client-initiated cancel from `pending_upload`/`uploading`.
    pub async fn cancel(&self, video_id: Uuid) -> Result<bool, AppError> {
        debug_assert_transition(VideoStatus::PendingUpload, VideoStatus::Cancelled);
        debug_assert_transition(VideoStatus::Uploading, VideoStatus::Cancelled);
        let cancelled = video_repo::mark_cancelled(&self.pool, video_id).await?;
        self.invalidate(video_id).await;
        Ok(cancelled)
    }

    /// Soft delete from any non-deleted state.
    pub async fn delete(&self, video_id: Uuid) -> Result<bool, AppError> {
        for from in [
            VideoStatus::PendingUpload,
            VideoStatus::Uploading,
            VideoStatus::Processing,
            VideoStatus::Ready,
            VideoStatus::Failed,
            VideoStatus::Cancelled,
        ] {
            debug_assert_transition(from, VideoStatus::Deleted);
        }
        let deleted = video_repo::soft_delete(&self.pool, video_id).await?;
        self.invalidate(video_id).await;
        Ok(deleted)
    }

    pub fn can_delete_source(status: VideoStatus) -> bool {
        !matches!(status, VideoStatus::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_delete_source_is_false_only_once_already_deleted() {
        for status in [
            VideoStatus::PendingUpload,
            VideoStatus::Uploading,
            VideoStatus::Processing,
            VideoStatus::Ready,
            VideoStatus::Failed,
            VideoStatus::Cancelled,
        ] {
            assert!(LifecycleController::can_delete_source(status));
        }
        assert!(!LifecycleController::can_delete_source(VideoStatus::Deleted));
    }
}
