use super::VideoCache;
use crate::error::AppError;
use async_trait::async_trait;
use uuid::Uuid;
use video_core::{UploadSession, Video};

/// Always-miss cache for tests that need a `LifecycleController` but never
/// exercise its cache-invalidation path.
pub struct NoopCache;

#[async_trait]
impl VideoCache for NoopCache {
    async fn cache_video(&self, _video: &Video) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_video(&self, _video_id: Uuid) -> Result<Option<Video>, AppError> {
        Ok(None)
    }

    async fn invalidate_video(&self, _video_id: Uuid) -> Result<(), AppError> {
        Ok(())
    }

    async fn cache_session(&self, _session: &UploadSession) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_session(&self, _session_id: Uuid) -> Result<Option<UploadSession>, AppError> {
        Ok(None)
    }

    async fn invalidate_session(&self, _session_id: Uuid) -> Result<(), AppError> {
        Ok(())
    }
}
