//! Read-through cache for `Video`/`UploadSession` rows — takes read
//! pressure off Postgres for the hot `GET /videos/:id` and
//! `GET /uploads/:id/status` paths. Never the system of record: every
//! write path invalidates before (or instead of) populating.

#[cfg(test)]
pub mod fake;

#[cfg(test)]
pub use fake::NoopCache;

use crate::error::AppError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use video_core::{UploadSession, Video};

const DEFAULT_TTL_SECONDS: u64 = 300;

/// The cache seam `LifecycleController` programs against. `MediaCache` is
/// the only production implementation; the trait exists so the controller
/// (and anything built on top of it) can be tested without a live Redis.
#[async_trait]
pub trait VideoCache: Send + Sync {
    async fn cache_video(&self, video: &Video) -> Result<(), AppError>;
    async fn get_video(&self, video_id: Uuid) -> Result<Option<Video>, AppError>;
    async fn invalidate_video(&self, video_id: Uuid) -> Result<(), AppError>;

    async fn cache_session(&self, session: &UploadSession) -> Result<(), AppError>;
    async fn get_session(&self, session_id: Uuid) -> Result<Option<UploadSession>, AppError>;
    async fn invalidate_session(&self, session_id: Uuid) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct MediaCache {
    conn: Arc<Mutex<ConnectionManager>>,
    ttl_seconds: u64,
}

impl MediaCache {
    pub fn new(conn: ConnectionManager, ttl_seconds: Option<u64>) -> Self {
        MediaCache {
            conn: Arc::new(Mutex::new(conn)),
            ttl_seconds: ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS),
        }
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let payload = serde_json::to_string(value)
            .map_err(|e| AppError::CacheError(format!("failed to serialize cache value: {e}")))?;
        let mut conn = self.conn.lock().await;
        conn.set_ex::<_, _, ()>(key, payload, self.ttl_seconds)
            .await
            .map_err(AppError::from)
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let mut conn = self.conn.lock().await;
        let value: Option<String> = conn.get(key).await.map_err(AppError::from)?;
        match value {
            Some(raw) => {
                let parsed = serde_json::from_str(&raw).map_err(|e| {
                    AppError::CacheError(format!("failed to deserialize cache value: {e}"))
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.conn.lock().await;
        conn.del::<_, ()>(key).await.map_err(AppError::from)
    }

    fn video_key(id: Uuid) -> String {
        format!("ingest:video:{id}")
    }

    fn session_key(id: Uuid) -> String {
        format!("ingest:session:{id}")
    }
}

#[async_trait]
impl VideoCache for MediaCache {
    async fn cache_video(&self, video: &Video) -> Result<(), AppError> {
        self.set_json(&Self::video_key(video.id), video).await
    }

    async fn get_video(&self, video_id: Uuid) -> Result<Option<Video>, AppError> {
        self.get_json(&Self::video_key(video_id)).await
    }

    async fn invalidate_video(&self, video_id: Uuid) -> Result<(), AppError> {
        self.delete(&Self::video_key(video_id)).await
    }

    async fn cache_session(&self, session: &UploadSession) -> Result<(), AppError> {
        self.set_json(&Self::session_key(session.id), session).await
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<UploadSession>, AppError> {
        self.get_json(&Self::session_key(session_id)).await
    }

    async fn invalidate_session(&self, session_id: Uuid) -> Result<(), AppError> {
        self.delete(&Self::session_key(session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_helpers_are_namespaced_by_entity() {
        let id = Uuid::nil();
        assert_eq!(
            MediaCache::video_key(id),
            "ingest:video:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            MediaCache::session_key(id),
            "ingest:session:00000000-0000-0000-0000-000000000000"
        );
    }
}
