//! Video handlers — §4.7: listing, detail, and soft delete.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::{MediaCache, VideoCache};
use crate::db::video_repo;
use crate::error::AppError;
use crate::lifecycle::LifecycleController;
use crate::models::{AbortResponse, VideoListResponse, VideoResponse};
use crate::object_store::ObjectStore;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListVideosQuery {
    limit: Option<i64>,
}

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

pub async fn list_videos(
    pool: web::Data<PgPool>,
    query: web::Query<ListVideosQuery>,
) -> Result<HttpResponse, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let videos = video_repo::list_videos(&pool, limit).await?;

    Ok(HttpResponse::Ok().json(VideoListResponse {
        videos: videos.into_iter().map(VideoResponse::from).collect(),
    }))
}

pub async fn get_video(
    pool: web::Data<PgPool>,
    cache: web::Data<Arc<MediaCache>>,
    video_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let video_id = video_id.into_inner();

    if let Ok(Some(video)) = cache.get_video(video_id).await {
        return Ok(HttpResponse::Ok().json(VideoResponse::from(video)));
    }

    let video = video_repo::get_video(&pool, video_id).await?;
    if let Err(e) = cache.cache_video(&video).await {
        tracing::debug!(%video_id, error = %e, "video cache set failed");
    }
    Ok(HttpResponse::Ok().json(VideoResponse::from(video)))
}

/// Soft-deletes the video and, best-effort, purges its source object. The
/// worker's processed-prefix objects are left for a separate GC sweep (see
/// open question in `DESIGN.md`).
pub async fn delete_video(
    pool: web::Data<PgPool>,
    store: web::Data<Arc<dyn ObjectStore>>,
    lifecycle: web::Data<Arc<LifecycleController>>,
    video_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let video_id = video_id.into_inner();
    let video = video_repo::get_video(&pool, video_id).await?;

    if !LifecycleController::can_delete_source(video.status) {
        // Already deleted — delete is idempotent, nothing left to do.
        return Ok(HttpResponse::Ok().json(AbortResponse { success: true }));
    }

    purge_deleted_source(&store, &video.source_url).await;
    lifecycle.delete(video_id).await?;

    Ok(HttpResponse::Ok().json(AbortResponse { success: true }))
}

/// Best-effort async object deletion per §4.2 — failures are swallowed, not
/// surfaced, since the soft-delete of the `videos` row already succeeded.
async fn purge_deleted_source(store: &Arc<dyn ObjectStore>, source_url: &str) {
    let _ = store.delete(source_url).await;
}
