use crate::error::AppError;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use video_core::{Video, VideoStatus};

pub async fn create_video(
    pool: &PgPool,
    id: Uuid,
    title: &str,
    source_url: &str,
    source_size: i64,
    source_checksum: Option<&str>,
) -> Result<Video, AppError> {
    let status = VideoStatus::PendingUpload;
    let video = sqlx::query_as::<_, Video>(
        r#"
        INSERT INTO videos (
            id, title, status, source_url, source_size, source_checksum,
            manifest_url, duration_s, width, height, codec, bitrate, fps,
            thumbnails, upload_session_id, processing_attempts, last_error,
            is_public, created_at, updated_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6,
            NULL, NULL, NULL, NULL, NULL, NULL, NULL,
            NULL, NULL, 0, NULL,
            false, NOW(), NOW()
        )
        RETURNING id, title, status, source_url, source_size, source_checksum,
            manifest_url, duration_s, width, height, codec, bitrate, fps,
            thumbnails, upload_session_id, processing_attempts, last_error,
            is_public, created_at, updated_at, processed_at, cancelled_at, deleted_at
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(status)
    .bind(source_url)
    .bind(source_size)
    .bind(source_checksum)
    .fetch_one(pool)
    .await?;

    Ok(video)
}

pub async fn get_video(pool: &PgPool, id: Uuid) -> Result<Video, AppError> {
    sqlx::query_as::<_, Video>(
        r#"SELECT id, title, status, source_url, source_size, source_checksum,
            manifest_url, duration_s, width, height, codec, bitrate, fps,
            thumbnails, upload_session_id, processing_attempts, last_error,
            is_public, created_at, updated_at, processed_at, cancelled_at, deleted_at
           FROM videos WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("video {id} not found")))
}

/// List non-deleted videos, newest first.
pub async fn list_videos(pool: &PgPool, limit: i64) -> Result<Vec<Video>, AppError> {
    let videos = sqlx::query_as::<_, Video>(
        r#"SELECT id, title, status, source_url, source_size, source_checksum,
            manifest_url, duration_s, width, height, codec, bitrate, fps,
            thumbnails, upload_session_id, processing_attempts, last_error,
            is_public, created_at, updated_at, processed_at, cancelled_at, deleted_at
           FROM videos
           WHERE status != 'deleted' AND deleted_at IS NULL
           ORDER BY created_at DESC
           LIMIT $1"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(videos)
}

/// CAS transition: `pending_upload -> processing`, attaching the session id
/// this completion advanced from. Returns `false` (no rows updated) if the
/// video was not still in `pending_upload` — the caller treats that as a
/// `StateConflict` (double-complete).
pub async fn try_advance_to_processing(
    tx: &mut Transaction<'_, Postgres>,
    video_id: Uuid,
    upload_session_id: Uuid,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"UPDATE videos
           SET status = 'processing', upload_session_id = $2, processing_attempts = 0, updated_at = NOW()
           WHERE id = $1 AND status = 'pending_upload'"#,
    )
    .bind(video_id)
    .bind(upload_session_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn mark_failed(pool: &PgPool, video_id: Uuid, last_error: &str) -> Result<(), AppError> {
    sqlx::query(
        r#"UPDATE videos
           SET status = 'failed', last_error = $2, updated_at = NOW()
           WHERE id = $1 AND status NOT IN ('deleted', 'ready', 'cancelled')"#,
    )
    .bind(video_id)
    .bind(last_error)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn mark_cancelled(pool: &PgPool, video_id: Uuid) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"UPDATE videos
           SET status = 'cancelled', cancelled_at = NOW(), updated_at = NOW()
           WHERE id = $1 AND status IN ('pending_upload', 'uploading')"#,
    )
    .bind(video_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Advances `processing -> ready` once the worker has already written the
/// derived fields directly (per §4.2, this deployment's chosen callback
/// mechanism). The `manifest_url`/`duration_s IS NOT NULL` guard enforces the
/// `ready ⇒ manifest_url ∧ duration_s non-null` invariant at the one place
/// that sets `status = 'ready'`, so a premature/racing status event can never
/// advance a video whose worker write hasn't landed yet.
pub async fn confirm_ready(pool: &PgPool, video_id: Uuid) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"UPDATE videos
           SET status = 'ready', processed_at = NOW(), updated_at = NOW()
           WHERE id = $1 AND status = 'processing'
             AND manifest_url IS NOT NULL AND duration_s IS NOT NULL"#,
    )
    .bind(video_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn soft_delete(pool: &PgPool, video_id: Uuid) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"UPDATE videos
           SET status = 'deleted', deleted_at = NOW(), updated_at = NOW()
           WHERE id = $1 AND status != 'deleted'"#,
    )
    .bind(video_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
