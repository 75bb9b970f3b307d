use crate::error::AppError;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;
use video_core::{UploadSession, UploadSessionStatus, UploadedPart};

/// Wire shape of the `upload_sessions` table. `uploaded_parts` is stored as
/// `jsonb`; `total_parts` as `int4` — both need a type sqlx can decode
/// before being widened into the domain `UploadSession`.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    video_id: Uuid,
    multipart_upload_id: Option<String>,
    total_parts: i32,
    uploaded_parts: Json<Vec<UploadedPart>>,
    status: UploadSessionStatus,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<SessionRow> for UploadSession {
    fn from(r: SessionRow) -> Self {
        UploadSession {
            id: r.id,
            video_id: r.video_id,
            multipart_upload_id: r.multipart_upload_id,
            total_parts: r.total_parts as u32,
            uploaded_parts: r.uploaded_parts.0,
            status: r.status,
            expires_at: r.expires_at,
            created_at: r.created_at,
            completed_at: r.completed_at,
        }
    }
}

const SELECT_COLUMNS: &str = "id, video_id, multipart_upload_id, total_parts, uploaded_parts,
            status, expires_at, created_at, completed_at";

pub async fn create_session(
    pool: &PgPool,
    id: Uuid,
    video_id: Uuid,
    multipart_upload_id: Option<&str>,
    total_parts: u32,
    expires_at: DateTime<Utc>,
) -> Result<UploadSession, AppError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        r#"INSERT INTO upload_sessions (
            id, video_id, multipart_upload_id, total_parts, uploaded_parts,
            status, expires_at, created_at, completed_at
        ) VALUES ($1, $2, $3, $4, '[]'::jsonb, $5, $6, NOW(), NULL)
        RETURNING {SELECT_COLUMNS}"#
    ))
    .bind(id)
    .bind(video_id)
    .bind(multipart_upload_id)
    .bind(total_parts as i32)
    .bind(UploadSessionStatus::Active)
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

pub async fn get_session(pool: &PgPool, id: Uuid) -> Result<UploadSession, AppError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM upload_sessions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("upload session {id} not found")))?;

    Ok(row.into())
}

pub async fn get_session_by_video(
    pool: &PgPool,
    video_id: Uuid,
) -> Result<UploadSession, AppError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM upload_sessions
         WHERE video_id = $1 ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(video_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("upload session for video {video_id} not found")))?;

    Ok(row.into())
}

/// Merge freshly-acknowledged part checksums into `uploaded_parts`, keyed by
/// part number. The session row is the single source of truth for which
/// parts have been validated; clients may call this multiple times for the
/// same part (idempotent overwrite).
pub async fn merge_uploaded_parts(
    pool: &PgPool,
    id: Uuid,
    parts: &[UploadedPart],
) -> Result<UploadSession, AppError> {
    let mut session = get_session(pool, id).await?;

    for incoming in parts {
        if let Some(existing) = session
            .uploaded_parts
            .iter_mut()
            .find(|p| p.part_number == incoming.part_number)
        {
            *existing = incoming.clone();
        } else {
            session.uploaded_parts.push(incoming.clone());
        }
    }
    session.uploaded_parts.sort_by_key(|p| p.part_number);

    sqlx::query("UPDATE upload_sessions SET uploaded_parts = $2 WHERE id = $1")
        .bind(id)
        .bind(Json(&session.uploaded_parts))
        .execute(pool)
        .await?;

    Ok(session)
}

pub async fn refresh_expiry(
    pool: &PgPool,
    id: Uuid,
    expires_at: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query("UPDATE upload_sessions SET expires_at = $2 WHERE id = $1 AND status = 'active'")
        .bind(id)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(())
}

/// CAS: only a still-`active` session can be completed. Returns `false` if
/// the session had already moved on (double-complete, post-expiry, etc).
pub async fn try_mark_completed(pool: &PgPool, id: Uuid) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"UPDATE upload_sessions
           SET status = 'completed', completed_at = NOW()
           WHERE id = $1 AND status = 'active'"#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn mark_failed(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE upload_sessions SET status = 'failed' WHERE id = $1 AND status = 'active'")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Used by the abandoned-upload collector: sessions still `active` whose
/// `expires_at` has passed the grace window.
pub async fn list_expired_active(
    pool: &PgPool,
    older_than: DateTime<Utc>,
) -> Result<Vec<UploadSession>, AppError> {
    let rows = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM upload_sessions
         WHERE status = 'active' AND expires_at < $1"
    ))
    .bind(older_than)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn mark_expired(pool: &PgPool, id: Uuid) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE upload_sessions SET status = 'expired' WHERE id = $1 AND status = 'active'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
