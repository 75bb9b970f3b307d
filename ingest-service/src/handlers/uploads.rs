//! Upload handlers — §4.7: session creation, URL refresh, checksum
//! registration, completion, and abort.

use actix_web::{web, HttpResponse};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{MediaCache, VideoCache};
use crate::db::{upload_session_repo, video_repo};
use crate::error::AppError;
use crate::models::{
    AbortResponse, CompleteUploadRequest, CompleteUploadResponse, PartChecksumsRequest,
    PartChecksumsResponse, PartUrl, RefreshUrlsResponse, StartUploadRequest, StartUploadResponse,
    UploadStatusResponse,
};
use crate::sessions::{SessionManager, StartedSession};
use sqlx::PgPool;

pub async fn start_upload(
    sessions: web::Data<SessionManager>,
    req: web::Json<StartUploadRequest>,
) -> Result<HttpResponse, AppError> {
    if req.filename.is_empty() {
        return Err(AppError::Validation("filename must not be empty".to_string()));
    }

    let title = req.title.clone().unwrap_or_else(|| req.filename.clone());
    let (_video_id, started) = sessions
        .start_upload(
            &title,
            &req.filename,
            &req.content_type,
            req.size,
            req.checksum.as_deref(),
        )
        .await?;

    let response = match started {
        StartedSession::Single {
            upload_id,
            upload_url,
            expires_at,
        } => StartUploadResponse::Single {
            upload_id,
            upload_url,
            expires_at,
        },
        StartedSession::Multipart {
            upload_id,
            multipart_upload_id,
            part_urls,
            part_size,
            num_parts,
            expires_at,
        } => StartUploadResponse::Multipart {
            upload_id,
            multipart_upload_id,
            part_urls,
            part_size,
            num_parts,
            expires_at,
        },
    };

    Ok(HttpResponse::Created().json(response))
}

pub async fn refresh_urls(
    sessions: web::Data<SessionManager>,
    session_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let (part_urls, part_size, expires_at): (Vec<PartUrl>, i64, _) =
        sessions.refresh_urls(session_id.into_inner()).await?;

    Ok(HttpResponse::Ok().json(RefreshUrlsResponse {
        part_urls,
        part_size,
        expires_at,
    }))
}

pub async fn register_part_checksums(
    sessions: web::Data<SessionManager>,
    session_id: web::Path<Uuid>,
    req: web::Json<PartChecksumsRequest>,
) -> Result<HttpResponse, AppError> {
    let accepted = sessions
        .register_checksums(session_id.into_inner(), req.into_inner().parts)
        .await?;

    Ok(HttpResponse::Ok().json(PartChecksumsResponse { accepted }))
}

pub async fn complete_upload(
    sessions: web::Data<SessionManager>,
    session_id: web::Path<Uuid>,
    req: web::Json<CompleteUploadRequest>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let video_id = sessions
        .complete(
            session_id.into_inner(),
            req.multipart_upload_id.as_deref(),
            req.parts,
        )
        .await?;

    Ok(HttpResponse::Ok().json(CompleteUploadResponse {
        video_id,
        status: "processing",
    }))
}

pub async fn abort_upload(
    sessions: web::Data<SessionManager>,
    session_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    sessions.abort(session_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(AbortResponse { success: true }))
}

/// `session_id` here may be either a multipart session id or, for
/// single-PUT uploads, the video id directly — the same duality
/// `SessionManager::complete` resolves.
pub async fn upload_status(
    pool: web::Data<PgPool>,
    cache: web::Data<Arc<MediaCache>>,
    session_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = session_id.into_inner();

    // The session's video_id never changes after creation, so a cached
    // session is never stale for this lookup even though its other fields
    // (status, uploaded_parts) do mutate.
    let video_id = if let Ok(Some(session)) = cache.get_session(id).await {
        session.video_id
    } else {
        match upload_session_repo::get_session(&pool, id).await {
            Ok(session) => {
                if let Err(e) = cache.cache_session(&session).await {
                    tracing::debug!(session_id = %id, error = %e, "session cache set failed");
                }
                session.video_id
            }
            Err(AppError::NotFound(_)) => id,
            Err(e) => return Err(e),
        }
    };

    let video = if let Ok(Some(video)) = cache.get_video(video_id).await {
        video
    } else {
        let video = video_repo::get_video(&pool, video_id).await?;
        if let Err(e) = cache.cache_video(&video).await {
            tracing::debug!(%video_id, error = %e, "video cache set failed");
        }
        video
    };

    Ok(HttpResponse::Ok().json(UploadStatusResponse {
        video_id: video.id,
        status: video.status.as_str(),
        title: video.title,
    }))
}
