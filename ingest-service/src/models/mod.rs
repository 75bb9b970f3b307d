pub mod ws;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use video_core::{Video, VideoStatus};

/// `POST /uploads` request body.
#[derive(Debug, Deserialize)]
pub struct StartUploadRequest {
    pub filename: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub size: i64,
    /// Whole-file SHA-256, base64, for single-PUT uploads only.
    pub checksum: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartUploadResponse {
    Single {
        upload_id: Uuid,
        upload_url: String,
        expires_at: DateTime<Utc>,
    },
    Multipart {
        upload_id: Uuid,
        multipart_upload_id: String,
        part_urls: Vec<PartUrl>,
        part_size: i64,
        num_parts: u32,
        expires_at: DateTime<Utc>,
    },
}

#[derive(Debug, Serialize, Clone)]
pub struct PartUrl {
    pub part_number: u32,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshUrlsResponse {
    pub part_urls: Vec<PartUrl>,
    pub part_size: i64,
    pub expires_at: DateTime<Utc>,
}

/// `PATCH /uploads/:id/part-checksums` request body.
#[derive(Debug, Deserialize)]
pub struct PartChecksumsRequest {
    pub parts: Vec<PartChecksumEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PartChecksumEntry {
    #[serde(rename = "partNumber")]
    pub part_number: u32,
    pub checksum: String,
    pub size: i64,
}

#[derive(Debug, Serialize)]
pub struct PartChecksumsResponse {
    pub accepted: usize,
}

/// `POST /uploads/:id/complete` request body.
#[derive(Debug, Deserialize, Default)]
pub struct CompleteUploadRequest {
    #[serde(rename = "multipartUploadId")]
    pub multipart_upload_id: Option<String>,
    #[serde(default)]
    pub parts: Vec<CompletedPartEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletedPartEntry {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Debug, Serialize)]
pub struct CompleteUploadResponse {
    pub video_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AbortResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadStatusResponse {
    pub video_id: Uuid,
    pub status: &'static str,
    pub title: String,
}

/// `GET /videos/:id` and list-item response.
#[derive(Debug, Serialize)]
pub struct VideoResponse {
    pub id: Uuid,
    pub title: String,
    pub status: &'static str,
    pub duration_s: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<Video> for VideoResponse {
    fn from(v: Video) -> Self {
        VideoResponse {
            id: v.id,
            title: v.title,
            status: v.status.as_str(),
            duration_s: v.duration_s,
            width: v.width,
            height: v.height,
            is_public: v.is_public,
            created_at: v.created_at,
            updated_at: v.updated_at,
            manifest: if v.status == VideoStatus::Ready {
                v.manifest_url
            } else {
                None
            },
            last_error: v.last_error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VideoListResponse {
    pub videos: Vec<VideoResponse>,
}
