use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a `Video` row. Transitions are enforced by the
/// lifecycle controller, never by callers directly setting this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    PendingUpload,
    Uploading,
    Processing,
    Ready,
    Failed,
    Cancelled,
    Deleted,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::PendingUpload => "pending_upload",
            VideoStatus::Uploading => "uploading",
            VideoStatus::Processing => "processing",
            VideoStatus::Ready => "ready",
            VideoStatus::Failed => "failed",
            VideoStatus::Cancelled => "cancelled",
            VideoStatus::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending_upload" => VideoStatus::PendingUpload,
            "uploading" => VideoStatus::Uploading,
            "processing" => VideoStatus::Processing,
            "ready" => VideoStatus::Ready,
            "failed" => VideoStatus::Failed,
            "cancelled" => VideoStatus::Cancelled,
            "deleted" => VideoStatus::Deleted,
            _ => return None,
        })
    }

    /// Whether `next` is a legal transition from `self` per the state diagram.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        use VideoStatus::*;
        matches!(
            (self, next),
            (PendingUpload, Uploading)
                | (PendingUpload, Processing)
                | (PendingUpload, Cancelled)
                | (PendingUpload, Failed)
                | (PendingUpload, Deleted)
                | (Uploading, Processing)
                | (Uploading, Cancelled)
                | (Uploading, Failed)
                | (Uploading, Deleted)
                | (Processing, Ready)
                | (Processing, Failed)
                | (Processing, Deleted)
                | (Ready, Deleted)
                | (Failed, Deleted)
                | (Cancelled, Deleted)
        )
    }
}

/// Optional thumbnail sprite/interval descriptor populated by the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThumbnailSpec {
    pub pattern: String,
    pub interval_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprite: Option<String>,
}

/// Central entity: one row per ingested video.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub status: VideoStatus,
    pub source_url: String,
    pub source_size: i64,
    pub source_checksum: Option<String>,
    pub manifest_url: Option<String>,
    pub duration_s: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub codec: Option<String>,
    pub bitrate: Option<i64>,
    pub fps: Option<f64>,
    pub thumbnails: Option<serde_json::Value>,
    pub upload_session_id: Option<Uuid>,
    pub processing_attempts: i32,
    pub last_error: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Status of an `UploadSession` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UploadSessionStatus {
    Active,
    Completed,
    Failed,
    Expired,
}

impl UploadSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadSessionStatus::Active => "active",
            UploadSessionStatus::Completed => "completed",
            UploadSessionStatus::Failed => "failed",
            UploadSessionStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "active" => UploadSessionStatus::Active,
            "completed" => UploadSessionStatus::Completed,
            "failed" => UploadSessionStatus::Failed,
            "expired" => UploadSessionStatus::Expired,
            _ => return None,
        })
    }
}

/// One uploaded (or checksum-registered) part, persisted as a JSON array on
/// the session row and reconstructed on read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedPart {
    pub part_number: u32,
    pub etag: Option<String>,
    pub checksum: Option<String>,
    pub size: Option<i64>,
}

/// One row per multipart upload; single-PUT uploads may also materialize a
/// session row with `total_parts = 1` depending on deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: Uuid,
    pub video_id: Uuid,
    pub multipart_upload_id: Option<String>,
    pub total_parts: u32,
    pub uploaded_parts: Vec<UploadedPart>,
    pub status: UploadSessionStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Worker-written row; required by the `ready ⇒ ∃ segment` invariant.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Segment {
    pub video_id: Uuid,
    pub idx: i32,
    pub url: String,
    pub start_s: f64,
    pub duration_s: f64,
    pub size: Option<i64>,
    pub keyframe: Option<bool>,
}

/// Transcode job envelope enqueued on completion and consumed by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJobPayload {
    #[serde(rename = "videoId")]
    pub video_id: Uuid,
    #[serde(rename = "sourceUrl")]
    pub source_url: String,
}

/// Status event published by the worker on the `video:status` topic and
/// relayed verbatim by the fan-out service to subscribed websocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "videoId")]
    pub video_id: Uuid,
    pub status: StatusEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEventKind {
    Processing,
    Ready,
    Failed,
}

impl StatusEvent {
    pub fn topic_key(&self) -> String {
        format!("video:{}", self.video_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_status_round_trips_through_str() {
        for s in [
            VideoStatus::PendingUpload,
            VideoStatus::Uploading,
            VideoStatus::Processing,
            VideoStatus::Ready,
            VideoStatus::Failed,
            VideoStatus::Cancelled,
            VideoStatus::Deleted,
        ] {
            assert_eq!(VideoStatus::from_str(s.as_str()), Some(s));
        }
    }

    #[test]
    fn lifecycle_graph_matches_state_diagram() {
        use VideoStatus::*;
        assert!(PendingUpload.can_transition_to(Processing));
        assert!(PendingUpload.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Ready));
        assert!(Processing.can_transition_to(Failed));
        assert!(Ready.can_transition_to(Deleted));
        assert!(!Ready.can_transition_to(Processing));
        assert!(!Deleted.can_transition_to(Ready));
        assert!(!Cancelled.can_transition_to(Ready));
    }

    #[test]
    fn status_event_topic_key_matches_fan_out_convention() {
        let video_id = Uuid::nil();
        let event = StatusEvent {
            video_id,
            status: StatusEventKind::Ready,
            error: None,
            ts: Utc::now(),
        };
        assert_eq!(event.topic_key(), format!("video:{video_id}"));
    }
}
