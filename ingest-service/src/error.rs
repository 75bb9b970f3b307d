use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;

/// The error taxonomy the lifecycle controller, session manager, and HTTP
/// surface all convert into. Every variant maps to exactly one HTTP status;
/// internal code never matches on a stringly-typed "any error" and silently
/// continues past it.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    PayloadTooLarge {
        max_bytes: i64,
        received_bytes: i64,
    },
    StateConflict {
        message: String,
        current_status: Option<String>,
    },
    NotFound(String),
    ChecksumMismatch {
        part_number: Option<u32>,
        expected_prefix: String,
        actual_prefix: String,
    },
    UploadExpired(String),
    PartsLimit,
    StorageError(String),
    QueueError(String),
    CacheError(String),
    RateLimited {
        retry_after_s: u64,
    },
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "validation error: {msg}"),
            AppError::PayloadTooLarge {
                max_bytes,
                received_bytes,
            } => write!(
                f,
                "payload too large: {received_bytes} bytes exceeds max of {max_bytes}"
            ),
            AppError::StateConflict { message, .. } => write!(f, "state conflict: {message}"),
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::ChecksumMismatch { .. } => write!(f, "checksum mismatch"),
            AppError::UploadExpired(msg) => write!(f, "upload expired: {msg}"),
            AppError::PartsLimit => write!(f, "multipart part count exceeds provider limit"),
            AppError::StorageError(msg) => write!(f, "storage error: {msg}"),
            AppError::QueueError(msg) => write!(f, "queue error: {msg}"),
            AppError::CacheError(msg) => write!(f, "cache error: {msg}"),
            AppError::RateLimited { retry_after_s } => {
                write!(f, "rate limited, retry after {retry_after_s}s")
            }
            AppError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    received: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::StateConflict { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ChecksumMismatch { .. } => StatusCode::BAD_REQUEST,
            AppError::UploadExpired(_) => StatusCode::BAD_REQUEST,
            AppError::PartsLimit => StatusCode::BAD_REQUEST,
            AppError::StorageError(_) => StatusCode::BAD_GATEWAY,
            AppError::QueueError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::CacheError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, current_status, expected, received, retry_after) = match self {
            AppError::Validation(_) => ("ValidationError", None, None, None, None),
            AppError::PayloadTooLarge {
                max_bytes,
                received_bytes,
            } => (
                "PayloadTooLarge",
                None,
                Some(max_bytes.to_string()),
                Some(received_bytes.to_string()),
                None,
            ),
            AppError::StateConflict { current_status, .. } => {
                ("StateConflict", current_status.clone(), None, None, None)
            }
            AppError::NotFound(_) => ("NotFound", None, None, None, None),
            AppError::ChecksumMismatch {
                expected_prefix,
                actual_prefix,
                ..
            } => (
                "ChecksumMismatch",
                None,
                Some(expected_prefix.clone()),
                Some(actual_prefix.clone()),
                None,
            ),
            AppError::UploadExpired(_) => ("UploadExpired", None, None, None, None),
            AppError::PartsLimit => ("PartsLimit", None, None, None, None),
            AppError::StorageError(_) => ("StorageError", None, None, None, None),
            AppError::QueueError(_) => ("QueueError", None, None, None, None),
            AppError::CacheError(_) => ("CacheError", None, None, None, None),
            AppError::RateLimited { retry_after_s } => {
                ("RateLimited", None, None, None, Some(*retry_after_s))
            }
            AppError::Internal(_) => ("Internal", None, None, None, None),
        };

        let mut builder = HttpResponse::build(self.status_code());
        if let Some(secs) = retry_after {
            builder.insert_header(("Retry-After", secs.to_string()));
        }
        builder.json(ErrorBody {
            error: error.to_string(),
            message: self.to_string(),
            current_status,
            expected,
            received,
            retry_after,
        })
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::CacheError(e.to_string())
    }
}

impl From<crate::object_store::StorageError> for AppError {
    fn from(e: crate::object_store::StorageError) -> Self {
        use crate::object_store::StorageError::*;
        match e {
            NotFound => AppError::NotFound("object not found".to_string()),
            PreconditionFailed(msg) => AppError::Validation(msg),
            Throttled(msg) | Transient(msg) | PermanentFailure(msg) => {
                AppError::StorageError(msg)
            }
        }
    }
}
