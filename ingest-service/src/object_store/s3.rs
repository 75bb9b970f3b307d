use super::{CompletedPart, IncompleteUpload, ObjectMeta, ObjectStore, StorageError};
use crate::config::S3Config;
use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use chrono::Utc;
use rand::Rng;
use resilience::RetryConfig;
use std::future::Future;
use std::time::Duration;

/// Presigned-URL-based adapter over S3 (and S3-compatible stores via
/// `endpoint_url`). Retry policy comes from
/// `resilience::presets::object_storage_config`; only `Throttled`/`Transient`
/// outcomes are retried, classification happens once here rather than at
/// every call site.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    retry: RetryConfig,
}

impl S3ObjectStore {
    pub async fn new(config: &S3Config) -> Self {
        let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(key), Some(secret)) =
            (&config.aws_access_key_id, &config.aws_secret_access_key)
        {
            builder = builder.credentials_provider(Credentials::new(
                key,
                secret,
                None,
                None,
                "ingest-service",
            ));
        }
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        let aws_config = builder.load().await;
        let preset = resilience::presets::object_storage_config();

        S3ObjectStore {
            client: Client::new(&aws_config),
            bucket: config.bucket_name.clone(),
            retry: preset.retry.unwrap_or_default(),
        }
    }

    /// Only `Throttled`/`Transient` get retried (per the adapter's error
    /// taxonomy); everything else surfaces on the first attempt.
    async fn retrying<T, F, Fut>(&self, mut op: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let mut attempt = 0;
        let mut backoff = self.retry.initial_backoff;

        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retriable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let jitter = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
                    let delay = Duration::from_millis(
                        ((backoff.as_millis() as f64) * jitter) as u64,
                    );
                    tracing::warn!(attempt, ?delay, "retrying object-store operation");
                    tokio::time::sleep(delay).await;
                    backoff = (backoff * 2).min(self.retry.max_backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// aws-smithy-types' `DateTime` doesn't carry a `chrono` conversion in this
/// workspace's dependency set, so convert through epoch seconds instead.
fn smithy_dt_to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> chrono::DateTime<Utc> {
    chrono::DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
        .unwrap_or_else(chrono::Utc::now)
}

fn classify_sdk_error(context: &str, message: String) -> StorageError {
    if message.contains("404") || message.contains("NoSuchKey") || message.contains("NotFound") {
        StorageError::NotFound
    } else if message.contains("SlowDown") || message.contains("429") || message.contains("TooManyRequests") {
        StorageError::Throttled(format!("{context}: {message}"))
    } else if message.contains("timeout")
        || message.contains("RequestTimeout")
        || message.contains("ConnectionError")
        || message.contains("503")
    {
        StorageError::Transient(format!("{context}: {message}"))
    } else {
        StorageError::PermanentFailure(format!("{context}: {message}"))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn mint_single_put(
        &self,
        key: &str,
        content_type: &str,
        ttl_secs: u64,
        checksum_sha256: Option<&str>,
    ) -> Result<String, StorageError> {
        self.retrying(|| async {
            let presigning = PresigningConfig::builder()
                .expires_in(Duration::from_secs(ttl_secs))
                .build()
                .map_err(|e| StorageError::PermanentFailure(e.to_string()))?;

            let mut req = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type);
            if let Some(checksum) = checksum_sha256 {
                req = req.checksum_sha256(checksum);
            }

            let presigned = req
                .presigned(presigning)
                .await
                .map_err(|e| classify_sdk_error("mint_single_put", e.to_string()))?;

            Ok(presigned.uri().to_string())
        })
        .await
    }

    async fn initiate_multipart(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.retrying(|| async {
            let output = self
                .client
                .create_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .send()
                .await
                .map_err(|e| classify_sdk_error("initiate_multipart", e.to_string()))?;

            output
                .upload_id()
                .map(|s| s.to_string())
                .ok_or_else(|| StorageError::PermanentFailure("missing upload_id".to_string()))
        })
        .await
    }

    async fn mint_part_put(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        ttl_secs: u64,
    ) -> Result<String, StorageError> {
        self.retrying(|| async {
            let presigning = PresigningConfig::builder()
                .expires_in(Duration::from_secs(ttl_secs))
                .build()
                .map_err(|e| StorageError::PermanentFailure(e.to_string()))?;

            let presigned = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number as i32)
                .presigned(presigning)
                .await
                .map_err(|e| classify_sdk_error("mint_part_put", e.to_string()))?;

            Ok(presigned.uri().to_string())
        })
        .await
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        mut parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        parts.sort_by_key(|p| p.part_number);
        for (expected, part) in (1u32..).zip(parts.iter()) {
            if part.part_number != expected {
                return Err(StorageError::PreconditionFailed(format!(
                    "parts must be contiguous starting at 1, gap at {expected}"
                )));
            }
        }

        let completed_parts: Vec<S3CompletedPart> = parts
            .iter()
            .map(|p| {
                S3CompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(p.etag.clone())
                    .build()
            })
            .collect();

        self.retrying(|| async {
            self.client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(completed_parts.clone()))
                        .build(),
                )
                .send()
                .await
                .map_err(|e| classify_sdk_error("complete_multipart", e.to_string()))?;

            Ok(())
        })
        .await
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                // Already aborted or never existed: idempotent success.
                if msg.contains("NoSuchUpload") {
                    Ok(())
                } else {
                    Err(classify_sdk_error("abort_multipart", msg))
                }
            }
        }
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StorageError> {
        self.retrying(|| async {
            let output = self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| classify_sdk_error("head", e.to_string()))?;

            let last_modified = output
                .last_modified()
                .map(smithy_dt_to_chrono)
                .unwrap_or_else(chrono::Utc::now);

            Ok(ObjectMeta {
                size: output.content_length().unwrap_or(0),
                etag: output.e_tag().unwrap_or_default().to_string(),
                last_modified,
            })
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let result = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(classify_sdk_error("delete", e.to_string())),
        }
    }

    async fn range_get(
        &self,
        key: &str,
        start: u64,
        end_inclusive: u64,
    ) -> Result<Vec<u8>, StorageError> {
        self.retrying(|| async {
            let range = format!("bytes={start}-{end_inclusive}");
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .range(&range)
                .send()
                .await
                .map_err(|e| classify_sdk_error("range_get", e.to_string()))?;

            output
                .body
                .collect()
                .await
                .map(|bytes| bytes.into_bytes().to_vec())
                .map_err(|e| StorageError::Transient(format!("range_get body read: {e}")))
        })
        .await
    }

    async fn list_incomplete_multipart(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<IncompleteUpload>, StorageError> {
        self.retrying(|| async {
            let mut req = self.client.list_multipart_uploads().bucket(&self.bucket);
            if let Some(prefix) = prefix {
                req = req.prefix(prefix);
            }

            let output = req
                .send()
                .await
                .map_err(|e| classify_sdk_error("list_incomplete_multipart", e.to_string()))?;

            let uploads = output
                .uploads()
                .iter()
                .filter_map(|u| {
                    let key = u.key()?.to_string();
                    let upload_id = u.upload_id()?.to_string();
                    let initiated_at = u
                        .initiated()
                        .map(smithy_dt_to_chrono)
                        .unwrap_or_else(chrono::Utc::now);
                    Some(IncompleteUpload {
                        key,
                        upload_id,
                        initiated_at,
                    })
                })
                .collect();

            Ok(uploads)
        })
        .await
    }
}
