//! Tunables shared by the orchestrator and (in principle) the worker.
//! Defaults mirror the configuration table in the ingest control-plane spec.

/// Reject `POST /uploads` above this size.
pub const MAX_FILE_SIZE: i64 = 10 * 1024 * 1024 * 1024;
/// Above this declared size, a session is multipart rather than single-PUT.
pub const MULTIPART_THRESHOLD: i64 = 100 * 1024 * 1024;
/// Part size used when splitting a multipart session.
pub const MULTIPART_CHUNK_BYTES: i64 = 50 * 1024 * 1024;
/// Provider ceiling on part count.
pub const MAX_MULTIPART_PARTS: u32 = 10_000;
/// Smallest part size a provider accepts for a non-final part.
pub const MIN_PART_BYTES: i64 = 5 * 1024 * 1024;
/// Largest part size a provider accepts.
pub const MAX_PART_BYTES: i64 = 5 * 1024 * 1024 * 1024;
/// Presigned URL validity window, in seconds.
pub const PRESIGN_TTL_SECS: i64 = 3600;
/// Abandoned-upload cutoff, in hours.
pub const ABANDONED_TTL_HOURS: i64 = 24;
/// Abandoned-upload collector sweep cadence, in seconds.
pub const COLLECTOR_CADENCE_SECS: u64 = 6 * 3600;
/// Concurrent ranged-GET checksum validations per completion.
pub const VALIDATION_PARALLELISM: usize = 5;
/// Wall-clock budget for a single completion's checksum validation.
pub const MAX_VALIDATION_WALL_SECS: u64 = 120;
/// Job retry budget in production.
pub const QUEUE_ATTEMPTS_PROD: u32 = 3;
/// Job retry budget outside production (fail fast in dev/test).
pub const QUEUE_ATTEMPTS_DEV: u32 = 1;
/// Base of the job queue's exponential backoff, in seconds.
pub const QUEUE_BACKOFF_BASE_SECS: u64 = 5;
/// Fan-out per-subscriber bounded queue depth.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

/// Job queue name the producer enqueues onto.
pub const TRANSCODE_QUEUE: &str = "video-processing";
/// Event bus topic the worker publishes status events on.
pub const STATUS_TOPIC: &str = "video:status";
