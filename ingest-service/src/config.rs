use std::time::Duration;

/// Top-level process configuration, assembled once at startup from the
/// environment and handed to every component as `web::Data<Config>`.
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub s3: S3Config,
    pub kafka: KafkaConfig,
    pub cors: CorsConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket_name: String,
    pub region: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub status_topic: String,
    pub status_consumer_group: String,
    pub outbox_topic_prefix: String,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Upload session tunables; defaults mirror the control-plane's configured
/// knobs (see `video_core::constants`) but remain independently overridable
/// per deployment.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_size: i64,
    pub multipart_threshold: i64,
    pub multipart_chunk_bytes: i64,
    pub max_multipart_parts: u32,
    pub presign_ttl_secs: i64,
    pub abandoned_ttl_hours: i64,
    pub collector_cadence_secs: u64,
    pub validation_parallelism: usize,
    pub queue_attempts: u32,
    pub queue_backoff_base_secs: u64,
    pub subscriber_queue_depth: usize,
}

impl UploadConfig {
    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs.max(0) as u64)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let is_prod = env == "production";

        Ok(Config {
            app: AppConfig {
                env,
                port: std::env::var("PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8080),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")?,
                max_connections: std::env::var("DB_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8),
            },
            cache: CacheConfig {
                redis_url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
                ttl_seconds: std::env::var("CACHE_TTL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            },
            s3: S3Config {
                bucket_name: std::env::var("S3_BUCKET_NAME")?,
                region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                aws_access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
                aws_secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
                endpoint_url: std::env::var("S3_ENDPOINT_URL").ok(),
            },
            kafka: KafkaConfig {
                brokers: std::env::var("KAFKA_BROKERS")
                    .unwrap_or_else(|_| "localhost:9092".to_string()),
                status_topic: std::env::var("KAFKA_STATUS_TOPIC")
                    .unwrap_or_else(|_| video_core::STATUS_TOPIC.to_string()),
                status_consumer_group: std::env::var("KAFKA_STATUS_CONSUMER_GROUP")
                    .unwrap_or_else(|_| "ingest-service-fanout".to_string()),
                outbox_topic_prefix: std::env::var("KAFKA_OUTBOX_TOPIC_PREFIX")
                    .unwrap_or_else(|_| "ingest".to_string()),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .ok()
                    .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_else(|| vec!["*".to_string()]),
            },
            upload: UploadConfig {
                max_file_size: env_i64("MAX_FILE_SIZE", video_core::MAX_FILE_SIZE),
                multipart_threshold: env_i64(
                    "MULTIPART_THRESHOLD",
                    video_core::MULTIPART_THRESHOLD,
                ),
                multipart_chunk_bytes: env_i64(
                    "MULTIPART_CHUNK_BYTES",
                    video_core::MULTIPART_CHUNK_BYTES,
                ),
                max_multipart_parts: std::env::var("MAX_MULTIPART_PARTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(video_core::MAX_MULTIPART_PARTS),
                presign_ttl_secs: env_i64("PRESIGN_TTL_S", video_core::PRESIGN_TTL_SECS),
                abandoned_ttl_hours: env_i64("ABANDONED_TTL_H", video_core::ABANDONED_TTL_HOURS),
                collector_cadence_secs: std::env::var("COLLECTOR_CADENCE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(video_core::COLLECTOR_CADENCE_SECS),
                validation_parallelism: std::env::var("VALIDATION_PARALLELISM")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(video_core::VALIDATION_PARALLELISM),
                queue_attempts: std::env::var("QUEUE_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(
                    if is_prod {
                        video_core::QUEUE_ATTEMPTS_PROD
                    } else {
                        video_core::QUEUE_ATTEMPTS_DEV
                    },
                ),
                queue_backoff_base_secs: std::env::var("QUEUE_BACKOFF_BASE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(video_core::QUEUE_BACKOFF_BASE_SECS),
                subscriber_queue_depth: std::env::var("SUBSCRIBER_QUEUE_DEPTH")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(video_core::SUBSCRIBER_QUEUE_DEPTH),
            },
        })
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
