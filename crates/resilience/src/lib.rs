/// Resilience patterns for the ingest control plane's external collaborators.
///
/// - **Circuit Breaker**: fail fast once a collaborator's error rate crosses
///   a threshold instead of piling up retries against it.
/// - **Timeout**: enforce a time limit on every external call.
/// - **Retry**: exponential backoff with jitter for transient failures.
/// - **Preset Configurations**: pre-tuned settings per collaborator type
///   (object storage, Kafka, database, Redis, external HTTP).
///
/// # Example: object-store call with circuit breaker
///
/// ```rust,no_run
/// use resilience::{presets, CircuitBreaker};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::object_storage_config();
///     let circuit_breaker = CircuitBreaker::new(config.circuit_breaker);
///
///     let result = circuit_breaker.call(|| async {
///         // presign / head / delete call here
///         Ok::<_, String>(())
///     }).await;
/// }
/// ```
pub mod circuit_breaker;
pub mod metrics;
pub mod presets;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use presets::{
    database_config, http_external_config, kafka_config, object_storage_config, redis_config,
    ServiceConfig,
};
pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
