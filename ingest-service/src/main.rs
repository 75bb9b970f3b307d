use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use db_pool::{create_pool as create_pg_pool, DbConfig as DbPoolConfig};
use ingest_service::bus::{BusConsumerConfig, StatusBusConsumer};
use ingest_service::cache::{MediaCache, VideoCache};
use ingest_service::collector::AbandonedUploadCollector;
use ingest_service::fanout::FanoutService;
use ingest_service::handlers;
use ingest_service::lifecycle::LifecycleController;
use ingest_service::metrics;
use ingest_service::middleware::{RateLimitMiddleware, RequestMetrics};
use ingest_service::object_store::{ObjectStore, S3ObjectStore};
use ingest_service::sessions::SessionManager;
use ingest_service::Config;
use rdkafka::producer::FutureProducer;
use rdkafka::ClientConfig;
use redis::aio::ConnectionManager;
use std::io;
use std::sync::Arc;
use tokio::sync::watch;
use transactional_outbox::{KafkaOutboxPublisher, OutboxProcessor, SqlxOutboxRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting ingest-service");

    dotenvy::dotenv().ok();
    let config = Config::from_env().map_err(|e| io::Error::other(e.to_string()))?;

    let mut db_config = DbPoolConfig::for_service("ingest-service");
    db_config.database_url = config.database.url.clone();
    db_config.max_connections = config.database.max_connections;
    db_config.log_config();

    let db_pool = create_pg_pool(db_config)
        .await
        .map_err(|e| io::Error::other(format!("database connection failed: {e}")))?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .map_err(|e| io::Error::other(format!("migration failed: {e}")))?;
    tracing::info!("database migrations applied");

    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&config.s3).await);

    let redis_client = redis::Client::open(config.cache.redis_url.clone())
        .map_err(|e| io::Error::other(format!("invalid redis url: {e}")))?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .map_err(|e| io::Error::other(format!("redis connection failed: {e}")))?;
    tracing::info!("redis connection manager initialized");

    let cache = MediaCache::new(redis_conn.clone(), Some(config.cache.ttl_seconds));

    let outbox_repo = Arc::new(SqlxOutboxRepository::new(db_pool.clone()));

    let kafka_producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &config.kafka.brokers)
        .set("enable.idempotence", "true")
        .set("acks", "all")
        .set("max.in.flight.requests.per.connection", "5")
        .create()
        .map_err(|e| io::Error::other(format!("kafka producer init failed: {e}")))?;
    let outbox_publisher = Arc::new(KafkaOutboxPublisher::new(
        kafka_producer,
        config.kafka.outbox_topic_prefix.clone(),
    ));

    let outbox_processor = OutboxProcessor::new(
        outbox_repo.clone(),
        outbox_publisher,
        100,
        std::time::Duration::from_secs(config.upload.queue_backoff_base_secs.max(1)),
        config.upload.queue_attempts as i32,
    );
    tokio::spawn(async move {
        if let Err(e) = outbox_processor.start().await {
            tracing::error!(error = %e, "outbox processor exited");
        }
    });

    let lifecycle = Arc::new(LifecycleController::new(
        db_pool.clone(),
        outbox_repo.clone(),
        Arc::new(cache.clone()) as Arc<dyn VideoCache>,
    ));
    let sessions = web::Data::new(SessionManager::new(
        db_pool.clone(),
        store.clone(),
        lifecycle.clone(),
        config.upload.clone(),
    ));

    let fanout = Arc::new(FanoutService::new(config.upload.subscriber_queue_depth));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let bus_config = BusConsumerConfig {
        brokers: config.kafka.brokers.clone(),
        topic: config.kafka.status_topic.clone(),
        group_id: config.kafka.status_consumer_group.clone(),
    };
    let bus_fanout = fanout.clone();
    let bus_lifecycle = lifecycle.clone();
    tokio::spawn(async move {
        match StatusBusConsumer::new(&bus_config, bus_fanout, bus_lifecycle, shutdown_rx) {
            Ok(mut consumer) => consumer.run().await,
            Err(e) => tracing::error!(error = %e, "status bus consumer failed to start"),
        }
    });

    let collector = Arc::new(AbandonedUploadCollector::new(
        db_pool.clone(),
        store.clone(),
        config.upload.clone(),
    ));
    collector.spawn();

    let app_port = config.app.port;
    let cors_origins = config.cors.allowed_origins.clone();
    let addr = format!("0.0.0.0:{app_port}");
    tracing::info!(%addr, "binding http server");

    let db_pool_data = web::Data::new(db_pool.clone());
    let store_data = web::Data::new(store.clone());
    let fanout_data = web::Data::new(fanout.clone());
    let lifecycle_data = web::Data::new(lifecycle.clone());
    let cache_data = web::Data::new(Arc::new(cache.clone()));

    HttpServer::new(move || {
        let mut cors = Cors::default();
        for origin in &cors_origins {
            if origin == "*" {
                cors = cors.allow_any_origin();
            } else {
                cors = cors.allowed_origin(origin);
            }
        }
        cors = cors.allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .app_data(db_pool_data.clone())
            .app_data(sessions.clone())
            .app_data(store_data.clone())
            .app_data(fanout_data.clone())
            .app_data(lifecycle_data.clone())
            .app_data(cache_data.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .wrap(RequestMetrics)
            .wrap(RateLimitMiddleware)
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .route("/health", web::get().to(|| async { HttpResponse::Ok().finish() }))
            .route(
                "/api/v1/health/ready",
                web::get().to(|| async { HttpResponse::Ok().finish() }),
            )
            .route(
                "/api/v1/health/live",
                web::get().to(|| async { HttpResponse::Ok().finish() }),
            )
            .route("/uploads", web::post().to(handlers::start_upload))
            .route(
                "/uploads/{id}/refresh-urls",
                web::post().to(handlers::refresh_urls),
            )
            .route(
                "/uploads/{id}/part-checksums",
                web::patch().to(handlers::register_part_checksums),
            )
            .route(
                "/uploads/{id}/complete",
                web::post().to(handlers::complete_upload),
            )
            .route("/uploads/{id}/abort", web::post().to(handlers::abort_upload))
            .route(
                "/uploads/{id}/status",
                web::get().to(handlers::upload_status),
            )
            .route("/videos", web::get().to(handlers::list_videos))
            .route("/videos/{id}", web::get().to(handlers::get_video))
            .route("/videos/{id}", web::delete().to(handlers::delete_video))
            .route("/ws", web::get().to(handlers::ws_handler))
    })
    .bind(&addr)?
    .run()
    .await
}
