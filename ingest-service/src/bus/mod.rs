//! Event Bus consumer — §4.6. Subscribes to `video:status`, demultiplexes
//! each message to the fan-out service, and drives the lifecycle
//! controller's worker callbacks (`processing -> ready|failed`).

use crate::fanout::FanoutService;
use crate::lifecycle::LifecycleController;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::ClientConfig;
use resilience::CircuitBreaker;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use video_core::{StatusEvent, StatusEventKind};

#[derive(Clone, Debug)]
pub struct BusConsumerConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

pub struct StatusBusConsumer {
    consumer: StreamConsumer,
    fanout: Arc<FanoutService>,
    lifecycle: Arc<LifecycleController>,
    shutdown_rx: watch::Receiver<bool>,
    lifecycle_breaker: CircuitBreaker,
}

impl StatusBusConsumer {
    pub fn new(
        config: &BusConsumerConfig,
        fanout: Arc<FanoutService>,
        lifecycle: Arc<LifecycleController>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "5000")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()?;

        consumer.subscribe(&[&config.topic])?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "status bus consumer initialized"
        );

        Ok(StatusBusConsumer {
            consumer,
            fanout,
            lifecycle,
            shutdown_rx,
            lifecycle_breaker: CircuitBreaker::new(resilience::presets::kafka_config().circuit_breaker),
        })
    }

    pub async fn run(&mut self) {
        use futures::StreamExt;

        let mut message_stream = self.consumer.stream();

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("shutdown signal received, stopping status bus consumer");
                        break;
                    }
                }

                message = message_stream.next() => {
                    match message {
                        Some(Ok(msg)) => self.process_message(&msg).await,
                        Some(Err(e)) => {
                            error!(error = %e, "kafka consumer error, continuing");
                        }
                        None => {
                            warn!("status bus message stream ended unexpectedly");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn process_message<M: Message>(&self, msg: &M) {
        let Some(payload) = msg.payload() else {
            debug!("empty status event payload, skipping");
            return;
        };

        let event: StatusEvent = match serde_json::from_slice(payload) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "failed to parse status event, skipping");
                return;
            }
        };

        match event.status {
            StatusEventKind::Processing => {
                // Informational only — the controller already moved the
                // video to `processing` at completion time.
            }
            StatusEventKind::Ready => {
                // Worker is expected to have already written manifest_url +
                // derived metadata via its own write path before publishing
                // this event; `confirm_ready` only flips status once those
                // fields are actually present.
                match self
                    .lifecycle_breaker
                    .call(|| self.lifecycle.confirm_ready(event.video_id))
                    .await
                {
                    Ok(true) => debug!(video_id = %event.video_id, "video confirmed ready"),
                    Ok(false) => warn!(
                        video_id = %event.video_id,
                        "ready event arrived but video not in processing with derived fields set"
                    ),
                    Err(e) => error!(video_id = %event.video_id, error = %e, "failed to confirm ready"),
                }
            }
            StatusEventKind::Failed => {
                let reason = event.error.as_deref().unwrap_or("worker reported failure");
                if let Err(e) = self
                    .lifecycle_breaker
                    .call(|| self.lifecycle.fail(event.video_id, reason))
                    .await
                {
                    error!(video_id = %event.video_id, error = %e, "failed to record worker failure");
                }
            }
        }

        self.fanout.publish(event);
    }
}
