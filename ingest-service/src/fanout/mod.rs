//! Status Fan-out Service — §4.6. Maintains `topic_key -> subscribers`,
//! topic_key being `video:<id>`. Each subscriber gets a bounded queue
//! (default depth 64); a subscriber that falls behind has its oldest
//! messages dropped rather than blocking publish.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, IntCounter};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;
use video_core::StatusEvent;

static SLOW_CONSUMER_DROPS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ingest_fanout_slow_consumer_drops_total",
        "Status events dropped because a subscriber's queue overflowed"
    )
    .expect("failed to register slow_consumer metric")
});

/// One broadcast channel per topic. `tokio::broadcast` already gives us the
/// drop-oldest-on-overflow semantics the fan-out contract needs: once a
/// receiver falls more than `capacity` messages behind, its next `recv()`
/// returns `Lagged(n)` and resumes from the oldest message still buffered.
/// Per-subscriber ordering is preserved because each receiver keeps its own
/// read cursor into the shared ring buffer.
pub struct FanoutService {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<StatusEvent>>>,
}

pub struct Subscription {
    pub topic_key: String,
    receiver: broadcast::Receiver<StatusEvent>,
}

impl Subscription {
    /// Awaits the next event, transparently recording and skipping past any
    /// drops rather than surfacing the lag to the caller.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    SLOW_CONSUMER_DROPS.inc_by(skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl FanoutService {
    pub fn new(capacity: usize) -> Self {
        FanoutService {
            capacity,
            topics: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe_video(&self, video_id: Uuid) -> Subscription {
        self.subscribe(format!("video:{video_id}"))
    }

    fn subscribe(&self, topic_key: String) -> Subscription {
        let mut topics = self.topics.lock().unwrap();
        let sender = topics
            .entry(topic_key.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();

        Subscription {
            topic_key,
            receiver: sender.subscribe(),
        }
    }

    /// Deliver a bus message to every subscriber of its topic. A topic with
    /// no current subscribers is a silent no-op — fan-out failures never
    /// fail the publisher's path (§7).
    pub fn publish(&self, event: StatusEvent) {
        let topic_key = event.topic_key();
        let mut topics = self.topics.lock().unwrap();

        let Some(sender) = topics.get(&topic_key) else {
            return;
        };
        let _ = sender.send(event);

        if sender.receiver_count() == 0 {
            topics.remove(&topic_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use video_core::StatusEventKind;

    fn sample_event(video_id: Uuid) -> StatusEvent {
        StatusEvent {
            video_id,
            status: StatusEventKind::Ready,
            error: None,
            ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_to_subscriber_of_matching_topic() {
        let service = FanoutService::new(64);
        let video_id = Uuid::new_v4();
        let mut sub = service.subscribe_video(video_id);

        service.publish(sample_event(video_id));

        let event = sub.recv().await.expect("event delivered");
        assert_eq!(event.video_id, video_id);
    }

    #[tokio::test]
    async fn does_not_deliver_to_other_topics() {
        let service = FanoutService::new(64);
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut sub = service.subscribe_video(watched);

        service.publish(sample_event(other));

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await;
        assert!(result.is_err(), "no event should have arrived");
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_preserves_fifo_for_the_rest() {
        let service = FanoutService::new(4);
        let video_id = Uuid::new_v4();
        let mut sub = service.subscribe_video(video_id);

        for _ in 0..10 {
            service.publish(sample_event(video_id));
        }

        // The lag is surfaced and skipped transparently; whatever survives
        // must still come out in publish order (trivially true here since
        // all events target the same video, but the cursor must advance
        // monotonically rather than panic or reorder).
        let mut received = 0;
        while tokio::time::timeout(std::time::Duration::from_millis(20), sub.recv())
            .await
            .ok()
            .flatten()
            .is_some()
        {
            received += 1;
        }
        assert!(received > 0 && received <= 10);
    }
}
