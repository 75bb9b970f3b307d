use sqlx::{Postgres, Transaction};
use transactional_outbox::{OutboxEvent, OutboxRepository, OutboxResult};
use uuid::Uuid;
use video_core::TranscodeJobPayload;

/// Logical queue name from the job-dispatch contract. The outbox's own
/// topic-naming convention (`{prefix}.{aggregate}.events`) derives the
/// Kafka topic from this, so the two stay in lockstep without a separate
/// topic constant.
const TRANSCODE_AGGREGATE_TYPE: &str = "video";

fn transcode_event_type() -> String {
    format!("{}.enqueued", video_core::TRANSCODE_QUEUE)
}

/// Enqueue a transcode job as part of the same transaction that advances
/// the video to `processing`. Must never be called standalone — losing the
/// atomicity here is exactly the "stranded in processing" failure mode the
/// outbox pattern exists to prevent.
pub async fn enqueue_transcode_job(
    tx: &mut Transaction<'_, Postgres>,
    repo: &dyn OutboxRepository,
    video_id: Uuid,
    source_url: &str,
) -> OutboxResult<()> {
    let payload = TranscodeJobPayload {
        video_id,
        source_url: source_url.to_string(),
    };

    let event = OutboxEvent {
        id: Uuid::new_v4(),
        aggregate_type: TRANSCODE_AGGREGATE_TYPE.to_string(),
        aggregate_id: video_id,
        event_type: transcode_event_type(),
        payload: serde_json::to_value(&payload)?,
        metadata: None,
        created_at: chrono::Utc::now(),
        published_at: None,
        retry_count: 0,
        last_error: None,
    };

    repo.insert(tx, &event).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcode_event_type_carries_the_logical_queue_name() {
        assert_eq!(transcode_event_type(), "video-processing.enqueued");
    }
}
