use crate::error::AppError;
use sqlx::PgPool;
use uuid::Uuid;

/// Segment rows themselves are written by the out-of-scope worker (§3.3);
/// this is the one query this service needs against that table — backing
/// the `ready ⇒ ∃ segment` invariant check in `LifecycleController::confirm_ready`.
pub async fn exists_for_video(pool: &PgPool, video_id: Uuid) -> Result<bool, AppError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM segments WHERE video_id = $1)",
    )
    .bind(video_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}
