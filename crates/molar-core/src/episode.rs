//! Adapter for episode-creation events from the clinical layer.
//!
//! An episode optionally references a plan item; the reference is what
//! drives item completion. An episode without one is free-standing and of
//! no interest to the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::PlanResult;
use crate::coordinator::{self, CompletionOutcome};

/// An episode-creation event as delivered by the episode gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeEvent {
    pub episode_id: Uuid,
    /// When the clinical work happened. Falls back to the processing time
    /// when absent.
    pub date: Option<DateTime<Utc>>,
    /// The plan item this episode realizes, if any.
    pub plan_item_id: Option<Uuid>,
}

/// React to an episode-creation event.
///
/// Returns `None` for free-standing episodes. Safe to call more than once
/// for the same event; the underlying link operation is idempotent.
pub async fn handle_episode(
    pool: &PgPool,
    event: &EpisodeEvent,
) -> PlanResult<Option<CompletionOutcome>> {
    let Some(item_id) = event.plan_item_id else {
        tracing::debug!(episode_id = %event.episode_id, "free-standing episode, nothing to do");
        return Ok(None);
    };

    coordinator::link_episode_to_item(pool, item_id, event.episode_id, event.date)
        .await
        .map(Some)
}
