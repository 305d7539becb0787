//! Item completion coordinator.
//!
//! The single place where item completion happens and where the plan's
//! automatic edges (`accepted -> in_progress`, `in_progress -> completed`)
//! fire. Two triggers: a clinical episode referencing a plan item, and a
//! manual administrative completion with no episode.
//!
//! `link_episode_to_item` is retry-safe: the upstream episode-creation call
//! may be retried after a timeout, so a duplicate link of the same episode
//! is a no-op, never an error.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use molar_db::models::{ItemState, PlanItem, PlanState, TreatmentPlan};
use molar_db::queries::items::{self as item_db, PlanProgress};
use molar_db::queries::plans as plan_db;

use crate::lifecycle;
use crate::{PlanError, PlanResult};

/// Result of a completion trigger: the item, the owning plan (possibly
/// auto-advanced), and the plan's item progress after the update.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub item: PlanItem,
    pub plan: TreatmentPlan,
    pub progress: PlanProgress,
}

/// What caused the completion.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    Episode {
        episode_id: Uuid,
        date: Option<DateTime<Utc>>,
    },
    Manual,
}

/// Complete an item because a clinical episode realized it.
///
/// Idempotent per episode: linking the same episode twice returns the
/// current state unchanged. Linking a second, different episode fails with
/// `EpisodeLinkConflict`.
pub async fn link_episode_to_item(
    pool: &PgPool,
    item_id: Uuid,
    episode_id: Uuid,
    date: Option<DateTime<Utc>>,
) -> PlanResult<CompletionOutcome> {
    complete(pool, item_id, Trigger::Episode { episode_id, date }).await
}

/// Complete an item by administrative action, with no episode.
///
/// Permitted only while the plan is accepted or in progress. Completing an
/// already-completed item is a no-op.
pub async fn complete_item_manually(pool: &PgPool, item_id: Uuid) -> PlanResult<CompletionOutcome> {
    complete(pool, item_id, Trigger::Manual).await
}

async fn complete(pool: &PgPool, item_id: Uuid, trigger: Trigger) -> PlanResult<CompletionOutcome> {
    let mut tx = pool.begin().await?;

    // Resolve the owning plan, then take locks in the same order as item
    // management: plan row first, item row second.
    let plan_id = item_db::get_item(&mut *tx, item_id)
        .await?
        .ok_or_else(|| PlanError::item_not_found(item_id))?
        .plan_id;

    let plan = plan_db::get_plan_for_update(&mut *tx, plan_id)
        .await?
        .ok_or_else(|| PlanError::plan_not_found(plan_id))?;
    let item = item_db::get_item_for_update(&mut *tx, item_id)
        .await?
        .ok_or_else(|| PlanError::item_not_found(item_id))?;

    // Idempotence checks come before every guard so that retries stay safe
    // even after the plan has moved on.
    match trigger {
        Trigger::Episode { episode_id, .. } => {
            if let Some(linked) = item.episode_id {
                if linked == episode_id {
                    let progress = item_db::get_plan_progress(&mut *tx, plan_id).await?;
                    tx.commit().await?;
                    return Ok(CompletionOutcome {
                        item,
                        plan,
                        progress,
                    });
                }
                return Err(PlanError::EpisodeLinkConflict {
                    item_id,
                    linked_episode_id: linked,
                });
            }
            if item.state == ItemState::Completed {
                // Manually completed earlier; record the link, leave state
                // and realization time alone.
                item_db::link_episode(&mut *tx, item_id, episode_id).await?;
                let item = item_db::get_item(&mut *tx, item_id)
                    .await?
                    .ok_or_else(|| PlanError::item_not_found(item_id))?;
                let progress = item_db::get_plan_progress(&mut *tx, plan_id).await?;
                tx.commit().await?;
                tracing::info!(
                    item_id = %item_id,
                    episode_id = %episode_id,
                    "episode linked to already-completed item"
                );
                return Ok(CompletionOutcome {
                    item,
                    plan,
                    progress,
                });
            }
        }
        Trigger::Manual => {
            if item.state == ItemState::Completed {
                let progress = item_db::get_plan_progress(&mut *tx, plan_id).await?;
                tx.commit().await?;
                return Ok(CompletionOutcome {
                    item,
                    plan,
                    progress,
                });
            }
        }
    }

    if !plan.state.is_active() {
        return Err(PlanError::PlanLocked { state: plan.state });
    }

    let (realized_date, episode_id) = match trigger {
        Trigger::Episode { episode_id, date } => (date.unwrap_or_else(Utc::now), Some(episode_id)),
        Trigger::Manual => (Utc::now(), None),
    };

    let rows = item_db::complete_item(&mut *tx, item_id, realized_date, episode_id).await?;
    if rows == 0 {
        return Err(PlanError::ConcurrentModification {
            entity: "item",
            id: item_id,
        });
    }

    let item = item_db::get_item(&mut *tx, item_id)
        .await?
        .ok_or_else(|| PlanError::item_not_found(item_id))?;
    let progress = item_db::get_plan_progress(&mut *tx, plan_id).await?;

    // Drive the plan's automatic edges, still under the plan row lock.
    let mut plan = plan;
    if plan.state == PlanState::Accepted {
        plan = lifecycle::advance_to_in_progress(&mut *tx, plan_id).await?;
    }
    if progress.is_complete() {
        plan = lifecycle::advance_to_completed(&mut *tx, plan_id).await?;
    }

    tx.commit().await?;

    tracing::info!(
        plan_id = %plan_id,
        item_id = %item_id,
        plan_state = %plan.state,
        completed = progress.completed,
        total = progress.total,
        "item completed"
    );

    Ok(CompletionOutcome {
        item,
        plan,
        progress,
    })
}
