//! Plan lifecycle state machine.
//!
//! Validates and executes plan state transitions, enforcing the allowed
//! edge graph, optimistic locking, and timestamp side effects. The
//! `accepted -> in_progress` and `in_progress -> completed` edges are
//! crate-internal: only the item completion coordinator fires them, as a
//! consequence of item-state changes.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use molar_db::models::{PlanState, TreatmentPlan};
use molar_db::queries::plans as db;

use crate::{PlanError, PlanResult};

/// The plan state machine.
///
/// Enforces the valid transition graph:
///
/// ```text
/// draft       -> presented    (present; requires a non-empty item set)
/// draft       -> rejected     (reject)
/// presented   -> accepted     (accept; freezes the item set)
/// presented   -> rejected     (reject)
/// accepted    -> in_progress  (coordinator only)
/// accepted    -> cancelled    (cancel; requires a reason)
/// in_progress -> completed    (coordinator only)
/// in_progress -> cancelled    (cancel; requires a reason)
/// ```
pub struct PlanStateMachine;

impl PlanStateMachine {
    /// Check whether a transition from `from` to `to` is a valid edge in
    /// the state graph.
    pub fn is_valid_transition(from: PlanState, to: PlanState) -> bool {
        matches!(
            (from, to),
            (PlanState::Draft, PlanState::Presented)
                | (PlanState::Draft, PlanState::Rejected)
                | (PlanState::Presented, PlanState::Accepted)
                | (PlanState::Presented, PlanState::Rejected)
                | (PlanState::Accepted, PlanState::InProgress)
                | (PlanState::Accepted, PlanState::Cancelled)
                | (PlanState::InProgress, PlanState::Completed)
                | (PlanState::InProgress, PlanState::Cancelled)
        )
    }
}

/// Classify a failed conditional transition by refetching the plan.
///
/// The conditional UPDATE matched no row, so either the plan does not exist
/// or its current state does not admit the attempted edge.
async fn classify_failure(
    pool: &PgPool,
    plan_id: Uuid,
    to: PlanState,
) -> PlanResult<TreatmentPlan> {
    let plan = db::get_plan(pool, plan_id)
        .await?
        .ok_or_else(|| PlanError::plan_not_found(plan_id))?;
    Err(PlanError::InvalidTransition {
        from: plan.state,
        to,
    })
}

/// Present a plan to the patient: `draft -> presented`.
///
/// Fails with `Validation` when the plan has no items yet; the transition
/// and the item-count guard are one atomic statement.
pub async fn present(pool: &PgPool, plan_id: Uuid) -> PlanResult<TreatmentPlan> {
    match db::present_plan(pool, plan_id).await? {
        Some(plan) => {
            tracing::info!(plan_id = %plan_id, "plan presented");
            Ok(plan)
        }
        None => {
            let plan = db::get_plan(pool, plan_id)
                .await?
                .ok_or_else(|| PlanError::plan_not_found(plan_id))?;
            if plan.state == PlanState::Draft {
                // The only way a draft plan fails the conditional update is
                // the EXISTS guard.
                return Err(PlanError::validation("add at least one procedure first"));
            }
            Err(PlanError::InvalidTransition {
                from: plan.state,
                to: PlanState::Presented,
            })
        }
    }
}

/// Record the patient's acceptance: `presented -> accepted`.
///
/// Sets `accepted_at`; from this point on the item set is immutable and
/// every stored price snapshot is final.
pub async fn accept(pool: &PgPool, plan_id: Uuid) -> PlanResult<TreatmentPlan> {
    match db::accept_plan(pool, plan_id).await? {
        Some(plan) => {
            tracing::info!(plan_id = %plan_id, "plan accepted, item set frozen");
            Ok(plan)
        }
        None => classify_failure(pool, plan_id, PlanState::Accepted).await,
    }
}

/// Record a rejection: `draft | presented -> rejected`.
///
/// The reason may be empty.
pub async fn reject(
    pool: &PgPool,
    plan_id: Uuid,
    reason: Option<&str>,
) -> PlanResult<TreatmentPlan> {
    match db::reject_plan(pool, plan_id, reason.unwrap_or_default()).await? {
        Some(plan) => {
            tracing::info!(plan_id = %plan_id, "plan rejected");
            Ok(plan)
        }
        None => classify_failure(pool, plan_id, PlanState::Rejected).await,
    }
}

/// Cancel an active plan: `accepted | in_progress -> cancelled`.
///
/// A non-empty reason is required.
pub async fn cancel(pool: &PgPool, plan_id: Uuid, reason: &str) -> PlanResult<TreatmentPlan> {
    if reason.trim().is_empty() {
        return Err(PlanError::validation("a cancellation reason is required"));
    }

    match db::cancel_plan(pool, plan_id, reason).await? {
        Some(plan) => {
            tracing::info!(plan_id = %plan_id, "plan cancelled");
            Ok(plan)
        }
        None => classify_failure(pool, plan_id, PlanState::Cancelled).await,
    }
}

/// Coordinator-only: `accepted -> in_progress`, fired the first time an
/// item leaves `pending`. Runs inside the coordinator's transaction, which
/// holds the plan row lock.
pub(crate) async fn advance_to_in_progress(
    conn: &mut PgConnection,
    plan_id: Uuid,
) -> PlanResult<TreatmentPlan> {
    match db::advance_plan_in_progress(&mut *conn, plan_id).await? {
        Some(plan) => {
            tracing::info!(plan_id = %plan_id, "plan advanced to in_progress");
            Ok(plan)
        }
        // The caller verified the state under a row lock, so a miss means
        // the lock was not actually held.
        None => Err(PlanError::ConcurrentModification {
            entity: "plan",
            id: plan_id,
        }),
    }
}

/// Coordinator-only: `in_progress -> completed`, fired when every item has
/// completed. Sets `completed_at`. Runs inside the coordinator's
/// transaction, which holds the plan row lock.
pub(crate) async fn advance_to_completed(
    conn: &mut PgConnection,
    plan_id: Uuid,
) -> PlanResult<TreatmentPlan> {
    match db::advance_plan_completed(&mut *conn, plan_id).await? {
        Some(plan) => {
            tracing::info!(plan_id = %plan_id, "plan completed");
            Ok(plan)
        }
        None => Err(PlanError::ConcurrentModification {
            entity: "plan",
            id: plan_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_edges_are_valid() {
        assert!(PlanStateMachine::is_valid_transition(
            PlanState::Draft,
            PlanState::Presented
        ));
        assert!(PlanStateMachine::is_valid_transition(
            PlanState::Draft,
            PlanState::Rejected
        ));
        assert!(PlanStateMachine::is_valid_transition(
            PlanState::Presented,
            PlanState::Accepted
        ));
        assert!(PlanStateMachine::is_valid_transition(
            PlanState::Presented,
            PlanState::Rejected
        ));
        assert!(PlanStateMachine::is_valid_transition(
            PlanState::Accepted,
            PlanState::Cancelled
        ));
        assert!(PlanStateMachine::is_valid_transition(
            PlanState::InProgress,
            PlanState::Cancelled
        ));
    }

    #[test]
    fn coordinator_edges_are_valid() {
        assert!(PlanStateMachine::is_valid_transition(
            PlanState::Accepted,
            PlanState::InProgress
        ));
        assert!(PlanStateMachine::is_valid_transition(
            PlanState::InProgress,
            PlanState::Completed
        ));
    }

    #[test]
    fn no_edge_leaves_a_terminal_state() {
        let all = [
            PlanState::Draft,
            PlanState::Presented,
            PlanState::Accepted,
            PlanState::InProgress,
            PlanState::Completed,
            PlanState::Rejected,
            PlanState::Cancelled,
        ];
        for terminal in [
            PlanState::Completed,
            PlanState::Rejected,
            PlanState::Cancelled,
        ] {
            for to in all {
                assert!(
                    !PlanStateMachine::is_valid_transition(terminal, to),
                    "unexpected edge {terminal} -> {to}"
                );
            }
        }
    }

    #[test]
    fn no_state_regression_edges() {
        // The graph only ever moves forward: nothing returns to draft or
        // presented.
        let all = [
            PlanState::Draft,
            PlanState::Presented,
            PlanState::Accepted,
            PlanState::InProgress,
            PlanState::Completed,
            PlanState::Rejected,
            PlanState::Cancelled,
        ];
        for from in all {
            assert!(!PlanStateMachine::is_valid_transition(from, PlanState::Draft));
        }
        for from in [
            PlanState::Accepted,
            PlanState::InProgress,
            PlanState::Completed,
        ] {
            assert!(!PlanStateMachine::is_valid_transition(
                from,
                PlanState::Presented
            ));
        }
    }

    #[test]
    fn skipping_presentation_is_invalid() {
        assert!(!PlanStateMachine::is_valid_transition(
            PlanState::Draft,
            PlanState::Accepted
        ));
        assert!(!PlanStateMachine::is_valid_transition(
            PlanState::Draft,
            PlanState::InProgress
        ));
        assert!(!PlanStateMachine::is_valid_transition(
            PlanState::Presented,
            PlanState::InProgress
        ));
        assert!(!PlanStateMachine::is_valid_transition(
            PlanState::Accepted,
            PlanState::Completed
        ));
    }
}
