//! Database query functions for the `treatment_plans` table.
//!
//! State-changing updates are conditional on the expected current state
//! (optimistic locking) and return the updated row; `None` means the plan
//! was missing or not in the expected state, and the caller refetches to
//! classify. Every write bumps `version` and `updated_at`.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{PlanPriority, TreatmentPlan};

/// Insert a new plan row in `draft` state. Returns the inserted plan with
/// server-generated defaults (id, timestamps, version).
pub async fn insert_plan<'c>(
    exec: impl PgExecutor<'c>,
    patient_id: Uuid,
    practitioner_id: Uuid,
    title: &str,
    description: &str,
    priority: PlanPriority,
    internal_notes: &str,
) -> sqlx::Result<TreatmentPlan> {
    sqlx::query_as::<_, TreatmentPlan>(
        "INSERT INTO treatment_plans \
             (patient_id, practitioner_id, title, description, priority, internal_notes) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(patient_id)
    .bind(practitioner_id)
    .bind(title)
    .bind(description)
    .bind(priority)
    .bind(internal_notes)
    .fetch_one(exec)
    .await
}

/// Fetch a plan by its ID.
pub async fn get_plan<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
) -> sqlx::Result<Option<TreatmentPlan>> {
    sqlx::query_as::<_, TreatmentPlan>("SELECT * FROM treatment_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(exec)
        .await
}

/// Fetch a plan by its ID, taking a row lock for the rest of the
/// transaction. Serializes item mutation and completion against the plan.
pub async fn get_plan_for_update<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
) -> sqlx::Result<Option<TreatmentPlan>> {
    sqlx::query_as::<_, TreatmentPlan>("SELECT * FROM treatment_plans WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(exec)
        .await
}

/// List plans, newest first, optionally filtered to one patient.
pub async fn list_plans<'c>(
    exec: impl PgExecutor<'c>,
    patient_id: Option<Uuid>,
) -> sqlx::Result<Vec<TreatmentPlan>> {
    match patient_id {
        Some(patient) => {
            sqlx::query_as::<_, TreatmentPlan>(
                "SELECT * FROM treatment_plans WHERE patient_id = $1 ORDER BY created_at DESC",
            )
            .bind(patient)
            .fetch_all(exec)
            .await
        }
        None => {
            sqlx::query_as::<_, TreatmentPlan>(
                "SELECT * FROM treatment_plans ORDER BY created_at DESC",
            )
            .fetch_all(exec)
            .await
        }
    }
}

// -----------------------------------------------------------------------
// Lifecycle transitions (one conditional UPDATE per edge)
// -----------------------------------------------------------------------

/// `draft -> presented`. The EXISTS clause makes the non-empty-item guard
/// atomic with the transition. Sets `presented_at`.
pub async fn present_plan<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
) -> sqlx::Result<Option<TreatmentPlan>> {
    sqlx::query_as::<_, TreatmentPlan>(
        "UPDATE treatment_plans \
         SET state = 'presented', presented_at = now(), \
             updated_at = now(), version = version + 1 \
         WHERE id = $1 AND state = 'draft' \
           AND EXISTS (SELECT 1 FROM plan_items WHERE plan_id = $1) \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(exec)
    .await
}

/// `presented -> accepted`. Sets `accepted_at`; from here on the item set
/// is immutable.
pub async fn accept_plan<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
) -> sqlx::Result<Option<TreatmentPlan>> {
    sqlx::query_as::<_, TreatmentPlan>(
        "UPDATE treatment_plans \
         SET state = 'accepted', accepted_at = now(), \
             updated_at = now(), version = version + 1 \
         WHERE id = $1 AND state = 'presented' \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(exec)
    .await
}

/// `draft | presented -> rejected`. Stores the (possibly empty) reason.
pub async fn reject_plan<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
    reason: &str,
) -> sqlx::Result<Option<TreatmentPlan>> {
    sqlx::query_as::<_, TreatmentPlan>(
        "UPDATE treatment_plans \
         SET state = 'rejected', rejection_reason = $2, \
             updated_at = now(), version = version + 1 \
         WHERE id = $1 AND state IN ('draft', 'presented') \
         RETURNING *",
    )
    .bind(id)
    .bind(reason)
    .fetch_optional(exec)
    .await
}

/// `accepted | in_progress -> cancelled`. Stores the reason and sets
/// `cancelled_at`. The non-empty-reason guard lives in the engine.
pub async fn cancel_plan<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
    reason: &str,
) -> sqlx::Result<Option<TreatmentPlan>> {
    sqlx::query_as::<_, TreatmentPlan>(
        "UPDATE treatment_plans \
         SET state = 'cancelled', cancellation_reason = $2, cancelled_at = now(), \
             updated_at = now(), version = version + 1 \
         WHERE id = $1 AND state IN ('accepted', 'in_progress') \
         RETURNING *",
    )
    .bind(id)
    .bind(reason)
    .fetch_optional(exec)
    .await
}

/// `accepted -> in_progress`. Coordinator-only edge, fired the first time
/// an item leaves `pending`.
pub async fn advance_plan_in_progress<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
) -> sqlx::Result<Option<TreatmentPlan>> {
    sqlx::query_as::<_, TreatmentPlan>(
        "UPDATE treatment_plans \
         SET state = 'in_progress', updated_at = now(), version = version + 1 \
         WHERE id = $1 AND state = 'accepted' \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(exec)
    .await
}

/// `in_progress -> completed`. Coordinator-only edge, fired when every item
/// has completed. Sets `completed_at`.
pub async fn advance_plan_completed<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
) -> sqlx::Result<Option<TreatmentPlan>> {
    sqlx::query_as::<_, TreatmentPlan>(
        "UPDATE treatment_plans \
         SET state = 'completed', completed_at = now(), \
             updated_at = now(), version = version + 1 \
         WHERE id = $1 AND state = 'in_progress' \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(exec)
    .await
}
