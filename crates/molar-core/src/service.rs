//! Plan-level operations: creation and read access.
//!
//! State changes live in [`crate::lifecycle`] and [`crate::coordinator`];
//! this module only creates draft plans and assembles read views.

use sqlx::PgPool;
use uuid::Uuid;

use molar_db::models::{PlanItem, PlanPriority, TreatmentPlan};
use molar_db::queries::items::{self as item_db, PlanProgress};
use molar_db::queries::plans as plan_db;

use crate::{PlanError, PlanResult};

/// Request to create a new draft plan.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: PlanPriority,
    pub internal_notes: String,
}

impl NewPlan {
    pub fn new(patient_id: Uuid, practitioner_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            patient_id,
            practitioner_id,
            title: title.into(),
            description: String::new(),
            priority: PlanPriority::Medium,
            internal_notes: String::new(),
        }
    }
}

/// Create a plan in `draft` state with no items.
pub async fn create_plan(pool: &PgPool, new_plan: NewPlan) -> PlanResult<TreatmentPlan> {
    if new_plan.title.trim().is_empty() {
        return Err(PlanError::validation("a plan title is required"));
    }

    let plan = plan_db::insert_plan(
        pool,
        new_plan.patient_id,
        new_plan.practitioner_id,
        &new_plan.title,
        &new_plan.description,
        new_plan.priority,
        &new_plan.internal_notes,
    )
    .await?;

    tracing::info!(
        plan_id = %plan.id,
        patient_id = %plan.patient_id,
        "plan created"
    );

    Ok(plan)
}

/// List plans, optionally filtered to one patient, newest first.
pub async fn list_plans(
    pool: &PgPool,
    patient_id: Option<Uuid>,
) -> PlanResult<Vec<TreatmentPlan>> {
    Ok(plan_db::list_plans(pool, patient_id).await?)
}

/// Fetch a single plan.
pub async fn get_plan(pool: &PgPool, plan_id: Uuid) -> PlanResult<TreatmentPlan> {
    plan_db::get_plan(pool, plan_id)
        .await?
        .ok_or_else(|| PlanError::plan_not_found(plan_id))
}

/// Fetch a plan together with its items in presentation order.
pub async fn get_plan_with_items(
    pool: &PgPool,
    plan_id: Uuid,
) -> PlanResult<(TreatmentPlan, Vec<PlanItem>)> {
    let plan = get_plan(pool, plan_id).await?;
    let items = item_db::list_items_for_plan(pool, plan_id).await?;
    Ok((plan, items))
}

/// Item counts by state for a plan.
pub async fn plan_progress(pool: &PgPool, plan_id: Uuid) -> PlanResult<PlanProgress> {
    // Surface NotFound for unknown plans instead of an all-zero summary.
    let _ = get_plan(pool, plan_id).await?;
    Ok(item_db::get_plan_progress(pool, plan_id).await?)
}
