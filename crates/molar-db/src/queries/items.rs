//! Database query functions for the `plan_items` table.
//!
//! The price snapshot columns are written once at insert and never touched
//! again; no query here (or anywhere else in this crate) joins items
//! against catalog data, so stored prices cannot drift with the catalog.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::PlanItem;

/// Frozen price components for a new item, computed by the pricing
/// calculator at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceColumns {
    pub service: Decimal,
    pub fixed_materials: Decimal,
    pub material: Decimal,
    pub total: Decimal,
}

/// Insert a new item row in `pending` state at the given position.
///
/// Callers hold a row lock on the owning plan so concurrent inserts cannot
/// compute the same position; `UNIQUE (plan_id, position)` backstops that.
#[allow(clippy::too_many_arguments)]
pub async fn insert_item<'c>(
    exec: impl PgExecutor<'c>,
    plan_id: Uuid,
    service_id: Uuid,
    material_id: Option<Uuid>,
    position: i32,
    notes: &str,
    estimated_date: Option<NaiveDate>,
    prices: PriceColumns,
) -> sqlx::Result<PlanItem> {
    sqlx::query_as::<_, PlanItem>(
        "INSERT INTO plan_items \
             (plan_id, service_id, material_id, position, notes, estimated_date, \
              price_service, price_fixed_materials, price_material, price_total) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(service_id)
    .bind(material_id)
    .bind(position)
    .bind(notes)
    .bind(estimated_date)
    .bind(prices.service)
    .bind(prices.fixed_materials)
    .bind(prices.material)
    .bind(prices.total)
    .fetch_one(exec)
    .await
}

/// Fetch a single item by ID.
pub async fn get_item<'c>(exec: impl PgExecutor<'c>, id: Uuid) -> sqlx::Result<Option<PlanItem>> {
    sqlx::query_as::<_, PlanItem>("SELECT * FROM plan_items WHERE id = $1")
        .bind(id)
        .fetch_optional(exec)
        .await
}

/// Fetch a single item by ID, taking a row lock for the rest of the
/// transaction.
pub async fn get_item_for_update<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
) -> sqlx::Result<Option<PlanItem>> {
    sqlx::query_as::<_, PlanItem>("SELECT * FROM plan_items WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(exec)
        .await
}

/// List all items for a plan in presentation order.
pub async fn list_items_for_plan<'c>(
    exec: impl PgExecutor<'c>,
    plan_id: Uuid,
) -> sqlx::Result<Vec<PlanItem>> {
    sqlx::query_as::<_, PlanItem>(
        "SELECT * FROM plan_items WHERE plan_id = $1 ORDER BY position ASC",
    )
    .bind(plan_id)
    .fetch_all(exec)
    .await
}

/// Count the items in a plan.
pub async fn count_items<'c>(exec: impl PgExecutor<'c>, plan_id: Uuid) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM plan_items WHERE plan_id = $1")
        .bind(plan_id)
        .fetch_one(exec)
        .await?;

    Ok(row.0)
}

/// Delete an item, conditional on it still being `pending`.
pub async fn delete_item<'c>(exec: impl PgExecutor<'c>, id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM plan_items WHERE id = $1 AND state = 'pending'")
        .bind(id)
        .execute(exec)
        .await?;

    Ok(result.rows_affected())
}

/// Patch the free-form fields of an item, guarded by its version token.
///
/// `notes` and `estimated_date` are the only fields mutable after creation;
/// `None` leaves the stored value unchanged. Returns the number of rows
/// affected (0 means the item was missing or the version was stale).
pub async fn edit_item_fields<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
    expected_version: i32,
    notes: Option<&str>,
    estimated_date: Option<NaiveDate>,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_items \
         SET notes = COALESCE($3, notes), \
             estimated_date = COALESCE($4, estimated_date), \
             version = version + 1 \
         WHERE id = $1 AND version = $2",
    )
    .bind(id)
    .bind(expected_version)
    .bind(notes)
    .bind(estimated_date)
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}

/// Mark an item completed, recording the realization time and (for the
/// episode path) the realizing episode. Conditional on the item not
/// already being completed.
pub async fn complete_item<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
    realized_date: DateTime<Utc>,
    episode_id: Option<Uuid>,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_items \
         SET state = 'completed', realized_date = $2, \
             episode_id = COALESCE($3, episode_id), version = version + 1 \
         WHERE id = $1 AND state != 'completed'",
    )
    .bind(id)
    .bind(realized_date)
    .bind(episode_id)
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}

/// Record an episode link on an already-completed, unlinked item without
/// touching its state or realization time.
pub async fn link_episode<'c>(
    exec: impl PgExecutor<'c>,
    id: Uuid,
    episode_id: Uuid,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_items \
         SET episode_id = $2, version = version + 1 \
         WHERE id = $1 AND episode_id IS NULL",
    )
    .bind(id)
    .bind(episode_id)
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}

/// Item counts by state for a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanProgress {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub total: i64,
}

impl PlanProgress {
    /// Share of items completed, 0-100. An empty plan reports 0.
    pub fn percent_complete(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed * 100) / self.total) as u8
    }

    /// Whether every item has completed.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// Get a summary of item counts by state for a given plan.
pub async fn get_plan_progress<'c>(
    exec: impl PgExecutor<'c>,
    plan_id: Uuid,
) -> sqlx::Result<PlanProgress> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT state::text, COUNT(*) as cnt \
         FROM plan_items \
         WHERE plan_id = $1 \
         GROUP BY state",
    )
    .bind(plan_id)
    .fetch_all(exec)
    .await?;

    let mut progress = PlanProgress::default();
    for (state, count) in &rows {
        match state.as_str() {
            "pending" => progress.pending = *count,
            "in_progress" => progress.in_progress = *count,
            "completed" => progress.completed = *count,
            _ => {}
        }
        progress.total += count;
    }
    Ok(progress)
}
