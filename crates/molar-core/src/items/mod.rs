//! Item management: add, remove, and edit procedures on a DRAFT plan.
//!
//! Adding an item is the one place pricing runs (see [`crate::pricing`]);
//! changing an item's service or material is remove + re-add, never an
//! in-place recompute. Membership mutations require the plan to still be
//! in DRAFT; everything later fails with `PlanLocked`.

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use molar_db::models::{PlanItem, PlanState};
use molar_db::queries::items::{self as item_db, PriceColumns};
use molar_db::queries::plans as plan_db;

use crate::catalog::CatalogGateway;
use crate::pricing;
use crate::{PlanError, PlanResult};

/// Request to add one procedure to a draft plan.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub service_id: Uuid,
    pub material_id: Option<Uuid>,
    pub notes: String,
    pub estimated_date: Option<NaiveDate>,
}

impl NewItem {
    pub fn new(service_id: Uuid) -> Self {
        Self {
            service_id,
            material_id: None,
            notes: String::new(),
            estimated_date: None,
        }
    }

    pub fn with_material(mut self, material_id: Uuid) -> Self {
        self.material_id = Some(material_id);
        self
    }
}

/// Fields of an item that stay mutable after creation.
///
/// `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub notes: Option<String>,
    pub estimated_date: Option<NaiveDate>,
}

/// Add a priced item to a draft plan.
///
/// Resolves the service through the catalog gateway, computes the price
/// snapshot (exactly once, here), and appends the item at the next
/// position. The plan row is locked for the transaction, so concurrent
/// adds serialize and each gets a distinct position.
pub async fn add_item(
    pool: &PgPool,
    catalog: &dyn CatalogGateway,
    plan_id: Uuid,
    new_item: NewItem,
) -> PlanResult<PlanItem> {
    // Catalog access happens outside the transaction; it is an external
    // call and must not hold row locks.
    let service = catalog.service(new_item.service_id).await?;
    let snapshot = pricing::compute_snapshot(&service, new_item.material_id)?;

    let mut tx = pool.begin().await?;

    let plan = plan_db::get_plan_for_update(&mut *tx, plan_id)
        .await?
        .ok_or_else(|| PlanError::plan_not_found(plan_id))?;
    if plan.state != PlanState::Draft {
        return Err(PlanError::PlanLocked { state: plan.state });
    }

    let position = item_db::count_items(&mut *tx, plan_id).await? as i32 + 1;

    let item = item_db::insert_item(
        &mut *tx,
        plan_id,
        new_item.service_id,
        new_item.material_id,
        position,
        &new_item.notes,
        new_item.estimated_date,
        PriceColumns {
            service: snapshot.service,
            fixed_materials: snapshot.fixed_materials,
            material: snapshot.material,
            total: snapshot.total,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        plan_id = %plan_id,
        item_id = %item.id,
        service_id = %new_item.service_id,
        position = position,
        total = %item.price_total,
        "item added to plan"
    );

    Ok(item)
}

/// Remove a pending item from a draft plan.
pub async fn remove_item(pool: &PgPool, item_id: Uuid) -> PlanResult<()> {
    let mut tx = pool.begin().await?;

    let item = item_db::get_item(&mut *tx, item_id)
        .await?
        .ok_or_else(|| PlanError::item_not_found(item_id))?;

    let plan = plan_db::get_plan_for_update(&mut *tx, item.plan_id)
        .await?
        .ok_or_else(|| PlanError::plan_not_found(item.plan_id))?;
    if plan.state != PlanState::Draft {
        return Err(PlanError::PlanLocked { state: plan.state });
    }

    let rows = item_db::delete_item(&mut *tx, item_id).await?;
    if rows == 0 {
        // Deleted between our two reads, or no longer pending.
        return match item_db::get_item(&mut *tx, item_id).await? {
            None => Err(PlanError::item_not_found(item_id)),
            Some(_) => Err(PlanError::validation("only pending items can be removed")),
        };
    }

    tx.commit().await?;

    tracing::info!(plan_id = %item.plan_id, item_id = %item_id, "item removed from plan");
    Ok(())
}

/// Edit the free-form fields of an item (`notes`, `estimated_date`).
///
/// These are the only fields mutable after creation; service and material
/// are fixed at creation along with the price snapshot. Allowed until the
/// owning plan reaches a terminal state. Guarded by the item's version
/// token: a stale `expected_version` fails with `ConcurrentModification`
/// and the caller must refetch and retry.
pub async fn edit_item(
    pool: &PgPool,
    item_id: Uuid,
    expected_version: i32,
    patch: ItemPatch,
) -> PlanResult<PlanItem> {
    let mut tx = pool.begin().await?;

    let item = item_db::get_item(&mut *tx, item_id)
        .await?
        .ok_or_else(|| PlanError::item_not_found(item_id))?;

    let plan = plan_db::get_plan(&mut *tx, item.plan_id)
        .await?
        .ok_or_else(|| PlanError::plan_not_found(item.plan_id))?;
    if plan.state.is_terminal() {
        return Err(PlanError::PlanLocked { state: plan.state });
    }

    let rows = item_db::edit_item_fields(
        &mut *tx,
        item_id,
        expected_version,
        patch.notes.as_deref(),
        patch.estimated_date,
    )
    .await?;
    if rows == 0 {
        return Err(PlanError::ConcurrentModification {
            entity: "item",
            id: item_id,
        });
    }

    let updated = item_db::get_item(&mut *tx, item_id)
        .await?
        .ok_or_else(|| PlanError::item_not_found(item_id))?;

    tx.commit().await?;

    Ok(updated)
}
