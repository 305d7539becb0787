//! Pricing snapshot calculator.
//!
//! Runs exactly once per item, at creation. The four components it returns
//! are persisted individually and never recomputed against live catalog
//! data; a later price edit at the catalog cannot move an already-created
//! item's stored prices.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::PlanError;
use crate::catalog::ServiceDefinition;

/// Errors from the snapshot calculation.
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("service {service} requires a material selection for group {group:?}")]
    MissingRequiredMaterial { service: Uuid, group: String },

    #[error("material {material} is not an option of service {service}")]
    UnknownMaterial { service: Uuid, material: Uuid },
}

impl From<PricingError> for PlanError {
    fn from(err: PricingError) -> Self {
        PlanError::Validation(err.to_string())
    }
}

/// The frozen price components of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSnapshot {
    /// The service's base price.
    pub service: Decimal,
    /// Cost of the service's fixed (non-selectable) materials.
    pub fixed_materials: Decimal,
    /// Price of the selected optional material times the group quantity,
    /// zero when nothing was selected.
    pub material: Decimal,
    /// Sum of the three components above.
    pub total: Decimal,
}

/// Compute the price snapshot for a service and an optional material
/// selection.
///
/// Fails when a mandatory material group has no matching selection, or when
/// the selected material is not an option of the service.
pub fn compute_snapshot(
    service: &ServiceDefinition,
    selected_material: Option<Uuid>,
) -> Result<PriceSnapshot, PricingError> {
    let selected = match selected_material {
        Some(material_id) => Some(service.find_material(material_id).ok_or(
            PricingError::UnknownMaterial {
                service: service.id,
                material: material_id,
            },
        )?),
        None => None,
    };

    // A single selection can satisfy at most one group, so any other
    // mandatory group is necessarily unsatisfied.
    for group in &service.optional_material_groups {
        if group.is_mandatory {
            let satisfied = matches!(selected, Some((g, _)) if g.id == group.id);
            if !satisfied {
                return Err(PricingError::MissingRequiredMaterial {
                    service: service.id,
                    group: group.name.clone(),
                });
            }
        }
    }

    let material = selected
        .map(|(group, option)| option.price * Decimal::from(group.quantity))
        .unwrap_or(Decimal::ZERO);

    Ok(PriceSnapshot {
        service: service.base_price,
        fixed_materials: service.fixed_materials_cost,
        material,
        total: service.base_price + service.fixed_materials_cost + material,
    })
}
