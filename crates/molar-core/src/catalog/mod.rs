//! The catalog gateway: the engine's seam to the external service catalog.
//!
//! Service definitions (base price, fixed-material cost, optional material
//! groups) are read through [`CatalogGateway`] exactly once per item, at
//! creation time. Nothing in the engine or the repository reads the catalog
//! afterwards, which is what keeps stored price snapshots frozen.

mod toml_catalog;

pub use toml_catalog::{CatalogParseError, TomlCatalog};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PlanError;

/// One selectable material within an optional material group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialOption {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
}

/// A group of interchangeable materials for a service (e.g. the restoration
/// material for a filling). A mandatory group must have one of its options
/// selected before an item can be priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialGroup {
    pub id: Uuid,
    pub name: String,
    pub is_mandatory: bool,
    /// Units of the selected material consumed by one procedure.
    pub quantity: u32,
    pub options: Vec<MaterialOption>,
}

/// A priced service as supplied by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: Uuid,
    pub name: String,
    pub base_price: Decimal,
    pub fixed_materials_cost: Decimal,
    pub optional_material_groups: Vec<MaterialGroup>,
}

impl ServiceDefinition {
    /// Locate a material option by id across all groups, returning the
    /// owning group alongside it.
    pub fn find_material(&self, material_id: Uuid) -> Option<(&MaterialGroup, &MaterialOption)> {
        self.optional_material_groups.iter().find_map(|group| {
            group
                .options
                .iter()
                .find(|option| option.id == material_id)
                .map(|option| (group, option))
        })
    }
}

/// Read access to the external service catalog.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Fetch a service definition by id.
    ///
    /// Returns [`PlanError::NotFound`] for unknown services.
    async fn service(&self, id: Uuid) -> Result<ServiceDefinition, PlanError>;
}
