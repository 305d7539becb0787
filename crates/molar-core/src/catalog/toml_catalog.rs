//! TOML-backed in-memory catalog.
//!
//! Parses a `catalog.toml` file into an immutable service map and validates:
//! - Service and material ids are unique.
//! - Material group quantities are non-zero.
//! - Mandatory groups offer at least one option.
//!
//! Prices are written as strings (`base_price = "85.00"`) so they
//! deserialize losslessly into `Decimal`.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::PlanError;

use super::{CatalogGateway, MaterialGroup, MaterialOption, ServiceDefinition};

/// Errors that can occur while loading a catalog file.
#[derive(Debug, Error)]
pub enum CatalogParseError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("duplicate service id: {0}")]
    DuplicateServiceId(Uuid),

    #[error("duplicate material option id {option} in service {service:?}")]
    DuplicateOptionId { service: String, option: Uuid },

    #[error("material group {group:?} in service {service:?} has quantity 0")]
    ZeroQuantity { service: String, group: String },

    #[error("mandatory material group {group:?} in service {service:?} has no options")]
    EmptyMandatoryGroup { service: String, group: String },
}

// -----------------------------------------------------------------------
// On-disk format
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CatalogToml {
    #[serde(default)]
    service: Vec<ServiceToml>,
}

#[derive(Debug, Deserialize)]
struct ServiceToml {
    id: Uuid,
    name: String,
    base_price: Decimal,
    #[serde(default)]
    fixed_materials_cost: Decimal,
    #[serde(default)]
    material_group: Vec<MaterialGroupToml>,
}

#[derive(Debug, Deserialize)]
struct MaterialGroupToml {
    id: Uuid,
    name: String,
    #[serde(default)]
    mandatory: bool,
    #[serde(default = "default_quantity")]
    quantity: u32,
    #[serde(default)]
    option: Vec<MaterialOptionToml>,
}

#[derive(Debug, Deserialize)]
struct MaterialOptionToml {
    id: Uuid,
    name: String,
    price: Decimal,
}

fn default_quantity() -> u32 {
    1
}

// -----------------------------------------------------------------------
// Catalog
// -----------------------------------------------------------------------

/// An in-memory catalog loaded from a TOML file.
///
/// This is the concrete [`CatalogGateway`] used by the CLI and by tests;
/// a deployment fronting a remote catalog service implements the same
/// trait.
#[derive(Debug, Default, Clone)]
pub struct TomlCatalog {
    services: HashMap<Uuid, ServiceDefinition>,
}

impl TomlCatalog {
    /// Build an empty catalog. Useful for tests that insert services
    /// programmatically.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a catalog from a TOML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogParseError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a catalog from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, CatalogParseError> {
        let parsed: CatalogToml = toml::from_str(contents)?;

        let mut services = HashMap::new();
        for service_toml in parsed.service {
            let service = convert_service(service_toml)?;
            if services.contains_key(&service.id) {
                return Err(CatalogParseError::DuplicateServiceId(service.id));
            }
            services.insert(service.id, service);
        }

        Ok(Self { services })
    }

    /// Insert or replace a service definition.
    pub fn insert(&mut self, service: ServiceDefinition) {
        self.services.insert(service.id, service);
    }

    /// Number of services in the catalog.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether the catalog has no services.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn convert_service(toml: ServiceToml) -> Result<ServiceDefinition, CatalogParseError> {
    let mut seen_options = std::collections::HashSet::new();
    let mut groups = Vec::with_capacity(toml.material_group.len());

    for group_toml in toml.material_group {
        if group_toml.quantity == 0 {
            return Err(CatalogParseError::ZeroQuantity {
                service: toml.name.clone(),
                group: group_toml.name,
            });
        }
        if group_toml.mandatory && group_toml.option.is_empty() {
            return Err(CatalogParseError::EmptyMandatoryGroup {
                service: toml.name.clone(),
                group: group_toml.name,
            });
        }

        let mut options = Vec::with_capacity(group_toml.option.len());
        for option_toml in group_toml.option {
            if !seen_options.insert(option_toml.id) {
                return Err(CatalogParseError::DuplicateOptionId {
                    service: toml.name.clone(),
                    option: option_toml.id,
                });
            }
            options.push(MaterialOption {
                id: option_toml.id,
                name: option_toml.name,
                price: option_toml.price,
            });
        }

        groups.push(MaterialGroup {
            id: group_toml.id,
            name: group_toml.name,
            is_mandatory: group_toml.mandatory,
            quantity: group_toml.quantity,
            options,
        });
    }

    Ok(ServiceDefinition {
        id: toml.id,
        name: toml.name,
        base_price: toml.base_price,
        fixed_materials_cost: toml.fixed_materials_cost,
        optional_material_groups: groups,
    })
}

#[async_trait]
impl CatalogGateway for TomlCatalog {
    async fn service(&self, id: Uuid) -> Result<ServiceDefinition, PlanError> {
        self.services
            .get(&id)
            .cloned()
            .ok_or_else(|| PlanError::service_not_found(id))
    }
}
