//! Persistence boundary for the molar treatment-plan engine.
//!
//! Row models, query functions, pool construction, and embedded migrations.
//! Query functions return `sqlx::Result` so the core crate can classify
//! store failures into its typed error taxonomy.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
