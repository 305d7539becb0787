//! Treatment plan lifecycle and pricing snapshot engine.
//!
//! The engine owns four things:
//! - the plan lifecycle state machine ([`lifecycle`]),
//! - draft-only item management with frozen price snapshots ([`items`],
//!   [`pricing`]),
//! - the item completion coordinator that reacts to clinical episodes and
//!   drives automatic plan progression ([`coordinator`]),
//! - the catalog gateway seam to the external service catalog ([`catalog`]).
//!
//! Callers only ever invoke intent-revealing operations (`present`,
//! `accept`, `link_episode_to_item`, ...); nothing outside this crate sets
//! a state field directly. Every operation returns a success value or
//! exactly one [`PlanError`].

pub mod catalog;
pub mod coordinator;
pub mod episode;
mod error;
pub mod items;
pub mod lifecycle;
pub mod odontogram;
pub mod pricing;
pub mod service;

pub use error::{PlanError, PlanResult};
