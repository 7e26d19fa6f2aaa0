// models/src/lib.rs
//! Shared entity model for the clinic visit workflow.
//!
//! Everything in this crate is shape and invariants only. Lifecycle rules live
//! in the `workflow` crate and permission rules in `security`.

#[macro_use]
mod labels;

pub mod entity;
pub mod errors;
pub mod identifiers;
pub mod medical;

pub use entity::{Entity, EntityType, StoredEntity};
pub use errors::{ValidationError, ValidationResult};
pub use identifiers::EntityKey;
pub use medical::*;
