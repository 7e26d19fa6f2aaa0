// workflow/src/state_machine/mod.rs
//! Lifecycle rules for the visit and its satellites. Every function here is
//! pure: it mutates the record it is given or returns an error and leaves
//! the record as it was.

pub mod fulfillment;
pub mod invoice;
pub mod lab_order;
pub mod prescription;
pub mod referral;
pub mod visit;

pub use fulfillment::{FulfillmentEvent, FulfillmentStateMachine};
pub use lab_order::LabResultInput;
pub use visit::{VisitEvent, VisitStateMachine};
