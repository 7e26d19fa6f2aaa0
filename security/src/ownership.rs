// security/src/ownership.rs

use models::{Actor, Visit};

use crate::capabilities::Capability;
use crate::roles::CapabilityTable;
use crate::{AuthResult, DenialReason};

/// Per-record rule on top of the capability table. Doctors only touch
/// visits assigned to them and patients only see their own.
pub fn owns_visit(actor: &Actor, visit: &Visit) -> bool {
    match actor {
        Actor::Doctor { id } => visit.is_assigned_to(*id),
        Actor::Patient { id } => visit.belongs_to(*id),
        Actor::Admin { .. } | Actor::Staff { .. } => true,
    }
}

/// Capability check followed by the ownership rule for `visit`.
pub fn authorize_visit(table: &CapabilityTable, actor: &Actor, capability: Capability, visit: &Visit) -> AuthResult {
    match table.authorize(actor, capability) {
        AuthResult::Allowed if owns_visit(actor, visit) => AuthResult::Allowed,
        AuthResult::Allowed => AuthResult::denied(actor, DenialReason::NotOwner),
        denied => denied,
    }
}
