// workflow/src/state_machine/fulfillment.rs
//! Shared shape of departmental work items: lab orders and prescriptions.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use models::{EntityType, FulfillmentStatus, Visit, VisitStatus};

use crate::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentEvent {
    Start,
    Complete,
    Cancel,
}

impl FulfillmentEvent {
    pub const ALL: [FulfillmentEvent; 3] = [FulfillmentEvent::Start, FulfillmentEvent::Complete, FulfillmentEvent::Cancel];
}

/// `pending -> processing -> completed`, `cancelled` from any open state.
#[derive(Debug)]
pub struct FulfillmentStateMachine {
    transitions: HashMap<(FulfillmentStatus, FulfillmentEvent), FulfillmentStatus>,
}

impl FulfillmentStateMachine {
    pub fn new() -> Self {
        use FulfillmentStatus::*;

        let mut transitions = HashMap::new();
        transitions.insert((Pending, FulfillmentEvent::Start), Processing);
        transitions.insert((Processing, FulfillmentEvent::Complete), Completed);
        transitions.insert((Pending, FulfillmentEvent::Cancel), Cancelled);
        transitions.insert((Processing, FulfillmentEvent::Cancel), Cancelled);
        Self { transitions }
    }

    pub fn can_transition(&self, from: FulfillmentStatus, event: FulfillmentEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// `action` is the name reported in errors (e.g. `enter_result`).
    pub fn next_state(
        &self,
        entity: EntityType,
        id: Uuid,
        from: FulfillmentStatus,
        event: FulfillmentEvent,
        action: &str,
    ) -> DomainResult<FulfillmentStatus> {
        if from.is_terminal() {
            return Err(DomainError::terminal(entity, id, from.as_str(), action));
        }
        self.transitions
            .get(&(from, event))
            .copied()
            .ok_or_else(|| DomainError::invalid_transition(entity, id, from.as_str(), action))
    }
}

impl Default for FulfillmentStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

static MACHINE: Lazy<FulfillmentStateMachine> = Lazy::new(FulfillmentStateMachine::new);

pub fn machine() -> &'static FulfillmentStateMachine {
    &MACHINE
}

/// Work on a child may continue unless its visit was canceled.
pub fn ensure_visit_not_canceled(visit: &Visit) -> DomainResult<()> {
    if visit.status == VisitStatus::Canceled {
        return Err(DomainError::VisitNotActive {
            visit_id: visit.id,
            current: visit.status,
            required: "a visit that is not canceled".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_graph() {
        let sm = FulfillmentStateMachine::new();
        assert!(sm.can_transition(FulfillmentStatus::Pending, FulfillmentEvent::Start));
        assert!(sm.can_transition(FulfillmentStatus::Processing, FulfillmentEvent::Complete));
        assert!(!sm.can_transition(FulfillmentStatus::Pending, FulfillmentEvent::Complete));
        for event in FulfillmentEvent::ALL {
            assert!(!sm.can_transition(FulfillmentStatus::Completed, event));
            assert!(!sm.can_transition(FulfillmentStatus::Cancelled, event));
        }
    }

    #[test]
    fn terminal_source_reports_terminal_violation() {
        let err = machine()
            .next_state(EntityType::LabOrder, Uuid::new_v4(), FulfillmentStatus::Cancelled, FulfillmentEvent::Start, "start")
            .unwrap_err();
        assert!(matches!(err, DomainError::TerminalStateViolation { .. }));

        let err = machine()
            .next_state(EntityType::LabOrder, Uuid::new_v4(), FulfillmentStatus::Pending, FulfillmentEvent::Complete, "enter_result")
            .unwrap_err();
        match err {
            DomainError::InvalidTransition { current, action, .. } => {
                assert_eq!(current, "pending");
                assert_eq!(action, "enter_result");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
