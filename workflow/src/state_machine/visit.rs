// workflow/src/state_machine/visit.rs

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use models::{EntityKey, EntityType, LabOrder, NewVisit, Prescription, StoredEntity, ValidationError, Visit, VisitStatus};

use crate::config::CompletionPolicy;
use crate::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitEvent {
    StartExam,
    Complete,
    Cancel,
}

impl VisitEvent {
    pub const ALL: [VisitEvent; 3] = [VisitEvent::StartExam, VisitEvent::Complete, VisitEvent::Cancel];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitEvent::StartExam => "start_exam",
            VisitEvent::Complete => "complete",
            VisitEvent::Cancel => "cancel",
        }
    }
}

/// Legal visit edges. Anything not in the table is rejected.
#[derive(Debug)]
pub struct VisitStateMachine {
    transitions: HashMap<(VisitStatus, VisitEvent), VisitStatus>,
}

impl VisitStateMachine {
    pub fn new() -> Self {
        let mut transitions = HashMap::new();
        transitions.insert((VisitStatus::Registered, VisitEvent::StartExam), VisitStatus::Examining);
        transitions.insert((VisitStatus::Examining, VisitEvent::Complete), VisitStatus::Completed);
        transitions.insert((VisitStatus::Registered, VisitEvent::Cancel), VisitStatus::Canceled);
        transitions.insert((VisitStatus::Examining, VisitEvent::Cancel), VisitStatus::Canceled);
        Self { transitions }
    }

    pub fn can_transition(&self, from: VisitStatus, event: VisitEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// Target state of `event` from the visit's current state.
    pub fn next_state(&self, visit: &Visit, event: VisitEvent) -> DomainResult<VisitStatus> {
        if visit.status.is_terminal() {
            return Err(DomainError::terminal(EntityType::Visit, visit.id, visit.status.as_str(), event.as_str()));
        }
        self.transitions
            .get(&(visit.status, event))
            .copied()
            .ok_or_else(|| DomainError::invalid_transition(EntityType::Visit, visit.id, visit.status.as_str(), event.as_str()))
    }

    pub fn possible_events(&self, from: VisitStatus) -> Vec<VisitEvent> {
        VisitEvent::ALL
            .into_iter()
            .filter(|event| self.can_transition(from, *event))
            .collect()
    }
}

impl Default for VisitStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

static MACHINE: Lazy<VisitStateMachine> = Lazy::new(VisitStateMachine::new);

pub fn machine() -> &'static VisitStateMachine {
    &MACHINE
}

/// Builds a new visit in `registered`.
pub fn register(
    new: NewVisit,
    registered_by: Option<Uuid>,
    now: DateTime<Utc>,
    grace: Duration,
) -> DomainResult<Visit> {
    let patient_id = new.patient_id.ok_or_else(|| ValidationError::MissingField("patient_id".into()))?;
    let doctor_id = new.doctor_id.ok_or_else(|| ValidationError::MissingField("doctor_id".into()))?;
    let clinic_id = new.clinic_id.ok_or_else(|| ValidationError::MissingField("clinic_id".into()))?;
    let visit_datetime = new
        .visit_datetime
        .ok_or_else(|| ValidationError::MissingField("visit_datetime".into()))?;

    if let Some(earliest) = now.checked_sub_signed(grace) {
        if visit_datetime < earliest {
            return Err(ValidationError::VisitInPast(visit_datetime.to_rfc3339()).into());
        }
    }

    let chief_complaint = new
        .chief_complaint
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    Ok(Visit {
        id: Uuid::new_v4(),
        patient_id,
        doctor_id,
        clinic_id,
        visit_datetime,
        visit_type: new.visit_type,
        status: VisitStatus::Registered,
        chief_complaint,
        registration_staff_id: registered_by,
        version: 0,
        created_at: now,
        updated_at: now,
    })
}

/// Returns `false` when the visit was already examining.
pub fn start_exam(visit: &mut Visit, now: DateTime<Utc>) -> DomainResult<bool> {
    if visit.status == VisitStatus::Examining {
        return Ok(false);
    }
    visit.status = machine().next_state(visit, VisitEvent::StartExam)?;
    visit.updated_at = now;
    Ok(true)
}

pub fn complete(
    visit: &mut Visit,
    lab_orders: &[LabOrder],
    prescriptions: &[Prescription],
    policy: CompletionPolicy,
    now: DateTime<Utc>,
) -> DomainResult<()> {
    let next = machine().next_state(visit, VisitEvent::Complete)?;

    if policy == CompletionPolicy::RequireTerminalChildren {
        let blocking = open_children(visit.id, lab_orders, prescriptions);
        if !blocking.is_empty() {
            return Err(DomainError::InvalidTransition {
                entity: EntityType::Visit,
                id: visit.id,
                current: visit.status.as_str().to_string(),
                action: VisitEvent::Complete.as_str().to_string(),
                blocking,
            });
        }
    }

    visit.status = next;
    visit.updated_at = now;
    Ok(())
}

pub fn cancel(visit: &mut Visit, now: DateTime<Utc>) -> DomainResult<()> {
    visit.status = machine().next_state(visit, VisitEvent::Cancel)?;
    visit.updated_at = now;
    Ok(())
}

/// Non-terminal lab orders and prescriptions of `visit_id`.
pub fn open_children(visit_id: Uuid, lab_orders: &[LabOrder], prescriptions: &[Prescription]) -> Vec<EntityKey> {
    let orders = lab_orders
        .iter()
        .filter(|o| o.visit_id == visit_id && !o.status.is_terminal())
        .map(|o| o.key());
    let scripts = prescriptions
        .iter()
        .filter(|p| p.visit_id == visit_id && !p.status.is_terminal())
        .map(|p| p.key());
    orders.chain(scripts).collect()
}
