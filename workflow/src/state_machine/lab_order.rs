// workflow/src/state_machine/lab_order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use models::{EntityType, FulfillmentStatus, LabOrder, LabResult, LabTest, ValidationError, Visit, VisitStatus};

use super::fulfillment::{ensure_visit_not_canceled, machine, FulfillmentEvent};
use crate::errors::{DomainError, DomainResult};

/// What the laboratory enters for an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabResultInput {
    pub value: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub interpretation: Option<String>,
    #[serde(default)]
    pub attachment_url: Option<String>,
}

/// Lab orders can be placed at check-in or during the exam.
pub fn create(
    visit: &Visit,
    lab_test: &LabTest,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> DomainResult<LabOrder> {
    if !matches!(visit.status, VisitStatus::Registered | VisitStatus::Examining) {
        return Err(DomainError::VisitNotActive {
            visit_id: visit.id,
            current: visit.status,
            required: "registered or examining".into(),
        });
    }
    if !lab_test.is_active {
        return Err(ValidationError::InactiveLabTest(lab_test.id).into());
    }

    Ok(LabOrder {
        id: Uuid::new_v4(),
        visit_id: visit.id,
        lab_test_id: lab_test.id,
        doctor_id: visit.doctor_id,
        status: FulfillmentStatus::Pending,
        result: None,
        lab_staff_id: None,
        notes,
        version: 0,
        created_at: now,
        updated_at: now,
    })
}

pub fn start(order: &mut LabOrder, visit: &Visit, lab_staff_id: Uuid, now: DateTime<Utc>) -> DomainResult<()> {
    ensure_visit_not_canceled(visit)?;
    order.status = machine().next_state(EntityType::LabOrder, order.id, order.status, FulfillmentEvent::Start, "start")?;
    order.lab_staff_id = Some(lab_staff_id);
    order.updated_at = now;
    Ok(())
}

/// The only way an order completes: status and result are set together.
pub fn enter_result(
    order: &mut LabOrder,
    visit: &Visit,
    input: LabResultInput,
    lab_staff_id: Uuid,
    now: DateTime<Utc>,
) -> DomainResult<()> {
    ensure_visit_not_canceled(visit)?;
    let next = machine().next_state(
        EntityType::LabOrder,
        order.id,
        order.status,
        FulfillmentEvent::Complete,
        "enter_result",
    )?;

    let value = input.value.trim();
    if value.is_empty() {
        return Err(ValidationError::BlankResult.into());
    }

    order.result = Some(LabResult {
        value: value.to_string(),
        unit: input.unit,
        interpretation: input.interpretation,
        attachment_url: input.attachment_url,
        recorded_by: lab_staff_id,
        recorded_at: now,
    });
    order.status = next;
    order.lab_staff_id = Some(lab_staff_id);
    order.updated_at = now;
    Ok(())
}

pub fn cancel(order: &mut LabOrder, now: DateTime<Utc>) -> DomainResult<()> {
    order.status = machine().next_state(EntityType::LabOrder, order.id, order.status, FulfillmentEvent::Cancel, "cancel")?;
    order.updated_at = now;
    Ok(())
}
