// workflow/src/state_machine/prescription.rs

use chrono::{DateTime, Utc};
use uuid::Uuid;

use models::{
    validate_items, EntityType, FulfillmentStatus, Prescription, PrescriptionItem, ValidationError, Visit, VisitStatus,
};

use super::fulfillment::{ensure_visit_not_canceled, machine, FulfillmentEvent};
use crate::errors::{DomainError, DomainResult};

/// Writes a prescription for an examining visit. `existing` are the visit's
/// current prescriptions; only a cancelled one may be replaced.
pub fn create(
    visit: &Visit,
    items: Vec<PrescriptionItem>,
    notes: Option<String>,
    existing: &[Prescription],
    now: DateTime<Utc>,
) -> DomainResult<Prescription> {
    if visit.status != VisitStatus::Examining {
        return Err(DomainError::VisitNotActive {
            visit_id: visit.id,
            current: visit.status,
            required: VisitStatus::Examining.as_str().into(),
        });
    }
    validate_items(&items)?;
    if existing
        .iter()
        .any(|p| p.visit_id == visit.id && p.status != FulfillmentStatus::Cancelled)
    {
        return Err(ValidationError::DuplicatePrescription(visit.id).into());
    }

    Ok(Prescription {
        id: Uuid::new_v4(),
        visit_id: visit.id,
        doctor_id: visit.doctor_id,
        status: FulfillmentStatus::Pending,
        items,
        pharmacy_staff_id: None,
        notes,
        version: 0,
        created_at: now,
        updated_at: now,
    })
}

pub fn start(prescription: &mut Prescription, visit: &Visit, pharmacy_staff_id: Uuid, now: DateTime<Utc>) -> DomainResult<()> {
    ensure_visit_not_canceled(visit)?;
    prescription.status = machine().next_state(
        EntityType::Prescription,
        prescription.id,
        prescription.status,
        FulfillmentEvent::Start,
        "start",
    )?;
    prescription.pharmacy_staff_id = Some(pharmacy_staff_id);
    prescription.updated_at = now;
    Ok(())
}

/// Dispenses the prescription.
pub fn complete(prescription: &mut Prescription, visit: &Visit, pharmacy_staff_id: Uuid, now: DateTime<Utc>) -> DomainResult<()> {
    ensure_visit_not_canceled(visit)?;
    let next = machine().next_state(
        EntityType::Prescription,
        prescription.id,
        prescription.status,
        FulfillmentEvent::Complete,
        "complete",
    )?;
    validate_items(&prescription.items)?;

    prescription.status = next;
    prescription.pharmacy_staff_id = Some(pharmacy_staff_id);
    prescription.updated_at = now;
    Ok(())
}

pub fn cancel(prescription: &mut Prescription, now: DateTime<Utc>) -> DomainResult<()> {
    prescription.status = machine().next_state(
        EntityType::Prescription,
        prescription.id,
        prescription.status,
        FulfillmentEvent::Cancel,
        "cancel",
    )?;
    prescription.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::VisitType;

    fn visit(status: VisitStatus) -> Visit {
        let now = Utc::now();
        Visit {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            visit_datetime: now,
            visit_type: VisitType::General,
            status,
            chief_complaint: None,
            registration_staff_id: None,
            version: 2,
            created_at: now,
            updated_at: now,
        }
    }

    fn items() -> Vec<PrescriptionItem> {
        vec![PrescriptionItem {
            medicine_id: Uuid::new_v4(),
            quantity: 10,
            dosage: "500mg".into(),
            frequency: "3x daily".into(),
            duration: "5 days".into(),
            instructions: Some("after meals".into()),
        }]
    }

    #[test]
    fn requires_examining_visit() {
        for status in [VisitStatus::Registered, VisitStatus::Completed, VisitStatus::Canceled] {
            let err = create(&visit(status), items(), None, &[], Utc::now()).unwrap_err();
            match err {
                DomainError::VisitNotActive { current, required, .. } => {
                    assert_eq!(current, status);
                    assert_eq!(required, "examining");
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn rejects_empty_and_duplicate_prescriptions() {
        let v = visit(VisitStatus::Examining);
        let err = create(&v, Vec::new(), None, &[], Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::EmptyPrescription)));

        let mut first = create(&v, items(), None, &[], Utc::now()).unwrap();
        let err = create(&v, items(), None, std::slice::from_ref(&first), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::DuplicatePrescription(_))));

        cancel(&mut first, Utc::now()).unwrap();
        assert!(create(&v, items(), None, &[first], Utc::now()).is_ok());
    }

    #[test]
    fn dispense_needs_processing() {
        let v = visit(VisitStatus::Examining);
        let mut p = create(&v, items(), None, &[], Utc::now()).unwrap();
        let pharmacist = Uuid::new_v4();

        assert!(complete(&mut p, &v, pharmacist, Utc::now()).unwrap_err().is_invalid_transition());
        start(&mut p, &v, pharmacist, Utc::now()).unwrap();
        complete(&mut p, &v, pharmacist, Utc::now()).unwrap();
        assert_eq!(p.status, FulfillmentStatus::Completed);
        assert_eq!(p.pharmacy_staff_id, Some(pharmacist));
        assert!(matches!(cancel(&mut p, Utc::now()), Err(DomainError::TerminalStateViolation { .. })));
    }
}
