// workflow/src/state_machine/referral.rs

use chrono::{DateTime, Utc};
use uuid::Uuid;

use models::{EntityType, Referral, ReferralDetails, ReferralStatus, Visit, VisitStatus};

use crate::errors::{DomainError, DomainResult};

/// Referrals are written during the exam, in the name of the visit's doctor.
pub fn create(visit: &Visit, details: ReferralDetails, now: DateTime<Utc>) -> DomainResult<Referral> {
    if visit.status != VisitStatus::Examining {
        return Err(DomainError::VisitNotActive {
            visit_id: visit.id,
            current: visit.status,
            required: VisitStatus::Examining.as_str().into(),
        });
    }
    let details = details.normalized()?;

    Ok(Referral {
        id: Uuid::new_v4(),
        visit_id: visit.id,
        patient_id: visit.patient_id,
        referring_doctor_id: visit.doctor_id,
        details,
        status: ReferralStatus::Pending,
        version: 0,
        created_at: now,
        updated_at: now,
    })
}

/// Only reached through the visit cancel cascade.
pub fn cancel(referral: &mut Referral, now: DateTime<Utc>) -> DomainResult<()> {
    if referral.status == ReferralStatus::Canceled {
        return Err(DomainError::terminal(EntityType::Referral, referral.id, referral.status.as_str(), "cancel"));
    }
    referral.status = ReferralStatus::Canceled;
    referral.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{ValidationError, VisitType};

    fn visit(status: VisitStatus) -> Visit {
        let now = Utc::now();
        Visit {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            visit_datetime: now,
            visit_type: VisitType::Referral,
            status,
            chief_complaint: Some("knee pain".into()),
            registration_staff_id: None,
            version: 2,
            created_at: now,
            updated_at: now,
        }
    }

    fn details() -> ReferralDetails {
        ReferralDetails {
            referred_to_facility: "RSUD Dr. Soetomo".into(),
            specialty: Some("orthopedics".into()),
            reason: "suspected ligament tear".into(),
            ..Default::default()
        }
    }

    #[test]
    fn created_pending_in_the_name_of_the_visit_doctor() {
        let visit = visit(VisitStatus::Examining);
        let referral = create(&visit, details(), Utc::now()).unwrap();
        assert_eq!(referral.status, ReferralStatus::Pending);
        assert_eq!(referral.patient_id, visit.patient_id);
        assert_eq!(referral.referring_doctor_id, visit.doctor_id);
        assert_eq!(referral.version, 0);
    }

    #[test]
    fn inactive_visits_take_no_referral() {
        for status in [VisitStatus::Registered, VisitStatus::Completed, VisitStatus::Canceled] {
            let err = create(&visit(status), details(), Utc::now()).unwrap_err();
            assert!(matches!(err, DomainError::VisitNotActive { current, .. } if current == status));
        }
    }

    #[test]
    fn blank_reason_is_rejected() {
        let input = ReferralDetails { reason: " ".into(), ..details() };
        let err = create(&visit(VisitStatus::Examining), input, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::MissingField(ref f)) if f == "reason"));
    }

    #[test]
    fn canceled_referral_stays_canceled() {
        let mut referral = create(&visit(VisitStatus::Examining), details(), Utc::now()).unwrap();
        cancel(&mut referral, Utc::now()).unwrap();
        assert_eq!(referral.status, ReferralStatus::Canceled);
        assert!(cancel(&mut referral, Utc::now()).unwrap_err().is_invalid_transition());
    }
}
