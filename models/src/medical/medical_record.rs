// models/src/medical/medical_record.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Recovered,
    FollowUp,
    Referred,
    Inpatient,
}

labelled_enum!(Outcome, "outcome" {
    Recovered => "recovered",
    FollowUp => "follow_up",
    Referred => "referred",
    Inpatient => "inpatient",
});

/// The doctor's notes for one visit. There is at most one per visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub visit_id: Uuid,
    pub anamnesis: Option<String>,
    pub diagnosis: Option<String>,
    pub physical_exam: Option<String>,
    pub treatment_plan: Option<String>,
    pub doctor_notes: Option<String>,
    pub outcome: Option<Outcome>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update; `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecordFields {
    pub anamnesis: Option<String>,
    pub diagnosis: Option<String>,
    pub physical_exam: Option<String>,
    pub treatment_plan: Option<String>,
    pub doctor_notes: Option<String>,
    pub outcome: Option<Outcome>,
}

impl MedicalRecord {
    /// Keyed by the visit's id, like the invoice.
    pub fn new(visit_id: Uuid, fields: MedicalRecordFields, now: DateTime<Utc>) -> Self {
        let mut record = MedicalRecord {
            id: visit_id,
            visit_id,
            anamnesis: None,
            diagnosis: None,
            physical_exam: None,
            treatment_plan: None,
            doctor_notes: None,
            outcome: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        record.apply(fields, now);
        record
    }

    pub fn apply(&mut self, fields: MedicalRecordFields, now: DateTime<Utc>) {
        if let Some(v) = fields.anamnesis {
            self.anamnesis = Some(v);
        }
        if let Some(v) = fields.diagnosis {
            self.diagnosis = Some(v);
        }
        if let Some(v) = fields.physical_exam {
            self.physical_exam = Some(v);
        }
        if let Some(v) = fields.treatment_plan {
            self.treatment_plan = Some(v);
        }
        if let Some(v) = fields.doctor_notes {
            self.doctor_notes = Some(v);
        }
        if let Some(v) = fields.outcome {
            self.outcome = Some(v);
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_only_touches_provided_fields() {
        let now = Utc::now();
        let mut record = MedicalRecord::new(
            Uuid::new_v4(),
            MedicalRecordFields { diagnosis: Some("J06.9".into()), ..Default::default() },
            now,
        );
        record.apply(MedicalRecordFields { doctor_notes: Some("rest".into()), ..Default::default() }, now);
        assert_eq!(record.diagnosis.as_deref(), Some("J06.9"));
        assert_eq!(record.doctor_notes.as_deref(), Some("rest"));
        assert_eq!(record.anamnesis, None);
    }
}
