// models/src/medical/visit.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    #[default]
    General,
    FollowUp,
    Referral,
    Emergency,
}

labelled_enum!(VisitType, "visit type" {
    General => "general",
    FollowUp => "follow_up",
    Referral => "referral",
    Emergency => "emergency",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Registered,
    Examining,
    Completed,
    Canceled,
}

labelled_enum!(VisitStatus, "visit status" {
    Registered => "registered",
    Examining => "examining",
    Completed => "completed",
    Canceled => "canceled",
});

impl VisitStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStatus::Completed | VisitStatus::Canceled)
    }

    /// Children may still be created or progressed.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// One clinical encounter; the aggregate root every other record hangs off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub visit_datetime: DateTime<Utc>,
    pub visit_type: VisitType,
    pub status: VisitStatus,
    pub chief_complaint: Option<String>,
    pub registration_staff_id: Option<Uuid>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Check-in data collected by Registration. Every field the visit cannot
/// exist without is optional here so that absence is reported, not panicked on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewVisit {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub clinic_id: Option<Uuid>,
    pub visit_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub visit_type: VisitType,
    pub chief_complaint: Option<String>,
}

impl Visit {
    pub fn is_assigned_to(&self, doctor_id: Uuid) -> bool {
        self.doctor_id == doctor_id
    }

    pub fn belongs_to(&self, patient_id: Uuid) -> bool {
        self.patient_id == patient_id
    }
}
