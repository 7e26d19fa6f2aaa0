// models/src/medical/referral.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ValidationError, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Canceled,
}

labelled_enum!(ReferralStatus, "referral status" {
    Pending => "pending",
    Canceled => "canceled",
});

/// What the referring doctor writes on the letter. Missing fields decode
/// as empty so `normalized` can name them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralDetails {
    pub referred_to_facility: String,
    pub specialty: Option<String>,
    pub reason: String,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
}

impl ReferralDetails {
    /// Trims every field; facility and reason must be left non-empty and
    /// blank optional fields become `None`.
    pub fn normalized(self) -> ValidationResult<Self> {
        let required = |field: &str, value: String| {
            let value = value.trim().to_string();
            if value.is_empty() {
                Err(ValidationError::MissingField(field.to_string()))
            } else {
                Ok(value)
            }
        };
        let optional = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(ReferralDetails {
            referred_to_facility: required("referred_to_facility", self.referred_to_facility)?,
            specialty: optional(self.specialty),
            reason: required("reason", self.reason)?,
            diagnosis: optional(self.diagnosis),
            notes: optional(self.notes),
        })
    }
}

/// A letter sending the patient of a visit on to another facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub visit_id: Uuid,
    pub patient_id: Uuid,
    pub referring_doctor_id: Uuid,
    #[serde(flatten)]
    pub details: ReferralDetails,
    pub status: ReferralStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
