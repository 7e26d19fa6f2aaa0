// models/src/medical/prescription.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fulfillment::PrescriptionStatus;
use crate::errors::{ValidationError, ValidationResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionItem {
    pub medicine_id: Uuid,
    pub quantity: u32,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub visit_id: Uuid,
    pub doctor_id: Uuid,
    pub status: PrescriptionStatus,
    pub items: Vec<PrescriptionItem>,
    pub pharmacy_staff_id: Option<Uuid>,
    pub notes: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Checks the shape rules every prescription obeys: at least one item and a
/// positive quantity on each.
pub fn validate_items(items: &[PrescriptionItem]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::EmptyPrescription);
    }
    if let Some(index) = items.iter().position(|item| item.quantity < 1) {
        return Err(ValidationError::InvalidQuantity { index });
    }
    Ok(())
}
