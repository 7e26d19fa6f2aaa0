// models/src/medical/lab_order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fulfillment::LabOrderStatus;

/// Result entered by the laboratory. Its presence is what makes an order
/// `completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    pub value: String,
    pub unit: Option<String>,
    pub interpretation: Option<String>,
    pub attachment_url: Option<String>,
    pub recorded_by: Uuid,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabOrder {
    pub id: Uuid,
    pub visit_id: Uuid,
    pub lab_test_id: Uuid,
    pub doctor_id: Uuid,
    pub status: LabOrderStatus,
    pub result: Option<LabResult>,
    pub lab_staff_id: Option<Uuid>,
    pub notes: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
