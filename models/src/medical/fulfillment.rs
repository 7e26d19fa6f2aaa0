// models/src/medical/fulfillment.rs

use serde::{Deserialize, Serialize};

/// Progress of a departmental work item (lab order or prescription).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

labelled_enum!(FulfillmentStatus, "fulfillment status" {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl FulfillmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FulfillmentStatus::Completed | FulfillmentStatus::Cancelled)
    }
}

pub type LabOrderStatus = FulfillmentStatus;
pub type PrescriptionStatus = FulfillmentStatus;
