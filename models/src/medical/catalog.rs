// models/src/medical/catalog.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::invoice::Money;

/// A test the laboratory offers, with the price billed per completed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTest {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub price: Money,
    pub is_active: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: Uuid,
    pub name: String,
    pub unit_price: Money,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LabTest {
    pub fn new(code: impl Into<String>, name: impl Into<String>, price: Money) -> Self {
        let now = Utc::now();
        LabTest {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            price,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Medicine {
    pub fn new(name: impl Into<String>, unit_price: Money) -> Self {
        let now = Utc::now();
        Medicine {
            id: Uuid::new_v4(),
            name: name.into(),
            unit_price,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
