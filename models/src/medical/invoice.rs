// models/src/medical/invoice.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Money = Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
    Canceled,
}

labelled_enum!(PaymentStatus, "payment status" {
    Unpaid => "unpaid",
    Partial => "partial",
    Paid => "paid",
    Canceled => "canceled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Debit,
    Credit,
    Bpjs,
    Insurance,
}

labelled_enum!(PaymentMethod, "payment method" {
    Cash => "cash",
    Debit => "debit",
    Credit => "credit",
    Bpjs => "bpjs",
    Insurance => "insurance",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceItemType {
    Consultation,
    Medicine,
    Lab,
    Other,
}

labelled_enum!(InvoiceItemType, "invoice item type" {
    Consultation => "consultation",
    Medicine => "medicine",
    Lab => "lab",
    Other => "other",
});

/// One derived charge. `source_id` points at the record that produced it
/// (medical record, lab order or prescription).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub item_type: InvoiceItemType,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
    pub source_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: Money,
    pub method: PaymentMethod,
    pub cashier_id: Uuid,
    pub recorded_at: DateTime<Utc>,
}

/// The bill for one visit. `total_amount` is derived from the visit's
/// chargeable children and is never edited directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub visit_id: Uuid,
    pub total_amount: Money,
    pub amount_paid: Money,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub items: Vec<InvoiceItem>,
    /// Set when the visit completes; the total never drops below it.
    pub frozen_total: Option<Money>,
    pub payments: Vec<Payment>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// The invoice shares its visit's id, so a visit can never end up with two.
    pub fn new(visit_id: Uuid, now: DateTime<Utc>) -> Self {
        Invoice {
            id: visit_id,
            visit_id,
            total_amount: Decimal::ZERO,
            amount_paid: Decimal::ZERO,
            payment_status: PaymentStatus::Unpaid,
            payment_method: None,
            items: Vec::new(),
            frozen_total: None,
            payments: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn outstanding(&self) -> Money {
        (self.total_amount - self.amount_paid).max(Decimal::ZERO)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen_total.is_some()
    }
}
