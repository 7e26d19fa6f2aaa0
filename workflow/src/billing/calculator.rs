// workflow/src/billing/calculator.rs

use std::collections::HashMap;

use log::warn;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use models::{
    FulfillmentStatus, InvoiceItem, InvoiceItemType, LabOrder, LabTest, MedicalRecord, Medicine, Money, Prescription,
    Visit,
};

/// Catalog prices the calculator charges against.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    lab_tests: HashMap<Uuid, LabTest>,
    medicines: HashMap<Uuid, Medicine>,
}

impl PriceBook {
    pub fn new(lab_tests: impl IntoIterator<Item = LabTest>, medicines: impl IntoIterator<Item = Medicine>) -> Self {
        PriceBook {
            lab_tests: lab_tests.into_iter().map(|t| (t.id, t)).collect(),
            medicines: medicines.into_iter().map(|m| (m.id, m)).collect(),
        }
    }

    pub fn lab_test(&self, id: &Uuid) -> Option<&LabTest> {
        self.lab_tests.get(id)
    }

    pub fn medicine(&self, id: &Uuid) -> Option<&Medicine> {
        self.medicines.get(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceTotals {
    pub total_amount: Money,
    pub items: Vec<InvoiceItem>,
}

/// Derives the bill of `visit` from its chargeable children.
///
/// Charges the consultation fee once a medical record exists, each completed
/// lab order at its test price and each item of a completed prescription at
/// unit price times quantity. Records of other visits are ignored. A price
/// missing from the book counts as zero.
pub fn compute_invoice(
    visit: &Visit,
    medical_record: Option<&MedicalRecord>,
    lab_orders: &[LabOrder],
    prescriptions: &[Prescription],
    prices: &PriceBook,
    consultation_fee: Money,
) -> InvoiceTotals {
    let mut items = Vec::new();

    if let Some(record) = medical_record.filter(|r| r.visit_id == visit.id) {
        items.push(InvoiceItem {
            item_type: InvoiceItemType::Consultation,
            description: "Consultation".to_string(),
            quantity: 1,
            unit_price: consultation_fee,
            subtotal: consultation_fee,
            source_id: Some(record.id),
        });
    }

    for order in lab_orders
        .iter()
        .filter(|o| o.visit_id == visit.id && o.status == FulfillmentStatus::Completed)
    {
        let (description, price) = match prices.lab_test(&order.lab_test_id) {
            Some(test) => (test.name.clone(), test.price),
            None => {
                warn!("Lab test {} of order {} has no price, charging zero", order.lab_test_id, order.id);
                (format!("Lab test {}", order.lab_test_id), Decimal::ZERO)
            }
        };
        items.push(InvoiceItem {
            item_type: InvoiceItemType::Lab,
            description,
            quantity: 1,
            unit_price: price,
            subtotal: price,
            source_id: Some(order.id),
        });
    }

    for prescription in prescriptions
        .iter()
        .filter(|p| p.visit_id == visit.id && p.status == FulfillmentStatus::Completed)
    {
        for item in &prescription.items {
            let (description, unit_price) = match prices.medicine(&item.medicine_id) {
                Some(medicine) => (medicine.name.clone(), medicine.unit_price),
                None => {
                    warn!(
                        "Medicine {} of prescription {} has no price, charging zero",
                        item.medicine_id, prescription.id
                    );
                    (format!("Medicine {}", item.medicine_id), Decimal::ZERO)
                }
            };
            items.push(InvoiceItem {
                item_type: InvoiceItemType::Medicine,
                description,
                quantity: item.quantity,
                unit_price,
                subtotal: unit_price * Decimal::from(item.quantity),
                source_id: Some(prescription.id),
            });
        }
    }

    let total_amount = items.iter().map(|i| i.subtotal).sum::<Money>();
    InvoiceTotals { total_amount, items }
}
