// workflow/src/orchestrator/overview.rs

use rust_decimal::Decimal;
use serde::Serialize;

use models::{
    Actor, EntityKey, FulfillmentStatus, Invoice, LabOrder, MedicalRecord, PaymentStatus, Prescription, Referral,
    StoredEntity, Visit, VisitStatus,
};
use security::{authorize_visit, CapabilityTable};

use super::actions::Action;
use crate::config::CompletionPolicy;
use crate::state_machine::invoice::billing_closed;

/// Read model of one visit. Sections the actor may not read are left empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitOverview {
    pub visit: Visit,
    pub medical_record: Option<MedicalRecord>,
    pub lab_orders: Vec<LabOrder>,
    pub prescriptions: Vec<Prescription>,
    pub referrals: Vec<Referral>,
    pub invoice: Option<Invoice>,
    /// Non-terminal lab orders and prescriptions, hidden sections included.
    pub open_children: Vec<EntityKey>,
}

/// An action the actor may perform right now, and on which record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailableAction {
    pub action: Action,
    pub target: EntityKey,
    /// Version to send back as `expected_version`.
    pub version: u64,
}

/// Actions that are both authorized for `actor` and legal in the visit's
/// current state.
pub fn available_actions(
    table: &CapabilityTable,
    policy: CompletionPolicy,
    actor: &Actor,
    overview: &VisitOverview,
) -> Vec<AvailableAction> {
    let visit = &overview.visit;
    let allowed = |action: Action| authorize_visit(table, actor, action.capability(), visit).is_allowed();
    let mut actions = Vec::new();
    let mut offer = |action: Action, target: EntityKey, version: u64| {
        if allowed(action) {
            actions.push(AvailableAction { action, target, version });
        }
    };

    let visit_key = visit.key();
    match visit.status {
        VisitStatus::Registered => {
            offer(Action::VisitStartExam, visit_key, visit.version);
            offer(Action::VisitCancel, visit_key, visit.version);
            offer(Action::LabOrderCreate, visit_key, visit.version);
        }
        VisitStatus::Examining => {
            if policy == CompletionPolicy::AllowOpenChildren || overview.open_children.is_empty() {
                offer(Action::VisitComplete, visit_key, visit.version);
            }
            offer(Action::VisitCancel, visit_key, visit.version);
            match &overview.medical_record {
                Some(record) => offer(Action::MedicalRecordUpsert, record.key(), record.version),
                None => offer(Action::MedicalRecordUpsert, visit_key, visit.version),
            }
            offer(Action::LabOrderCreate, visit_key, visit.version);
            if !overview
                .prescriptions
                .iter()
                .any(|p| p.status != FulfillmentStatus::Cancelled)
            {
                offer(Action::PrescriptionCreate, visit_key, visit.version);
            }
            offer(Action::ReferralCreate, visit_key, visit.version);
        }
        VisitStatus::Completed | VisitStatus::Canceled => {}
    }

    if visit.status != VisitStatus::Canceled {
        for order in &overview.lab_orders {
            match order.status {
                FulfillmentStatus::Pending => {
                    offer(Action::LabOrderStart, order.key(), order.version);
                    offer(Action::LabOrderCancel, order.key(), order.version);
                }
                FulfillmentStatus::Processing => {
                    offer(Action::LabOrderEnterResult, order.key(), order.version);
                    offer(Action::LabOrderCancel, order.key(), order.version);
                }
                FulfillmentStatus::Completed | FulfillmentStatus::Cancelled => {}
            }
        }
        for prescription in &overview.prescriptions {
            match prescription.status {
                FulfillmentStatus::Pending => {
                    offer(Action::PrescriptionStart, prescription.key(), prescription.version);
                    offer(Action::PrescriptionCancel, prescription.key(), prescription.version);
                }
                FulfillmentStatus::Processing => {
                    offer(Action::PrescriptionComplete, prescription.key(), prescription.version);
                    offer(Action::PrescriptionCancel, prescription.key(), prescription.version);
                }
                FulfillmentStatus::Completed | FulfillmentStatus::Cancelled => {}
            }
        }
    }

    if let Some(invoice) = &overview.invoice {
        if invoice.payment_status != PaymentStatus::Canceled {
            if invoice.outstanding() > Decimal::ZERO {
                offer(Action::InvoiceRecordPayment, invoice.key(), invoice.version);
            }
            if invoice.amount_paid == Decimal::ZERO && billing_closed(visit, &overview.open_children) {
                offer(Action::InvoiceCancel, invoice.key(), invoice.version);
            }
        }
    }

    actions
}
