// workflow/src/orchestrator/delta.rs

use serde::Serialize;
use uuid::Uuid;

use models::{Entity, EntityKey, Invoice, Money, PaymentStatus};

use super::actions::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
}

/// One record touched by an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub key: EntityKey,
    pub kind: ChangeKind,
    /// Version after the write; the caller's next expected version.
    pub version: u64,
    pub previous_status: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceSummary {
    pub invoice_id: Uuid,
    pub total_amount: Money,
    pub amount_paid: Money,
    pub outstanding: Money,
    pub payment_status: PaymentStatus,
    pub frozen: bool,
}

impl From<&Invoice> for InvoiceSummary {
    fn from(invoice: &Invoice) -> Self {
        InvoiceSummary {
            invoice_id: invoice.id,
            total_amount: invoice.total_amount,
            amount_paid: invoice.amount_paid,
            outstanding: invoice.outstanding(),
            payment_status: invoice.payment_status,
            frozen: invoice.is_frozen(),
        }
    }
}

/// What a successful action changed. The UI applies this only after the
/// action has been confirmed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDelta {
    pub action: Action,
    pub visit_id: Uuid,
    /// The record the action was aimed at.
    pub target: EntityKey,
    pub changes: Vec<Change>,
    /// Present when the invoice was created or changed.
    pub invoice: Option<InvoiceSummary>,
}

impl EntityDelta {
    pub fn unchanged(action: Action, visit_id: Uuid, target: EntityKey) -> Self {
        EntityDelta { action, visit_id, target, changes: Vec::new(), invoice: None }
    }

    pub(crate) fn from_stored(
        action: Action,
        visit_id: Uuid,
        target: EntityKey,
        stored: &[Entity],
        previous: &[(EntityKey, Option<String>)],
    ) -> Self {
        let mut invoice = None;
        let changes = stored
            .iter()
            .map(|entity| {
                if let Entity::Invoice(inv) = entity {
                    invoice = Some(InvoiceSummary::from(inv));
                }
                let key = entity.key();
                let previous_status = previous
                    .iter()
                    .find(|(k, _)| *k == key)
                    .and_then(|(_, status)| status.clone());
                Change {
                    key,
                    kind: if entity.version() == 1 { ChangeKind::Created } else { ChangeKind::Updated },
                    version: entity.version(),
                    previous_status,
                    status: entity.status_label().map(str::to_string),
                }
            })
            .collect();
        EntityDelta { action, visit_id, target, changes, invoice }
    }

    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn change(&self, key: &EntityKey) -> Option<&Change> {
        self.changes.iter().find(|c| c.key == *key)
    }

    /// New version of the target record.
    pub fn target_version(&self) -> Option<u64> {
        self.change(&self.target).map(|c| c.version)
    }
}
