// workflow/src/state_machine/invoice.rs

use chrono::{DateTime, Utc};
use log::warn;
use rust_decimal::Decimal;
use uuid::Uuid;

use models::{
    EntityKey, EntityType, Invoice, InvoiceItem, InvoiceItemType, Money, Payment, PaymentMethod, PaymentStatus,
    ValidationError, Visit, VisitStatus,
};

use crate::billing::InvoiceTotals;
use crate::errors::{DomainError, DomainResult};

pub const ADJUSTMENT_DESCRIPTION: &str = "Adjustment";

/// `paid` exactly when the balance is covered.
pub fn derive_status(amount_paid: Money, total_amount: Money) -> PaymentStatus {
    if amount_paid >= total_amount {
        PaymentStatus::Paid
    } else if amount_paid > Decimal::ZERO {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Unpaid
    }
}

/// No further charge can reach the bill: the visit is canceled, or it is
/// completed and `open_children` is empty.
pub fn billing_closed(visit: &Visit, open_children: &[EntityKey]) -> bool {
    match visit.status {
        VisitStatus::Canceled => true,
        VisitStatus::Completed => open_children.is_empty(),
        VisitStatus::Registered | VisitStatus::Examining => false,
    }
}

pub fn record_payment(
    invoice: &mut Invoice,
    amount: Money,
    method: PaymentMethod,
    cashier_id: Uuid,
    now: DateTime<Utc>,
) -> DomainResult<()> {
    if invoice.payment_status == PaymentStatus::Canceled {
        return Err(DomainError::terminal(
            EntityType::Invoice,
            invoice.id,
            invoice.payment_status.as_str(),
            "record_payment",
        ));
    }
    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositivePayment(amount).into());
    }
    let outstanding = invoice.outstanding();
    if amount > outstanding {
        return Err(ValidationError::Overpayment { amount, outstanding }.into());
    }

    invoice.payments.push(Payment { amount, method, cashier_id, recorded_at: now });
    invoice.amount_paid += amount;
    invoice.payment_method = Some(method);
    invoice.payment_status = derive_status(invoice.amount_paid, invoice.total_amount);
    invoice.updated_at = now;
    Ok(())
}

/// Voids an invoice nobody has paid anything on. The visit must be past the
/// point where new charges arrive, otherwise they would land on a canceled
/// invoice.
pub fn cancel(invoice: &mut Invoice, visit: &Visit, open_children: &[EntityKey], now: DateTime<Utc>) -> DomainResult<()> {
    if invoice.payment_status == PaymentStatus::Canceled {
        return Err(DomainError::terminal(EntityType::Invoice, invoice.id, invoice.payment_status.as_str(), "cancel"));
    }
    if invoice.amount_paid > Decimal::ZERO {
        return Err(DomainError::invalid_transition(
            EntityType::Invoice,
            invoice.id,
            invoice.payment_status.as_str(),
            "cancel",
        ));
    }
    if !billing_closed(visit, open_children) {
        return Err(DomainError::VisitNotActive {
            visit_id: visit.id,
            current: visit.status,
            required: "canceled, or completed with no open lab orders or prescriptions".into(),
        });
    }
    void(invoice, now);
    Ok(())
}

/// Cancels regardless of payments. Only the `always_cancel` visit policy
/// uses this.
pub fn void(invoice: &mut Invoice, now: DateTime<Utc>) {
    invoice.payment_status = PaymentStatus::Canceled;
    invoice.updated_at = now;
}

/// Replaces the derived items and total. Returns whether anything changed.
///
/// When the total is held at the frozen total or the amount paid, an
/// `other` line carries the difference so the items still add up.
pub fn apply_totals(invoice: &mut Invoice, totals: InvoiceTotals, now: DateTime<Utc>) -> bool {
    if invoice.payment_status == PaymentStatus::Canceled {
        return false;
    }

    let InvoiceTotals { total_amount: computed, mut items } = totals;
    let mut total = computed;
    if let Some(frozen) = invoice.frozen_total {
        if total < frozen {
            warn!(
                "Invoice {} recomputed to {} below its frozen total {}, keeping the frozen total",
                invoice.id, total, frozen
            );
            total = frozen;
        }
    }
    if total < invoice.amount_paid {
        warn!(
            "Invoice {} recomputed to {} below the {} already paid, keeping the paid amount",
            invoice.id, total, invoice.amount_paid
        );
        total = invoice.amount_paid;
    }
    if total > computed {
        let difference = total - computed;
        items.push(InvoiceItem {
            item_type: InvoiceItemType::Other,
            description: ADJUSTMENT_DESCRIPTION.to_string(),
            quantity: 1,
            unit_price: difference,
            subtotal: difference,
            source_id: None,
        });
    }

    let status = derive_status(invoice.amount_paid, total);
    if invoice.total_amount == total && invoice.items == items && invoice.payment_status == status {
        return false;
    }
    invoice.total_amount = total;
    invoice.items = items;
    invoice.payment_status = status;
    invoice.updated_at = now;
    true
}

/// Pins the current total; later recomputes never go below it.
pub fn freeze(invoice: &mut Invoice, now: DateTime<Utc>) -> bool {
    if invoice.is_frozen() || invoice.payment_status == PaymentStatus::Canceled {
        return false;
    }
    invoice.frozen_total = Some(invoice.total_amount);
    invoice.updated_at = now;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::VisitType;
    use rust_decimal_macros::dec;

    fn totals(amount: Money) -> InvoiceTotals {
        InvoiceTotals {
            total_amount: amount,
            items: vec![InvoiceItem {
                item_type: InvoiceItemType::Consultation,
                description: "Consultation".into(),
                quantity: 1,
                unit_price: amount,
                subtotal: amount,
                source_id: None,
            }],
        }
    }

    fn invoice(total: Money) -> Invoice {
        let mut invoice = Invoice::new(Uuid::new_v4(), Utc::now());
        apply_totals(&mut invoice, totals(total), Utc::now());
        invoice
    }

    fn visit_in(status: VisitStatus) -> Visit {
        let now = Utc::now();
        Visit {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            visit_datetime: now,
            visit_type: VisitType::General,
            status,
            chief_complaint: None,
            registration_staff_id: None,
            version: 3,
            created_at: now,
            updated_at: now,
        }
    }

    fn items_sum(invoice: &Invoice) -> Money {
        invoice.items.iter().map(|i| i.subtotal).sum()
    }

    #[test]
    fn full_payment_marks_paid() {
        let mut inv = invoice(dec!(150000));
        record_payment(&mut inv, dec!(150000), PaymentMethod::Cash, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(inv.payment_status, PaymentStatus::Paid);
        assert_eq!(inv.outstanding(), Decimal::ZERO);
    }

    #[test]
    fn partial_then_rest() {
        let mut inv = invoice(dec!(150000));
        record_payment(&mut inv, dec!(100000), PaymentMethod::Debit, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(inv.payment_status, PaymentStatus::Partial);
        record_payment(&mut inv, dec!(50000), PaymentMethod::Cash, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(inv.payment_status, PaymentStatus::Paid);
        assert_eq!(inv.payments.len(), 2);
        assert_eq!(inv.payment_method, Some(PaymentMethod::Cash));
    }

    #[test]
    fn overpayment_and_non_positive_amounts_are_rejected() {
        let mut inv = invoice(dec!(50000));
        let err = record_payment(&mut inv, dec!(50001), PaymentMethod::Cash, Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::Overpayment { .. })));
        let err = record_payment(&mut inv, dec!(0), PaymentMethod::Cash, Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::NonPositivePayment(_))));
        assert_eq!(inv.amount_paid, Decimal::ZERO);
        assert_eq!(inv.payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn canceled_invoice_takes_no_payment() {
        let mut inv = invoice(dec!(50000));
        cancel(&mut inv, &visit_in(VisitStatus::Completed), &[], Utc::now()).unwrap();
        let err = record_payment(&mut inv, dec!(10), PaymentMethod::Cash, Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::TerminalStateViolation { .. }));
    }

    #[test]
    fn paid_invoice_cannot_be_canceled() {
        let mut inv = invoice(dec!(50000));
        record_payment(&mut inv, dec!(20000), PaymentMethod::Cash, Uuid::new_v4(), Utc::now()).unwrap();
        let err = cancel(&mut inv, &visit_in(VisitStatus::Completed), &[], Utc::now()).unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(inv.payment_status, PaymentStatus::Partial);
    }

    #[test]
    fn cancel_waits_until_no_charge_can_arrive() {
        let mut inv = invoice(dec!(50000));
        for status in [VisitStatus::Registered, VisitStatus::Examining] {
            let err = cancel(&mut inv, &visit_in(status), &[], Utc::now()).unwrap_err();
            assert!(matches!(err, DomainError::VisitNotActive { current, .. } if current == status));
        }

        let completed = visit_in(VisitStatus::Completed);
        let open = [EntityKey::new(EntityType::LabOrder, Uuid::new_v4())];
        let err = cancel(&mut inv, &completed, &open, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::VisitNotActive { current: VisitStatus::Completed, .. }));
        assert_eq!(inv.payment_status, PaymentStatus::Unpaid);

        cancel(&mut inv, &completed, &[], Utc::now()).unwrap();
        assert_eq!(inv.payment_status, PaymentStatus::Canceled);
    }

    #[test]
    fn frozen_total_never_decreases() {
        let mut inv = invoice(dec!(150000));
        assert!(freeze(&mut inv, Utc::now()));
        assert!(!freeze(&mut inv, Utc::now()));
        apply_totals(&mut inv, totals(dec!(50000)), Utc::now());
        assert_eq!(inv.total_amount, dec!(150000));
        apply_totals(&mut inv, totals(dec!(200000)), Utc::now());
        assert_eq!(inv.total_amount, dec!(200000));
    }

    #[test]
    fn clamped_total_carries_an_adjustment_line() {
        let mut inv = invoice(dec!(150000));
        freeze(&mut inv, Utc::now());
        assert!(apply_totals(&mut inv, totals(dec!(50000)), Utc::now()));

        let adjustment = inv.items.last().unwrap();
        assert_eq!(adjustment.item_type, InvoiceItemType::Other);
        assert_eq!(adjustment.description, ADJUSTMENT_DESCRIPTION);
        assert_eq!(adjustment.subtotal, dec!(100000));
        assert_eq!(items_sum(&inv), inv.total_amount);

        assert!(!apply_totals(&mut inv, totals(dec!(50000)), Utc::now()));
        assert!(apply_totals(&mut inv, totals(dec!(200000)), Utc::now()));
        assert!(inv.items.iter().all(|i| i.item_type != InvoiceItemType::Other));
        assert_eq!(items_sum(&inv), dec!(200000));
    }

    #[test]
    fn total_held_at_amount_paid_still_adds_up() {
        let mut inv = invoice(dec!(80000));
        record_payment(&mut inv, dec!(80000), PaymentMethod::Cash, Uuid::new_v4(), Utc::now()).unwrap();
        apply_totals(&mut inv, totals(dec!(30000)), Utc::now());
        assert_eq!(inv.total_amount, dec!(80000));
        assert_eq!(items_sum(&inv), inv.total_amount);
        assert_eq!(inv.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn recompute_with_same_totals_is_a_no_op() {
        let mut inv = invoice(dec!(50000));
        assert!(!apply_totals(&mut inv, totals(dec!(50000)), Utc::now()));
    }

    #[test]
    fn status_tracks_total_growth() {
        let mut inv = invoice(dec!(50000));
        record_payment(&mut inv, dec!(50000), PaymentMethod::Cash, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(inv.payment_status, PaymentStatus::Paid);
        apply_totals(&mut inv, totals(dec!(80000)), Utc::now());
        assert_eq!(inv.payment_status, PaymentStatus::Partial);
        assert!(inv.amount_paid <= inv.total_amount);
    }
}
