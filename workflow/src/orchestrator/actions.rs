// workflow/src/orchestrator/actions.rs

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use models::{
    MedicalRecordFields, Money, NewVisit, PaymentMethod, PrescriptionItem, ReferralDetails, ValidationError,
    ValidationResult,
};
use security::Capability;

use crate::state_machine::LabResultInput;

/// Everything the UI/API layer can ask the workflow to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Action {
    VisitRegister,
    VisitStartExam,
    VisitComplete,
    VisitCancel,
    MedicalRecordUpsert,
    LabOrderCreate,
    LabOrderStart,
    LabOrderEnterResult,
    LabOrderCancel,
    PrescriptionCreate,
    PrescriptionStart,
    PrescriptionComplete,
    PrescriptionCancel,
    ReferralCreate,
    InvoiceRecordPayment,
    InvoiceCancel,
}

impl Action {
    pub const ALL: &'static [Action] = &[
        Action::VisitRegister,
        Action::VisitStartExam,
        Action::VisitComplete,
        Action::VisitCancel,
        Action::MedicalRecordUpsert,
        Action::LabOrderCreate,
        Action::LabOrderStart,
        Action::LabOrderEnterResult,
        Action::LabOrderCancel,
        Action::PrescriptionCreate,
        Action::PrescriptionStart,
        Action::PrescriptionComplete,
        Action::PrescriptionCancel,
        Action::ReferralCreate,
        Action::InvoiceRecordPayment,
        Action::InvoiceCancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::VisitRegister => "visit.register",
            Action::VisitStartExam => "visit.start_exam",
            Action::VisitComplete => "visit.complete",
            Action::VisitCancel => "visit.cancel",
            Action::MedicalRecordUpsert => "medicalrecord.upsert",
            Action::LabOrderCreate => "laborder.create",
            Action::LabOrderStart => "laborder.start",
            Action::LabOrderEnterResult => "laborder.enter_result",
            Action::LabOrderCancel => "laborder.cancel",
            Action::PrescriptionCreate => "prescription.create",
            Action::PrescriptionStart => "prescription.start",
            Action::PrescriptionComplete => "prescription.complete",
            Action::PrescriptionCancel => "prescription.cancel",
            Action::ReferralCreate => "referral.create",
            Action::InvoiceRecordPayment => "invoice.record_payment",
            Action::InvoiceCancel => "invoice.cancel",
        }
    }

    /// The capability that guards this action.
    pub fn capability(&self) -> Capability {
        match self {
            Action::VisitRegister => Capability::VisitCreate,
            Action::VisitStartExam => Capability::VisitStartExam,
            Action::VisitComplete => Capability::VisitComplete,
            Action::VisitCancel => Capability::VisitCancel,
            Action::MedicalRecordUpsert => Capability::MedicalRecordWrite,
            Action::LabOrderCreate => Capability::LabOrderCreate,
            Action::LabOrderStart => Capability::LabOrderStart,
            Action::LabOrderEnterResult => Capability::LabOrderEnterResult,
            Action::LabOrderCancel => Capability::LabOrderCancel,
            Action::PrescriptionCreate => Capability::PrescriptionCreate,
            Action::PrescriptionStart => Capability::PrescriptionStart,
            Action::PrescriptionComplete => Capability::PrescriptionComplete,
            Action::PrescriptionCancel => Capability::PrescriptionCancel,
            Action::ReferralCreate => Capability::ReferralCreate,
            Action::InvoiceRecordPayment => Capability::InvoiceRecordPayment,
            Action::InvoiceCancel => Capability::InvoiceCancel,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| ValidationError::UnknownAction(s.to_string()))
    }
}

impl TryFrom<String> for Action {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Action> for String {
    fn from(value: Action) -> Self {
        value.as_str().to_string()
    }
}

/// `visit.start_exam`, `visit.complete` and `visit.cancel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitTransition {
    pub visit_id: Uuid,
    pub expected_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertMedicalRecord {
    pub visit_id: Uuid,
    /// Last-seen version of the record; required once it exists.
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(default)]
    pub expected_visit_version: Option<u64>,
    #[serde(flatten)]
    pub fields: MedicalRecordFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLabOrder {
    pub visit_id: Uuid,
    pub lab_test_id: Uuid,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expected_visit_version: Option<u64>,
}

/// `laborder.start` and `laborder.cancel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabOrderTransition {
    pub lab_order_id: Uuid,
    pub expected_version: u64,
    #[serde(default)]
    pub expected_visit_version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterLabResult {
    pub lab_order_id: Uuid,
    pub expected_version: u64,
    #[serde(default)]
    pub expected_visit_version: Option<u64>,
    #[serde(flatten)]
    pub result: LabResultInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePrescription {
    pub visit_id: Uuid,
    pub items: Vec<PrescriptionItem>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expected_visit_version: Option<u64>,
}

/// `prescription.start`, `prescription.complete` and `prescription.cancel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionTransition {
    pub prescription_id: Uuid,
    pub expected_version: u64,
    #[serde(default)]
    pub expected_visit_version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateReferral {
    pub visit_id: Uuid,
    #[serde(default)]
    pub expected_visit_version: Option<u64>,
    #[serde(flatten)]
    pub details: ReferralDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub invoice_id: Uuid,
    pub expected_version: u64,
    pub amount: Money,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTransition {
    pub invoice_id: Uuid,
    pub expected_version: u64,
}

/// A decoded request, one variant per action.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RegisterVisit(NewVisit),
    StartExam(VisitTransition),
    CompleteVisit(VisitTransition),
    CancelVisit(VisitTransition),
    UpsertMedicalRecord(UpsertMedicalRecord),
    CreateLabOrder(CreateLabOrder),
    StartLabOrder(LabOrderTransition),
    EnterLabResult(EnterLabResult),
    CancelLabOrder(LabOrderTransition),
    CreatePrescription(CreatePrescription),
    StartPrescription(PrescriptionTransition),
    CompletePrescription(PrescriptionTransition),
    CancelPrescription(PrescriptionTransition),
    CreateReferral(CreateReferral),
    RecordPayment(RecordPayment),
    CancelInvoice(InvoiceTransition),
}

impl Command {
    pub fn action(&self) -> Action {
        match self {
            Command::RegisterVisit(_) => Action::VisitRegister,
            Command::StartExam(_) => Action::VisitStartExam,
            Command::CompleteVisit(_) => Action::VisitComplete,
            Command::CancelVisit(_) => Action::VisitCancel,
            Command::UpsertMedicalRecord(_) => Action::MedicalRecordUpsert,
            Command::CreateLabOrder(_) => Action::LabOrderCreate,
            Command::StartLabOrder(_) => Action::LabOrderStart,
            Command::EnterLabResult(_) => Action::LabOrderEnterResult,
            Command::CancelLabOrder(_) => Action::LabOrderCancel,
            Command::CreatePrescription(_) => Action::PrescriptionCreate,
            Command::StartPrescription(_) => Action::PrescriptionStart,
            Command::CompletePrescription(_) => Action::PrescriptionComplete,
            Command::CancelPrescription(_) => Action::PrescriptionCancel,
            Command::CreateReferral(_) => Action::ReferralCreate,
            Command::RecordPayment(_) => Action::InvoiceRecordPayment,
            Command::CancelInvoice(_) => Action::InvoiceCancel,
        }
    }

    /// Decodes the JSON payload of `action`.
    pub fn parse(action: Action, payload: Value) -> ValidationResult<Command> {
        Ok(match action {
            Action::VisitRegister => Command::RegisterVisit(decode(action, payload)?),
            Action::VisitStartExam => Command::StartExam(decode(action, payload)?),
            Action::VisitComplete => Command::CompleteVisit(decode(action, payload)?),
            Action::VisitCancel => Command::CancelVisit(decode(action, payload)?),
            Action::MedicalRecordUpsert => Command::UpsertMedicalRecord(decode(action, payload)?),
            Action::LabOrderCreate => Command::CreateLabOrder(decode(action, payload)?),
            Action::LabOrderStart => Command::StartLabOrder(decode(action, payload)?),
            Action::LabOrderEnterResult => Command::EnterLabResult(decode(action, payload)?),
            Action::LabOrderCancel => Command::CancelLabOrder(decode(action, payload)?),
            Action::PrescriptionCreate => Command::CreatePrescription(decode(action, payload)?),
            Action::PrescriptionStart => Command::StartPrescription(decode(action, payload)?),
            Action::PrescriptionComplete => Command::CompletePrescription(decode(action, payload)?),
            Action::PrescriptionCancel => Command::CancelPrescription(decode(action, payload)?),
            Action::ReferralCreate => Command::CreateReferral(decode(action, payload)?),
            Action::InvoiceRecordPayment => Command::RecordPayment(decode(action, payload)?),
            Action::InvoiceCancel => Command::CancelInvoice(decode(action, payload)?),
        })
    }
}

fn decode<T: DeserializeOwned>(action: Action, payload: Value) -> ValidationResult<T> {
    serde_json::from_value(payload).map_err(|e| ValidationError::MalformedPayload {
        action: action.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), *action);
        }
        assert_eq!(
            "visit.delete".parse::<Action>().unwrap_err(),
            ValidationError::UnknownAction("visit.delete".into())
        );
    }

    #[test]
    fn register_maps_to_visit_create() {
        assert_eq!(Action::VisitRegister.capability(), Capability::VisitCreate);
        assert_eq!(Action::MedicalRecordUpsert.capability(), Capability::MedicalRecordWrite);
    }

    #[test]
    fn payload_decodes_into_typed_command() {
        let order = Uuid::new_v4();
        let command = Command::parse(
            Action::LabOrderEnterResult,
            json!({ "lab_order_id": order, "expected_version": 2, "value": "5.4", "unit": "mmol/L" }),
        )
        .unwrap();
        match command {
            Command::EnterLabResult(p) => {
                assert_eq!(p.lab_order_id, order);
                assert_eq!(p.result.value, "5.4");
                assert_eq!(p.result.unit.as_deref(), Some("mmol/L"));
                assert_eq!(p.expected_visit_version, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn referral_payload_leaves_missing_text_for_validation() {
        let visit = Uuid::new_v4();
        let command = Command::parse(
            Action::ReferralCreate,
            json!({ "visit_id": visit, "referred_to_facility": "RSUD Dr. Soetomo" }),
        )
        .unwrap();
        match command {
            Command::CreateReferral(p) => {
                assert_eq!(p.visit_id, visit);
                assert_eq!(p.details.referred_to_facility, "RSUD Dr. Soetomo");
                assert!(p.details.reason.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(Action::ReferralCreate.capability(), Capability::ReferralCreate);
    }

    #[test]
    fn malformed_payload_is_a_validation_error() {
        let err = Command::parse(Action::VisitCancel, json!({ "visit_id": "not-a-uuid" })).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedPayload { action, .. } if action == "visit.cancel"));
    }

    #[test]
    fn payment_amount_accepts_numbers_and_strings() {
        let invoice = Uuid::new_v4();
        for amount in [json!(150000), json!("150000.00")] {
            let command = Command::parse(
                Action::InvoiceRecordPayment,
                json!({ "invoice_id": invoice, "expected_version": 1, "amount": amount, "method": "bpjs" }),
            )
            .unwrap();
            match command {
                Command::RecordPayment(p) => {
                    assert_eq!(p.amount, Money::from(150_000));
                    assert_eq!(p.method, PaymentMethod::Bpjs);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
