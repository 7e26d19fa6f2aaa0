// models/src/errors.rs

use rust_decimal::Decimal;
pub use thiserror::Error;
use uuid::Uuid;

/// A payload or field constraint violation. These are caller mistakes and are
/// never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was absent from the payload.
    #[error("required field '{0}' is missing")]
    MissingField(String),
    /// A field was present but its value breaks a constraint.
    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },
    /// A label did not match any known variant (role, status, ...).
    #[error("unknown {kind} '{value}'")]
    UnknownValue { kind: String, value: String },
    /// Only staff actors carry a department.
    #[error("department is only valid for staff, not for role '{0}'")]
    UnexpectedDepartment(String),
    #[error("invalid entity key '{0}'")]
    InvalidEntityKey(String),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("malformed payload for {action}: {reason}")]
    MalformedPayload { action: String, reason: String },
    /// Registration for a slot that already lies behind the grace window.
    #[error("visit datetime {0} is earlier than the registration grace window allows")]
    VisitInPast(String),
    #[error("a prescription needs at least one item")]
    EmptyPrescription,
    #[error("prescription item {index}: quantity must be at least 1")]
    InvalidQuantity { index: usize },
    #[error("lab result value must not be blank")]
    BlankResult,
    #[error("payment amount must be positive, got {0}")]
    NonPositivePayment(Decimal),
    #[error("payment of {amount} exceeds the outstanding balance of {outstanding}")]
    Overpayment { amount: Decimal, outstanding: Decimal },
    #[error("{kind} {id} is not in the catalog")]
    UnknownCatalogItem { kind: String, id: Uuid },
    #[error("lab test {0} is not active")]
    InactiveLabTest(Uuid),
    #[error("visit {0} already has an active prescription")]
    DuplicatePrescription(Uuid),
}

/// A type alias for a `Result` that returns a `ValidationError` on failure.
pub type ValidationResult<T> = Result<T, ValidationError>;
