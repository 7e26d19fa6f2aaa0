// workflow/src/orchestrator/mod.rs

pub mod actions;
pub mod delta;
pub mod orchestrator;
pub mod overview;

pub use actions::{
    Action, Command, CreateLabOrder, CreatePrescription, CreateReferral, EnterLabResult, InvoiceTransition,
    LabOrderTransition, PrescriptionTransition, RecordPayment, UpsertMedicalRecord, VisitTransition,
};
pub use delta::{Change, ChangeKind, EntityDelta, InvoiceSummary};
pub use orchestrator::WorkflowOrchestrator;
pub use overview::{available_actions, AvailableAction, VisitOverview};
