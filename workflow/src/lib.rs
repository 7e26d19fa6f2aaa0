// workflow/src/lib.rs
//! Lifecycle engine of a clinic visit.
//!
//! A [`WorkflowOrchestrator`] takes an action from an authenticated
//! [`Actor`](models::Actor), checks it against the capability table, runs it
//! through the visit and satellite state machines, recomputes the visit's bill
//! and commits the result to a [`DataAccess`] store in one versioned batch.

pub mod billing;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod state_machine;
pub mod storage_engine;

pub use billing::{compute_invoice, InvoiceTotals, PriceBook};
pub use config::{load_workflow_config_from_yaml, CanceledInvoicePolicy, CompletionPolicy, WorkflowConfig};
pub use errors::{DomainError, DomainResult, StorageError, StorageResult};
pub use orchestrator::{Action, AvailableAction, Command, EntityDelta, VisitOverview, WorkflowOrchestrator};
pub use storage_engine::{create_storage, DataAccess, InMemoryStorage, ListFilter, SledStorage, WriteBatch};
