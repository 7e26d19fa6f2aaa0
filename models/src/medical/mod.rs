// models/src/medical/mod.rs

pub mod actor;
pub mod catalog;
pub mod fulfillment;
pub mod invoice;
pub mod lab_order;
pub mod medical_record;
pub mod prescription;
pub mod referral;
pub mod visit;

pub use actor::{Actor, Department, Role};
pub use catalog::{LabTest, Medicine};
pub use fulfillment::{FulfillmentStatus, LabOrderStatus, PrescriptionStatus};
pub use invoice::{Invoice, InvoiceItem, InvoiceItemType, Money, Payment, PaymentMethod, PaymentStatus};
pub use lab_order::{LabOrder, LabResult};
pub use medical_record::{MedicalRecord, MedicalRecordFields, Outcome};
pub use prescription::{validate_items, Prescription, PrescriptionItem};
pub use referral::{Referral, ReferralDetails, ReferralStatus};
pub use visit::{NewVisit, Visit, VisitStatus, VisitType};
