// security/src/capabilities.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::SecurityError;

/// A named permission. Each one guards exactly one transition or one
/// privileged read. The set is closed: anything else is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Capability {
    VisitCreate,
    VisitStartExam,
    VisitComplete,
    VisitCancel,
    VisitRead,
    MedicalRecordWrite,
    MedicalRecordRead,
    LabOrderCreate,
    LabOrderStart,
    LabOrderEnterResult,
    LabOrderCancel,
    LabOrderRead,
    PrescriptionCreate,
    PrescriptionStart,
    PrescriptionComplete,
    PrescriptionCancel,
    PrescriptionRead,
    ReferralCreate,
    ReferralRead,
    InvoiceRecordPayment,
    InvoiceCancel,
    InvoiceRead,
    PatientManage,
    UserManage,
}

impl Capability {
    pub const ALL: &'static [Capability] = &[
        Capability::VisitCreate,
        Capability::VisitStartExam,
        Capability::VisitComplete,
        Capability::VisitCancel,
        Capability::VisitRead,
        Capability::MedicalRecordWrite,
        Capability::MedicalRecordRead,
        Capability::LabOrderCreate,
        Capability::LabOrderStart,
        Capability::LabOrderEnterResult,
        Capability::LabOrderCancel,
        Capability::LabOrderRead,
        Capability::PrescriptionCreate,
        Capability::PrescriptionStart,
        Capability::PrescriptionComplete,
        Capability::PrescriptionCancel,
        Capability::PrescriptionRead,
        Capability::ReferralCreate,
        Capability::ReferralRead,
        Capability::InvoiceRecordPayment,
        Capability::InvoiceCancel,
        Capability::InvoiceRead,
        Capability::PatientManage,
        Capability::UserManage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::VisitCreate => "visit.create",
            Capability::VisitStartExam => "visit.start_exam",
            Capability::VisitComplete => "visit.complete",
            Capability::VisitCancel => "visit.cancel",
            Capability::VisitRead => "visit.read",
            Capability::MedicalRecordWrite => "medicalrecord.write",
            Capability::MedicalRecordRead => "medicalrecord.read",
            Capability::LabOrderCreate => "laborder.create",
            Capability::LabOrderStart => "laborder.start",
            Capability::LabOrderEnterResult => "laborder.enter_result",
            Capability::LabOrderCancel => "laborder.cancel",
            Capability::LabOrderRead => "laborder.read",
            Capability::PrescriptionCreate => "prescription.create",
            Capability::PrescriptionStart => "prescription.start",
            Capability::PrescriptionComplete => "prescription.complete",
            Capability::PrescriptionCancel => "prescription.cancel",
            Capability::PrescriptionRead => "prescription.read",
            Capability::ReferralCreate => "referral.create",
            Capability::ReferralRead => "referral.read",
            Capability::InvoiceRecordPayment => "invoice.record_payment",
            Capability::InvoiceCancel => "invoice.cancel",
            Capability::InvoiceRead => "invoice.read",
            Capability::PatientManage => "patient.manage",
            Capability::UserManage => "user.manage",
        }
    }

    /// The part before the dot, e.g. `laborder`.
    pub fn namespace(&self) -> &'static str {
        let name = self.as_str();
        name.split_once('.').map_or(name, |(ns, _)| ns)
    }

    /// Read capabilities never change state.
    pub fn is_read(&self) -> bool {
        self.as_str().ends_with(".read")
    }

    /// Resolves a table entry: either an exact name or a `namespace.*`
    /// wildcard.
    pub fn expand(pattern: &str) -> Result<Vec<Capability>, SecurityError> {
        let pattern = pattern.trim();
        if let Some(namespace) = pattern.strip_suffix(".*") {
            let matched: Vec<Capability> = Capability::ALL
                .iter()
                .copied()
                .filter(|c| c.namespace() == namespace)
                .collect();
            if matched.is_empty() {
                return Err(SecurityError::UnknownCapability(pattern.to_string()));
            }
            return Ok(matched);
        }
        Ok(vec![pattern.parse()?])
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| SecurityError::UnknownCapability(s.to_string()))
    }
}

impl TryFrom<String> for Capability {
    type Error = SecurityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.as_str().to_string()
    }
}
