// security/src/roles.rs
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use models::{Actor, Department, Role};

use crate::capabilities::Capability;
use crate::{AuthResult, DenialReason};

/// Table file layout. Entries are capability names or `namespace.*`.
///
/// ```yaml
/// roles:
///   doctor: [visit.start_exam, visit.complete, "medicalrecord.*"]
/// departments:
///   pharmacy: ["prescription.*"]
/// ```
#[derive(Debug, Deserialize, Default)]
struct RawCapabilityTable {
    #[serde(default)]
    roles: HashMap<String, Vec<String>>,
    #[serde(default)]
    departments: HashMap<String, Vec<String>>,
}

/// Maps `{role}` or `{staff, department}` to the capabilities it holds.
/// Admin is not listed: it holds every capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTable {
    roles: HashMap<Role, BTreeSet<Capability>>,
    departments: HashMap<Department, BTreeSet<Capability>>,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl CapabilityTable {
    /// The clinic's built-in table.
    pub fn standard() -> Self {
        use Capability::*;

        let mut roles = HashMap::new();
        roles.insert(
            Role::Doctor,
            BTreeSet::from([
                VisitStartExam,
                VisitComplete,
                VisitRead,
                MedicalRecordWrite,
                MedicalRecordRead,
                LabOrderCreate,
                LabOrderRead,
                PrescriptionCreate,
                PrescriptionRead,
                ReferralCreate,
                ReferralRead,
            ]),
        );
        roles.insert(
            Role::Patient,
            BTreeSet::from([VisitRead, MedicalRecordRead, LabOrderRead, PrescriptionRead, ReferralRead, InvoiceRead]),
        );

        let mut departments = HashMap::new();
        departments.insert(
            Department::Registration,
            BTreeSet::from([VisitCreate, VisitCancel, VisitRead, PatientManage]),
        );
        departments.insert(Department::Pharmacy, namespace(&["prescription", "visit.read"]));
        departments.insert(Department::Laboratory, namespace(&["laborder", "visit.read"]));
        departments.insert(Department::Cashier, namespace(&["invoice", "visit.read"]));

        CapabilityTable { roles, departments }
    }

    /// An empty table: only admin can do anything.
    pub fn empty() -> Self {
        CapabilityTable { roles: HashMap::new(), departments: HashMap::new() }
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read capability table {:?}", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid capability table {:?}", path))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let raw: RawCapabilityTable = serde_yaml::from_str(content)?;
        let mut table = CapabilityTable::empty();

        for (role_name, entries) in raw.roles {
            let role: Role = role_name.parse()?;
            if role == Role::Admin {
                bail!("admin holds every capability and cannot be listed in the table");
            }
            table.roles.insert(role, expand_all(&entries)?);
        }
        for (dept_name, entries) in raw.departments {
            let department: Department = dept_name.parse()?;
            table.departments.insert(department, expand_all(&entries)?);
        }
        Ok(table)
    }

    /// Everything `actor` holds, before any per-record ownership rule.
    pub fn capabilities_for(&self, actor: &Actor) -> BTreeSet<Capability> {
        match actor {
            Actor::Admin { .. } => Capability::ALL.iter().copied().collect(),
            Actor::Staff { department: None, .. } => BTreeSet::new(),
            Actor::Staff { department: Some(dept), .. } => {
                let mut caps = self.roles.get(&Role::Staff).cloned().unwrap_or_default();
                caps.extend(self.departments.get(dept).into_iter().flatten().copied());
                caps
            }
            other => self.roles.get(&other.role()).cloned().unwrap_or_default(),
        }
    }

    pub fn has_capability(&self, actor: &Actor, capability: Capability) -> bool {
        match actor {
            Actor::Admin { .. } => true,
            Actor::Staff { department: None, .. } => false,
            Actor::Staff { department: Some(dept), .. } => {
                self.roles.get(&Role::Staff).is_some_and(|caps| caps.contains(&capability))
                    || self.departments.get(dept).is_some_and(|caps| caps.contains(&capability))
            }
            other => self
                .roles
                .get(&other.role())
                .is_some_and(|caps| caps.contains(&capability)),
        }
    }

    pub fn authorize(&self, actor: &Actor, capability: Capability) -> AuthResult {
        if let Actor::Staff { department: None, .. } = actor {
            return AuthResult::denied(actor, DenialReason::NoDepartment);
        }
        if self.has_capability(actor, capability) {
            AuthResult::Allowed
        } else {
            AuthResult::denied(actor, DenialReason::MissingCapability)
        }
    }

    /// Resolves by capability name. Names outside the closed set are denied.
    pub fn authorize_named(&self, actor: &Actor, name: &str) -> AuthResult {
        match name.parse::<Capability>() {
            Ok(capability) => self.authorize(actor, capability),
            Err(_) => AuthResult::denied(actor, DenialReason::UnknownCapability),
        }
    }
}

fn expand_all(entries: &[String]) -> Result<BTreeSet<Capability>> {
    let mut caps = BTreeSet::new();
    for entry in entries {
        caps.extend(Capability::expand(entry)?);
    }
    Ok(caps)
}

/// Collects whole namespaces (`"invoice"`) and single names (`"visit.read"`).
fn namespace(entries: &[&str]) -> BTreeSet<Capability> {
    Capability::ALL
        .iter()
        .copied()
        .filter(|c| entries.iter().any(|e| *e == c.namespace() || *e == c.as_str()))
        .collect()
}
