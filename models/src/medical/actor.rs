// models/src/medical/actor.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ValidationError, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
    Staff,
    Patient,
}

labelled_enum!(Role, "role" {
    Admin => "admin",
    Doctor => "doctor",
    Staff => "staff",
    Patient => "patient",
});

/// Department a staff member works in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Registration,
    Pharmacy,
    Laboratory,
    Cashier,
}

labelled_enum!(Department, "department" {
    Registration => "registration",
    Pharmacy => "pharmacy",
    Laboratory => "laboratory",
    Cashier => "cashier",
});

/// The authenticated party performing an action.
///
/// Only `Staff` carries a department. A staff member whose department was
/// never assigned is still representable; such an actor holds no capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Actor {
    Admin {
        id: Uuid,
    },
    Doctor {
        id: Uuid,
    },
    Staff {
        id: Uuid,
        #[serde(default)]
        department: Option<Department>,
    },
    Patient {
        id: Uuid,
    },
}

impl Actor {
    pub fn admin(id: Uuid) -> Self {
        Actor::Admin { id }
    }

    pub fn doctor(id: Uuid) -> Self {
        Actor::Doctor { id }
    }

    pub fn staff(id: Uuid, department: Department) -> Self {
        Actor::Staff { id, department: Some(department) }
    }

    pub fn patient(id: Uuid) -> Self {
        Actor::Patient { id }
    }

    /// Builds an actor from loosely typed parts (token claims, API headers).
    /// A department on a non-staff role is rejected rather than dropped.
    pub fn from_parts(id: Uuid, role: Role, department: Option<Department>) -> ValidationResult<Self> {
        match (role, department) {
            (Role::Staff, department) => Ok(Actor::Staff { id, department }),
            (other, Some(_)) => Err(ValidationError::UnexpectedDepartment(other.to_string())),
            (Role::Admin, None) => Ok(Actor::Admin { id }),
            (Role::Doctor, None) => Ok(Actor::Doctor { id }),
            (Role::Patient, None) => Ok(Actor::Patient { id }),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Actor::Admin { id } | Actor::Doctor { id } | Actor::Patient { id } => *id,
            Actor::Staff { id, .. } => *id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Actor::Admin { .. } => Role::Admin,
            Actor::Doctor { .. } => Role::Doctor,
            Actor::Staff { .. } => Role::Staff,
            Actor::Patient { .. } => Role::Patient,
        }
    }

    pub fn department(&self) -> Option<Department> {
        match self {
            Actor::Staff { department, .. } => *department,
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin { .. })
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Staff { id, department: Some(dept) } => write!(f, "staff({}):{}", dept, id),
            Actor::Staff { id, department: None } => write!(f, "staff(unassigned):{}", id),
            other => write!(f, "{}:{}", other.role(), other.id()),
        }
    }
}
