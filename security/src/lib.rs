// security/src/lib.rs
//! Who may do what in the clinic workflow.
//!
//! Resolution is a pure lookup in a [`CapabilityTable`]; denials always carry
//! the dashboard the caller should be sent back to.

use once_cell::sync::Lazy;
use serde::Serialize;
use thiserror::Error;

use models::{Actor, ValidationError};

pub mod capabilities;
pub mod claims;
pub mod ownership;
pub mod roles;
pub mod routes;

pub use capabilities::Capability;
pub use claims::{actor_from_token, decode_claims, issue_token, Claims};
pub use ownership::{authorize_visit, owns_visit};
pub use roles::CapabilityTable;
pub use routes::{fallback_route, RoutePath};

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("unknown capability '{0}'")]
    UnknownCapability(String),
    #[error("JWT error: {0}")]
    Jwt(String),
    #[error("invalid token claims: {0}")]
    InvalidClaims(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The role/department does not hold the capability.
    MissingCapability,
    /// Staff account with no department assigned.
    NoDepartment,
    /// The capability name is not part of the closed set.
    UnknownCapability,
    /// Holds the capability but not for this record.
    NotOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AuthResult {
    Allowed,
    Denied { fallback: RoutePath, reason: DenialReason },
}

impl AuthResult {
    pub fn denied(actor: &Actor, reason: DenialReason) -> Self {
        AuthResult::Denied { fallback: fallback_route(actor), reason }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthResult::Allowed)
    }

    pub fn fallback(&self) -> Option<RoutePath> {
        match self {
            AuthResult::Allowed => None,
            AuthResult::Denied { fallback, .. } => Some(*fallback),
        }
    }

    pub fn reason(&self) -> Option<DenialReason> {
        match self {
            AuthResult::Allowed => None,
            AuthResult::Denied { reason, .. } => Some(*reason),
        }
    }
}

static STANDARD_TABLE: Lazy<CapabilityTable> = Lazy::new(CapabilityTable::standard);

/// Resolves against the built-in table.
pub fn authorize(actor: &Actor, capability: Capability) -> AuthResult {
    STANDARD_TABLE.authorize(actor, capability)
}

/// Resolves a capability given by name against the built-in table.
pub fn authorize_named(actor: &Actor, name: &str) -> AuthResult {
    STANDARD_TABLE.authorize_named(actor, name)
}
