// security/src/routes.rs

use std::fmt;

use serde::Serialize;

use models::{Actor, Department};

/// Where the UI should send an actor that tried something it may not do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RoutePath(pub &'static str);

pub const GENERIC_DASHBOARD: RoutePath = RoutePath("/dashboard");
pub const ADMIN_DASHBOARD: RoutePath = RoutePath("/dashboard/admin");
pub const DOCTOR_DASHBOARD: RoutePath = RoutePath("/dashboard/doctor");
pub const PATIENT_DASHBOARD: RoutePath = RoutePath("/dashboard/patient");
pub const REGISTRATION_DASHBOARD: RoutePath = RoutePath("/dashboard/registration");
pub const PHARMACY_DASHBOARD: RoutePath = RoutePath("/dashboard/pharmacy");
pub const LAB_DASHBOARD: RoutePath = RoutePath("/dashboard/lab");
pub const CASHIER_DASHBOARD: RoutePath = RoutePath("/dashboard/cashier");

impl RoutePath {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Home dashboard of an actor. Depends only on role and department.
pub fn fallback_route(actor: &Actor) -> RoutePath {
    match actor {
        Actor::Admin { .. } => ADMIN_DASHBOARD,
        Actor::Doctor { .. } => DOCTOR_DASHBOARD,
        Actor::Patient { .. } => PATIENT_DASHBOARD,
        Actor::Staff { department: None, .. } => GENERIC_DASHBOARD,
        Actor::Staff { department: Some(dept), .. } => match dept {
            Department::Registration => REGISTRATION_DASHBOARD,
            Department::Pharmacy => PHARMACY_DASHBOARD,
            Department::Laboratory => LAB_DASHBOARD,
            Department::Cashier => CASHIER_DASHBOARD,
        },
    }
}
