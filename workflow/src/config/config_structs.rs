// workflow/src/config/config_structs.rs

use std::path::PathBuf;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::config_defaults::*;

/// Whether a visit may complete while lab orders or prescriptions are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    #[default]
    RequireTerminalChildren,
    AllowOpenChildren,
}

/// What happens to the invoice when its visit is canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CanceledInvoicePolicy {
    /// Cancel an unpaid invoice, keep one that already holds payments.
    #[default]
    RetainIfPaid,
    AlwaysCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageEngineType {
    #[default]
    InMemory,
    Sled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_engine_type")]
    pub engine_type: StorageEngineType,
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        default_storage_config()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        default_auth_config()
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::try_minutes(self.token_ttl_minutes).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_consultation_fee")]
    pub consultation_fee: Decimal,
    /// How far in the past a visit may still be registered.
    #[serde(default = "default_registration_grace_minutes")]
    pub registration_grace_minutes: i64,
    #[serde(default = "default_completion_policy")]
    pub completion_policy: CompletionPolicy,
    #[serde(default = "default_canceled_visit_invoice")]
    pub canceled_visit_invoice: CanceledInvoicePolicy,
    #[serde(default = "default_storage_config")]
    pub storage: StorageConfig,
    #[serde(default = "default_auth_config")]
    pub auth: AuthConfig,
    /// Optional YAML capability table replacing the built-in one.
    #[serde(default)]
    pub capabilities_file: Option<PathBuf>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        WorkflowConfig {
            consultation_fee: default_consultation_fee(),
            registration_grace_minutes: default_registration_grace_minutes(),
            completion_policy: default_completion_policy(),
            canceled_visit_invoice: default_canceled_visit_invoice(),
            storage: default_storage_config(),
            auth: default_auth_config(),
            capabilities_file: None,
        }
    }
}

impl WorkflowConfig {
    pub fn grace_window(&self) -> Duration {
        Duration::try_minutes(self.registration_grace_minutes).unwrap_or(Duration::MAX)
    }
}
