// workflow/src/config/config_defaults.rs

use std::path::PathBuf;

use rust_decimal::Decimal;

use super::config_structs::{AuthConfig, CanceledInvoicePolicy, CompletionPolicy, StorageConfig, StorageEngineType};

pub const DEFAULT_CONSULTATION_FEE: i64 = 50_000;
pub const DEFAULT_REGISTRATION_GRACE_MINUTES: i64 = 60;
pub const DEFAULT_DATA_DIRECTORY: &str = "./data/clinic";
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60 * 8;
pub const DEFAULT_JWT_SECRET: &str = "clinic-workflow-dev-secret";

/// One year. Upper bound for both minute settings.
pub const MAX_REGISTRATION_GRACE_MINUTES: i64 = 60 * 24 * 365;
pub const MAX_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 365;

pub fn default_consultation_fee() -> Decimal {
    Decimal::from(DEFAULT_CONSULTATION_FEE)
}
pub fn default_registration_grace_minutes() -> i64 { DEFAULT_REGISTRATION_GRACE_MINUTES }
pub fn default_completion_policy() -> CompletionPolicy { CompletionPolicy::RequireTerminalChildren }
pub fn default_canceled_visit_invoice() -> CanceledInvoicePolicy { CanceledInvoicePolicy::RetainIfPaid }
pub fn default_storage_engine_type() -> StorageEngineType { StorageEngineType::InMemory }
pub fn default_data_directory() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIRECTORY)
}
pub fn default_jwt_secret() -> String { DEFAULT_JWT_SECRET.to_string() }
pub fn default_token_ttl_minutes() -> i64 { DEFAULT_TOKEN_TTL_MINUTES }

pub fn default_storage_config() -> StorageConfig {
    StorageConfig {
        engine_type: default_storage_engine_type(),
        data_directory: default_data_directory(),
    }
}

pub fn default_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: default_jwt_secret(),
        token_ttl_minutes: default_token_ttl_minutes(),
    }
}
