// workflow/src/config/mod.rs

pub mod config_defaults;
pub mod config_structs;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, info};

pub use config_defaults::*;
pub use config_structs::{AuthConfig, CanceledInvoicePolicy, CompletionPolicy, StorageConfig, StorageEngineType, WorkflowConfig};

/// Loads the workflow configuration. Without a path every setting takes its
/// default; with one, missing keys still fall back to their defaults.
pub fn load_workflow_config_from_yaml(path: Option<&Path>) -> Result<WorkflowConfig> {
    let Some(path) = path else {
        debug!("No workflow config path given, using defaults");
        return Ok(WorkflowConfig::default());
    };

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config = parse_workflow_config(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    info!("Loaded workflow config from {:?}", path);
    Ok(config)
}

pub fn parse_workflow_config(content: &str) -> Result<WorkflowConfig> {
    if content.trim().is_empty() {
        return Ok(WorkflowConfig::default());
    }
    let config: WorkflowConfig = serde_yaml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &WorkflowConfig) -> Result<()> {
    if config.consultation_fee.is_sign_negative() {
        bail!("consultation_fee must not be negative, got {}", config.consultation_fee);
    }
    if !(0..=MAX_REGISTRATION_GRACE_MINUTES).contains(&config.registration_grace_minutes) {
        bail!(
            "registration_grace_minutes must be between 0 and {}, got {}",
            MAX_REGISTRATION_GRACE_MINUTES,
            config.registration_grace_minutes
        );
    }
    if !(1..=MAX_TOKEN_TTL_MINUTES).contains(&config.auth.token_ttl_minutes) {
        bail!(
            "auth.token_ttl_minutes must be between 1 and {}, got {}",
            MAX_TOKEN_TTL_MINUTES,
            config.auth.token_ttl_minutes
        );
    }
    if config.auth.jwt_secret.is_empty() {
        bail!("auth.jwt_secret must not be empty");
    }
    Ok(())
}
