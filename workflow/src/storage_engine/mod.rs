// workflow/src/storage_engine/mod.rs

pub mod inmemory_storage;
pub mod sled_storage;
pub mod storage_engine;
pub mod storage_utils;

pub use inmemory_storage::InMemoryStorage;
pub use sled_storage::{open_sled_db, SledStorage};
pub use storage_engine::{fetch, fetch_all, DataAccess, ListFilter, WriteBatch, WriteOp};

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crate::config::{StorageConfig, StorageEngineType};

/// Creates the store selected by `config`.
pub fn create_storage(config: &StorageConfig) -> Result<Arc<dyn DataAccess>> {
    match config.engine_type {
        StorageEngineType::InMemory => {
            info!("Using in-memory storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        StorageEngineType::Sled => {
            std::fs::create_dir_all(&config.data_directory)
                .with_context(|| format!("Failed to create data directory {:?}", config.data_directory))?;
            let storage = SledStorage::open(config.data_directory.join("sled"))
                .with_context(|| format!("Failed to open Sled storage under {:?}", config.data_directory))?;
            Ok(Arc::new(storage))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_configured_engine() {
        let memory = create_storage(&StorageConfig::default()).unwrap();
        assert_eq!(memory.get_type(), "InMemory");

        let dir = tempfile::TempDir::new().unwrap();
        let config = StorageConfig { engine_type: StorageEngineType::Sled, data_directory: dir.path().to_path_buf() };
        let sled = create_storage(&config).unwrap();
        assert_eq!(sled.get_type(), "Sled");
    }
}
