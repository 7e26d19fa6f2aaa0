// workflow/src/storage_engine/sled_storage.rs

use std::path::Path;

use async_trait::async_trait;
use log::{debug, info};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError, TransactionalTree};
use uuid::Uuid;

use models::{Entity, EntityKey, EntityType};

use super::storage_engine::{DataAccess, ListFilter, WriteBatch, WriteOp};
use super::storage_utils::{check_version, deserialize_entity, serialize_entity, stamped, validate_batch};
use crate::errors::{StorageError, StorageResult};

const ENTITY_TREE: &str = "entities";

pub fn open_sled_db<P: AsRef<Path>>(path: P) -> StorageResult<sled::Db> {
    let path = path.as_ref();
    info!("Opening Sled database at {:?}", path);
    sled::open(path).map_err(StorageError::from)
}

/// Sled-backed store. All records live in one tree under
/// `<entity_type>/<uuid>` keys with JSON values.
#[derive(Debug, Clone)]
pub struct SledStorage {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStorage {
    pub fn new(db: sled::Db) -> StorageResult<Self> {
        let tree = db.open_tree(ENTITY_TREE)?;
        Ok(SledStorage { db, tree })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::new(open_sled_db(path)?)
    }

    pub async fn flush(&self) -> StorageResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

fn abort(err: StorageError) -> ConflictableTransactionError<StorageError> {
    ConflictableTransactionError::Abort(err)
}

fn stored_version(tx: &TransactionalTree, key: &EntityKey) -> ConflictableTransactionResult<Option<u64>, StorageError> {
    match tx.get(key.to_bytes())? {
        Some(bytes) => {
            let entity = deserialize_entity(&bytes).map_err(abort)?;
            Ok(Some(entity.version()))
        }
        None => Ok(None),
    }
}

#[async_trait]
impl DataAccess for SledStorage {
    async fn get(&self, entity_type: EntityType, id: Uuid) -> StorageResult<Entity> {
        let key = EntityKey::new(entity_type, id);
        match self.tree.get(key.to_bytes())? {
            Some(bytes) => deserialize_entity(&bytes),
            None => Err(StorageError::NotFound(key)),
        }
    }

    async fn list(&self, entity_type: EntityType, filter: &ListFilter) -> StorageResult<Vec<Entity>> {
        let mut entities = Vec::new();
        for item in self.tree.scan_prefix(EntityKey::prefix(entity_type).as_bytes()) {
            let (_, value) = item?;
            let entity = deserialize_entity(&value)?;
            if filter.matches(&entity) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<Vec<Entity>> {
        validate_batch(batch.ops())?;

        let result = self.tree.transaction(|tx: &TransactionalTree| -> ConflictableTransactionResult<Vec<Entity>, StorageError> {
            let mut stored = Vec::new();
            for op in batch.ops() {
                let key = op.key();
                let current = stored_version(tx, &key)?;
                if let WriteOp::Delete { .. } = op {
                    if current.is_none() {
                        return Err(abort(StorageError::NotFound(key)));
                    }
                }
                check_version(key, op.expected_version(), current).map_err(abort)?;

                match op {
                    WriteOp::Put { entity, expected_version } => {
                        let entity = stamped(entity, *expected_version);
                        let bytes = serialize_entity(&entity).map_err(abort)?;
                        tx.insert(key.to_bytes(), bytes)?;
                        stored.push(entity);
                    }
                    WriteOp::Delete { .. } => {
                        tx.remove(key.to_bytes())?;
                    }
                    WriteOp::Guard { .. } => {}
                }
            }
            Ok(stored)
        });

        let stored = match result {
            Ok(stored) => stored,
            Err(TransactionError::Abort(err)) => return Err(err),
            Err(TransactionError::Storage(err)) => return Err(StorageError::Sled(err)),
        };
        self.tree.flush_async().await?;
        debug!("Sled commit applied {} ops, {} records written", batch.len(), stored.len());
        Ok(stored)
    }

    fn get_type(&self) -> &'static str {
        "Sled"
    }
}
