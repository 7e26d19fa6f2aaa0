// workflow/src/storage_engine/inmemory_storage.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;
use uuid::Uuid;

use models::{Entity, EntityKey, EntityType};

use super::storage_engine::{DataAccess, ListFilter, WriteBatch, WriteOp};
use super::storage_utils::{check_version, stamped, validate_batch};
use crate::errors::{StorageError, StorageResult};

/// Store for tests and embedding. Cloning shares the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    entities: Arc<RwLock<BTreeMap<EntityKey, Entity>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

#[async_trait]
impl DataAccess for InMemoryStorage {
    async fn get(&self, entity_type: EntityType, id: Uuid) -> StorageResult<Entity> {
        let key = EntityKey::new(entity_type, id);
        let entities = self.entities.read().await;
        entities.get(&key).cloned().ok_or(StorageError::NotFound(key))
    }

    async fn list(&self, entity_type: EntityType, filter: &ListFilter) -> StorageResult<Vec<Entity>> {
        let entities = self.entities.read().await;
        Ok(entities
            .iter()
            .filter(|(key, entity)| key.entity_type == entity_type && filter.matches(entity))
            .map(|(_, entity)| entity.clone())
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<Vec<Entity>> {
        validate_batch(batch.ops())?;
        let mut entities = self.entities.write().await;

        // All checks run before the first write.
        for op in batch.ops() {
            let key = op.key();
            let current = entities.get(&key).map(Entity::version);
            if let WriteOp::Delete { .. } = op {
                if current.is_none() {
                    return Err(StorageError::NotFound(key));
                }
            }
            check_version(key, op.expected_version(), current)?;
        }

        let mut stored = Vec::new();
        for op in batch.ops() {
            match op {
                WriteOp::Put { entity, expected_version } => {
                    let entity = stamped(entity, *expected_version);
                    entities.insert(entity.key(), entity.clone());
                    stored.push(entity);
                }
                WriteOp::Delete { key, .. } => {
                    entities.remove(key);
                }
                WriteOp::Guard { .. } => {}
            }
        }
        debug!("In-memory commit applied {} ops, {} records written", batch.len(), stored.len());
        Ok(stored)
    }

    fn get_type(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use models::{LabTest, Visit, VisitStatus, VisitType};
    use rust_decimal_macros::dec;

    fn visit() -> Visit {
        let now = Utc::now();
        Visit {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            visit_datetime: now,
            visit_type: VisitType::General,
            status: VisitStatus::Registered,
            chief_complaint: None,
            registration_staff_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_assigns_incrementing_versions() {
        let store = InMemoryStorage::new();
        let v = visit();
        assert_eq!(store.save(Entity::Visit(v.clone()), 0).await.unwrap(), 1);
        assert_eq!(store.save(Entity::Visit(v.clone()), 1).await.unwrap(), 2);
        assert!(matches!(
            store.save(Entity::Visit(v.clone()), 0).await,
            Err(StorageError::VersionConflict { expected: 0, actual: 2, .. })
        ));
        assert_eq!(store.get(EntityType::Visit, v.id).await.unwrap().version(), 2);
    }

    #[tokio::test]
    async fn failed_guard_discards_the_whole_batch() {
        let store = InMemoryStorage::new();
        let v = visit();
        store.save(Entity::Visit(v.clone()), 0).await.unwrap();

        let test = LabTest::new("CBC", "Complete blood count", dec!(100000));
        let mut batch = WriteBatch::new();
        batch.put(test.clone(), 0).guard(EntityKey::new(EntityType::Visit, v.id), 7);
        assert!(store.commit(batch).await.is_err());
        assert!(matches!(store.get(EntityType::LabTest, test.id).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_filters_by_type_and_fields() {
        let store = InMemoryStorage::new();
        let a = visit();
        let mut b = visit();
        b.status = VisitStatus::Examining;
        store.save(Entity::Visit(a.clone()), 0).await.unwrap();
        store.save(Entity::Visit(b.clone()), 0).await.unwrap();
        store
            .save(Entity::LabTest(LabTest::new("CBC", "Complete blood count", dec!(1))), 0)
            .await
            .unwrap();

        let all = store.list(EntityType::Visit, &ListFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        let examining = store
            .list(EntityType::Visit, &ListFilter::default().with_status("examining"))
            .await
            .unwrap();
        assert_eq!(examining.len(), 1);
        assert_eq!(examining[0].id(), b.id);
        let by_patient = store.list(EntityType::Visit, &ListFilter::by_patient(a.patient_id)).await.unwrap();
        assert_eq!(by_patient.len(), 1);
    }

    #[tokio::test]
    async fn delete_checks_version() {
        let store = InMemoryStorage::new();
        let v = visit();
        store.save(Entity::Visit(v.clone()), 0).await.unwrap();
        assert!(store.delete(EntityType::Visit, v.id, 2).await.is_err());
        store.delete(EntityType::Visit, v.id, 1).await.unwrap();
        assert!(store.is_empty().await);
        assert!(matches!(store.delete(EntityType::Visit, v.id, 1).await, Err(StorageError::NotFound(_))));
    }
}
