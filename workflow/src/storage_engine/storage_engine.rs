// workflow/src/storage_engine/storage_engine.rs

use async_trait::async_trait;
use uuid::Uuid;

use models::{Entity, EntityKey, EntityType, StoredEntity};

use crate::errors::{StorageError, StorageResult};

/// Subset of record fields `list` can filter on. Unset fields match
/// everything; a field the entity type does not carry never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub visit_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<String>,
}

impl ListFilter {
    pub fn by_visit(visit_id: Uuid) -> Self {
        ListFilter { visit_id: Some(visit_id), ..Default::default() }
    }

    pub fn by_patient(patient_id: Uuid) -> Self {
        ListFilter { patient_id: Some(patient_id), ..Default::default() }
    }

    pub fn by_doctor(doctor_id: Uuid) -> Self {
        ListFilter { doctor_id: Some(doctor_id), ..Default::default() }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        fn field_matches<T: PartialEq>(wanted: &Option<T>, actual: Option<T>) -> bool {
            match wanted {
                None => true,
                Some(w) => actual.as_ref() == Some(w),
            }
        }

        field_matches(&self.visit_id, entity.visit_id())
            && field_matches(&self.patient_id, entity.patient_id())
            && field_matches(&self.doctor_id, entity.doctor_id())
            && match &self.status {
                None => true,
                Some(status) => entity.status_label() == Some(status.as_str()),
            }
    }
}

/// One write of an atomic batch. `expected_version` is the version the
/// caller last saw; `0` means the record must not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { entity: Entity, expected_version: u64 },
    /// Fails the batch unless the record is still at `expected_version`.
    Guard { key: EntityKey, expected_version: u64 },
    Delete { key: EntityKey, expected_version: u64 },
}

impl WriteOp {
    pub fn key(&self) -> EntityKey {
        match self {
            WriteOp::Put { entity, .. } => entity.key(),
            WriteOp::Guard { key, .. } | WriteOp::Delete { key, .. } => *key,
        }
    }

    pub fn expected_version(&self) -> u64 {
        match self {
            WriteOp::Put { expected_version, .. }
            | WriteOp::Guard { expected_version, .. }
            | WriteOp::Delete { expected_version, .. } => *expected_version,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, entity: impl Into<Entity>, expected_version: u64) -> &mut Self {
        self.ops.push(WriteOp::Put { entity: entity.into(), expected_version });
        self
    }

    pub fn guard(&mut self, key: EntityKey, expected_version: u64) -> &mut Self {
        self.ops.push(WriteOp::Guard { key, expected_version });
        self
    }

    pub fn delete(&mut self, key: EntityKey, expected_version: u64) -> &mut Self {
        self.ops.push(WriteOp::Delete { key, expected_version });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The data-access collaborator the workflow runs on.
///
/// Every successful write stores `expected_version + 1`. A batch is applied
/// completely or not at all.
#[async_trait]
pub trait DataAccess: Send + Sync {
    async fn get(&self, entity_type: EntityType, id: Uuid) -> StorageResult<Entity>;

    async fn list(&self, entity_type: EntityType, filter: &ListFilter) -> StorageResult<Vec<Entity>>;

    /// Applies `batch` atomically and returns the written records with their
    /// new versions, in batch order.
    async fn commit(&self, batch: WriteBatch) -> StorageResult<Vec<Entity>>;

    async fn save(&self, entity: Entity, expected_version: u64) -> StorageResult<u64> {
        let mut batch = WriteBatch::new();
        batch.put(entity, expected_version);
        let stored = self.commit(batch).await?;
        stored
            .first()
            .map(Entity::version)
            .ok_or_else(|| StorageError::Backend("commit returned no record for a put".to_string()))
    }

    async fn delete(&self, entity_type: EntityType, id: Uuid, expected_version: u64) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(EntityKey::new(entity_type, id), expected_version);
        self.commit(batch).await.map(|_| ())
    }

    fn get_type(&self) -> &'static str;
}

/// Typed `get`.
pub async fn fetch<T: StoredEntity>(store: &dyn DataAccess, id: Uuid) -> StorageResult<T> {
    let entity = store.get(T::ENTITY_TYPE, id).await?;
    T::from_entity(entity).ok_or_else(|| {
        StorageError::Serialization(format!("record {} is not a {}", EntityKey::new(T::ENTITY_TYPE, id), T::ENTITY_TYPE))
    })
}

/// Typed `list`.
pub async fn fetch_all<T: StoredEntity>(store: &dyn DataAccess, filter: &ListFilter) -> StorageResult<Vec<T>> {
    let entities = store.list(T::ENTITY_TYPE, filter).await?;
    Ok(entities.into_iter().filter_map(T::from_entity).collect())
}
