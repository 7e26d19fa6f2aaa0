// workflow/src/storage_engine/storage_utils.rs

use std::collections::HashSet;

use models::{Entity, EntityKey};

use super::storage_engine::WriteOp;
use crate::errors::{StorageError, StorageResult};

/// Records are stored as JSON so tagged enums and optional fields survive.
pub fn serialize_entity(entity: &Entity) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(entity).map_err(StorageError::from)
}

pub fn deserialize_entity(bytes: &[u8]) -> StorageResult<Entity> {
    serde_json::from_slice(bytes).map_err(StorageError::from)
}

/// `current` is `None` when the record does not exist, which counts as
/// version 0.
pub fn check_version(key: EntityKey, expected: u64, current: Option<u64>) -> StorageResult<()> {
    let actual = current.unwrap_or(0);
    if actual != expected {
        return Err(StorageError::VersionConflict { key, expected, actual });
    }
    Ok(())
}

/// A batch may touch each record once.
pub fn validate_batch(ops: &[WriteOp]) -> StorageResult<()> {
    let mut seen = HashSet::with_capacity(ops.len());
    for op in ops {
        let key = op.key();
        if !seen.insert(key) {
            return Err(StorageError::Backend(format!("{} appears more than once in a batch", key)));
        }
        if let WriteOp::Delete { expected_version: 0, .. } = op {
            return Err(StorageError::Backend(format!("delete of {} needs the version being deleted", key)));
        }
    }
    Ok(())
}

/// Copy of `entity` stamped with the version a write assigns.
pub fn stamped(entity: &Entity, expected_version: u64) -> Entity {
    let mut stored = entity.clone();
    stored.set_version(expected_version + 1);
    stored
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{EntityType, LabTest};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn json_encoding_keeps_the_envelope() {
        let entity = Entity::LabTest(LabTest::new("CBC", "Complete blood count", dec!(100000)));
        let bytes = serialize_entity(&entity).unwrap();
        assert_eq!(deserialize_entity(&bytes).unwrap(), entity);
        assert!(deserialize_entity(b"not json").is_err());
    }

    #[test]
    fn missing_record_is_version_zero() {
        let key = EntityKey::new(EntityType::Visit, Uuid::new_v4());
        assert!(check_version(key, 0, None).is_ok());
        assert!(matches!(
            check_version(key, 3, Some(4)),
            Err(StorageError::VersionConflict { expected: 3, actual: 4, .. })
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let key = EntityKey::new(EntityType::Visit, Uuid::new_v4());
        let ops = [
            WriteOp::Guard { key, expected_version: 1 },
            WriteOp::Delete { key, expected_version: 1 },
        ];
        assert!(validate_batch(&ops).is_err());
    }
}
