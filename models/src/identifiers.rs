// models/src/identifiers.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityType;
use crate::errors::{ValidationError, ValidationResult};

/// Addresses one stored entity. The textual form is `<entity_type>/<uuid>`,
/// which is also the byte key used by key-value stores, so all entities of a
/// type share a scan prefix.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize, PartialOrd, Ord)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub id: Uuid,
}

impl EntityKey {
    pub fn new(entity_type: EntityType, id: Uuid) -> Self {
        Self { entity_type, id }
    }

    /// The prefix shared by every key of `entity_type`.
    pub fn prefix(entity_type: EntityType) -> String {
        format!("{}/", entity_type.as_str())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> ValidationResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ValidationError::InvalidEntityKey(String::from_utf8_lossy(bytes).into_owned()))?;
        text.parse()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

impl FromStr for EntityKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> ValidationResult<Self> {
        let (kind, id) = s
            .split_once('/')
            .ok_or_else(|| ValidationError::InvalidEntityKey(s.to_string()))?;
        let entity_type = kind
            .parse::<EntityType>()
            .map_err(|_| ValidationError::InvalidEntityKey(s.to_string()))?;
        let id = Uuid::parse_str(id).map_err(|_| ValidationError::InvalidEntityKey(s.to_string()))?;
        Ok(Self { entity_type, id })
    }
}

#[cfg(test)]
mod tests {
    use super::EntityKey;
    use crate::entity::EntityType;
    use crate::errors::ValidationError;
    use core::str::FromStr;
    use uuid::Uuid;

    #[test]
    fn should_not_parse_key_without_separator() {
        let key = EntityKey::from_str("visit");
        assert_eq!(key.unwrap_err(), ValidationError::InvalidEntityKey("visit".to_string()));
    }

    #[test]
    fn should_not_parse_unknown_entity_type() {
        let raw = format!("referral/{}", Uuid::new_v4());
        assert!(EntityKey::from_str(&raw).is_err());
    }

    #[test]
    fn should_parse_key_from_display_form() {
        let id = Uuid::new_v4();
        let key = EntityKey::new(EntityType::LabOrder, id);
        let parsed = EntityKey::from_str(&key.to_string()).unwrap();
        assert_eq!(parsed, key);
        assert!(key.to_string().starts_with(&EntityKey::prefix(EntityType::LabOrder)));
    }

    #[test]
    fn should_decode_key_bytes() {
        let key = EntityKey::new(EntityType::Invoice, Uuid::new_v4());
        assert_eq!(EntityKey::from_bytes(&key.to_bytes()).unwrap(), key);
    }
}
