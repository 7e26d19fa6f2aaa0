// models/src/entity.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identifiers::EntityKey;
use crate::medical::{Invoice, LabOrder, LabTest, MedicalRecord, Medicine, Prescription, Referral, Visit};

/// Kinds of records the data-access collaborator stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Visit,
    MedicalRecord,
    LabOrder,
    Prescription,
    Referral,
    Invoice,
    LabTest,
    Medicine,
}

labelled_enum!(EntityType, "entity type" {
    Visit => "visit",
    MedicalRecord => "medical_record",
    LabOrder => "lab_order",
    Prescription => "prescription",
    Referral => "referral",
    Invoice => "invoice",
    LabTest => "lab_test",
    Medicine => "medicine",
});

/// Envelope over every stored record, so a single store interface can carry
/// all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "data", rename_all = "snake_case")]
pub enum Entity {
    Visit(Visit),
    MedicalRecord(MedicalRecord),
    LabOrder(LabOrder),
    Prescription(Prescription),
    Referral(Referral),
    Invoice(Invoice),
    LabTest(LabTest),
    Medicine(Medicine),
}

impl Entity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Visit(_) => EntityType::Visit,
            Entity::MedicalRecord(_) => EntityType::MedicalRecord,
            Entity::LabOrder(_) => EntityType::LabOrder,
            Entity::Prescription(_) => EntityType::Prescription,
            Entity::Referral(_) => EntityType::Referral,
            Entity::Invoice(_) => EntityType::Invoice,
            Entity::LabTest(_) => EntityType::LabTest,
            Entity::Medicine(_) => EntityType::Medicine,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Entity::Visit(e) => e.id,
            Entity::MedicalRecord(e) => e.id,
            Entity::LabOrder(e) => e.id,
            Entity::Prescription(e) => e.id,
            Entity::Referral(e) => e.id,
            Entity::Invoice(e) => e.id,
            Entity::LabTest(e) => e.id,
            Entity::Medicine(e) => e.id,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type(), self.id())
    }

    pub fn version(&self) -> u64 {
        match self {
            Entity::Visit(e) => e.version,
            Entity::MedicalRecord(e) => e.version,
            Entity::LabOrder(e) => e.version,
            Entity::Prescription(e) => e.version,
            Entity::Referral(e) => e.version,
            Entity::Invoice(e) => e.version,
            Entity::LabTest(e) => e.version,
            Entity::Medicine(e) => e.version,
        }
    }

    /// Stamps the version assigned by the store on a successful write.
    pub fn set_version(&mut self, version: u64) {
        match self {
            Entity::Visit(e) => e.version = version,
            Entity::MedicalRecord(e) => e.version = version,
            Entity::LabOrder(e) => e.version = version,
            Entity::Prescription(e) => e.version = version,
            Entity::Referral(e) => e.version = version,
            Entity::Invoice(e) => e.version = version,
            Entity::LabTest(e) => e.version = version,
            Entity::Medicine(e) => e.version = version,
        }
    }

    /// Parent visit of a child record.
    pub fn visit_id(&self) -> Option<Uuid> {
        match self {
            Entity::MedicalRecord(e) => Some(e.visit_id),
            Entity::LabOrder(e) => Some(e.visit_id),
            Entity::Prescription(e) => Some(e.visit_id),
            Entity::Referral(e) => Some(e.visit_id),
            Entity::Invoice(e) => Some(e.visit_id),
            Entity::Visit(_) | Entity::LabTest(_) | Entity::Medicine(_) => None,
        }
    }

    pub fn patient_id(&self) -> Option<Uuid> {
        match self {
            Entity::Visit(e) => Some(e.patient_id),
            Entity::Referral(e) => Some(e.patient_id),
            _ => None,
        }
    }

    pub fn doctor_id(&self) -> Option<Uuid> {
        match self {
            Entity::Visit(e) => Some(e.doctor_id),
            Entity::LabOrder(e) => Some(e.doctor_id),
            Entity::Prescription(e) => Some(e.doctor_id),
            Entity::Referral(e) => Some(e.referring_doctor_id),
            _ => None,
        }
    }

    /// Lifecycle label of records that have one.
    pub fn status_label(&self) -> Option<&'static str> {
        match self {
            Entity::Visit(e) => Some(e.status.as_str()),
            Entity::LabOrder(e) => Some(e.status.as_str()),
            Entity::Prescription(e) => Some(e.status.as_str()),
            Entity::Referral(e) => Some(e.status.as_str()),
            Entity::Invoice(e) => Some(e.payment_status.as_str()),
            Entity::MedicalRecord(_) | Entity::LabTest(_) | Entity::Medicine(_) => None,
        }
    }
}

/// Typed access to one variant of [`Entity`].
pub trait StoredEntity: Sized + Clone {
    const ENTITY_TYPE: EntityType;

    fn id(&self) -> Uuid;
    fn version(&self) -> u64;
    fn into_entity(self) -> Entity;
    fn from_entity(entity: Entity) -> Option<Self>;

    fn key(&self) -> EntityKey {
        EntityKey::new(Self::ENTITY_TYPE, self.id())
    }
}

macro_rules! stored_entity {
    ($ty:ident) => {
        impl StoredEntity for $ty {
            const ENTITY_TYPE: EntityType = EntityType::$ty;

            fn id(&self) -> Uuid {
                self.id
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn into_entity(self) -> Entity {
                Entity::$ty(self)
            }

            fn from_entity(entity: Entity) -> Option<Self> {
                match entity {
                    Entity::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Entity {
            fn from(value: $ty) -> Self {
                Entity::$ty(value)
            }
        }
    };
}

stored_entity!(Visit);
stored_entity!(MedicalRecord);
stored_entity!(LabOrder);
stored_entity!(Prescription);
stored_entity!(Referral);
stored_entity!(Invoice);
stored_entity!(LabTest);
stored_entity!(Medicine);
