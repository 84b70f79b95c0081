use serde::{Deserialize, Serialize};
use std::fmt;

/// A generated serial value.
pub type Serial = u64;

/// The (entity type, bundle, field name) triple that owns one counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagedField {
    pub entity_type: String,
    pub bundle: String,
    pub field_name: String,
}

impl ManagedField {
    pub fn new(
        entity_type: impl Into<String>,
        bundle: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            bundle: bundle.into(),
            field_name: field_name.into(),
        }
    }

    /// Same field and entity type, attached to another bundle.
    pub fn with_bundle(&self, bundle: impl Into<String>) -> Self {
        Self {
            entity_type: self.entity_type.clone(),
            bundle: bundle.into(),
            field_name: self.field_name.clone(),
        }
    }
}

impl fmt::Display for ManagedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.entity_type, self.bundle, self.field_name)
    }
}

/// Field-level configuration as reported by the host framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub field_name: String,
    pub field_type: String,
}

impl FieldDescriptor {
    pub fn new(field_name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            field_type: field_type.into(),
        }
    }
}

/// Attachment of a field to one bundle of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub entity_type: String,
    pub bundle: String,
    pub field_name: String,
}

impl InstanceDescriptor {
    pub fn new(
        entity_type: impl Into<String>,
        bundle: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            bundle: bundle.into(),
            field_name: field_name.into(),
        }
    }

    pub fn managed_field(&self) -> ManagedField {
        ManagedField::new(&self.entity_type, &self.bundle, &self.field_name)
    }
}
