// ============================================================================
// Field Registry
// ============================================================================
//
// Read-through view over the host's field configuration store. Nothing is
// cached: every call re-queries, so create/rename/delete events are always
// reflected.
//
// ============================================================================

use crate::core::{ManagedField, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One field instance row from the host configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInstanceRecord {
    pub entity_type: String,
    pub bundle: String,
    pub field_name: String,
    pub field_type: String,
    pub deleted: bool,
}

impl FieldInstanceRecord {
    pub fn managed_field(&self) -> ManagedField {
        ManagedField::new(&self.entity_type, &self.bundle, &self.field_name)
    }
}

/// Filter passed to `FieldConfigStore::query_fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldQuery {
    pub field_type: String,
    pub entity_type: Option<String>,
    pub bundle: Option<String>,
    pub exclude_deleted: bool,
}

impl FieldQuery {
    pub fn of_type(field_type: &str) -> Self {
        Self {
            field_type: field_type.to_string(),
            entity_type: None,
            bundle: None,
            exclude_deleted: false,
        }
    }

    pub fn entity_type(mut self, entity_type: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self
    }

    pub fn bundle(mut self, bundle: &str) -> Self {
        self.bundle = Some(bundle.to_string());
        self
    }

    pub fn exclude_deleted(mut self) -> Self {
        self.exclude_deleted = true;
        self
    }

    pub fn matches(&self, record: &FieldInstanceRecord) -> bool {
        record.field_type == self.field_type
            && self
                .entity_type
                .as_ref()
                .is_none_or(|t| *t == record.entity_type)
            && self.bundle.as_ref().is_none_or(|b| *b == record.bundle)
            && !(self.exclude_deleted && record.deleted)
    }
}

/// Host field/instance configuration store.
#[async_trait]
pub trait FieldConfigStore: Send + Sync {
    async fn query_fields(&self, query: &FieldQuery) -> Result<Vec<FieldInstanceRecord>>;
}

/// Enumerates the fields managed by this crate.
#[derive(Clone)]
pub struct FieldRegistry {
    store: Arc<dyn FieldConfigStore>,
    field_type: String,
}

impl FieldRegistry {
    pub fn new(store: Arc<dyn FieldConfigStore>, field_type: &str) -> Self {
        Self {
            store,
            field_type: field_type.to_string(),
        }
    }

    pub fn field_type(&self) -> &str {
        &self.field_type
    }

    /// Every live (entity type, bundle, field) using the managed field type.
    pub async fn list_managed_fields(&self) -> Result<Vec<ManagedField>> {
        let query = FieldQuery::of_type(&self.field_type).exclude_deleted();
        self.collect(&query).await
    }

    /// Managed fields attached to one bundle.
    pub async fn fields_for_bundle(&self, entity_type: &str, bundle: &str) -> Result<Vec<ManagedField>> {
        let query = FieldQuery::of_type(&self.field_type)
            .entity_type(entity_type)
            .bundle(bundle)
            .exclude_deleted();
        self.collect(&query).await
    }

    async fn collect(&self, query: &FieldQuery) -> Result<Vec<ManagedField>> {
        let records = self.store.query_fields(query).await?;
        Ok(records.iter().map(FieldInstanceRecord::managed_field).collect())
    }
}

/// In-memory field configuration store.
#[derive(Default)]
pub struct InMemoryFieldConfig {
    records: RwLock<Vec<FieldInstanceRecord>>,
}

impl InMemoryFieldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a field to a bundle. Re-attaching revives a deleted instance.
    pub async fn attach(&self, entity_type: &str, bundle: &str, field_name: &str, field_type: &str) {
        let mut records = self.records.write().await;
        if let Some(existing) = records.iter_mut().find(|r| {
            r.entity_type == entity_type && r.bundle == bundle && r.field_name == field_name
        }) {
            existing.field_type = field_type.to_string();
            existing.deleted = false;
            return;
        }
        records.push(FieldInstanceRecord {
            entity_type: entity_type.to_string(),
            bundle: bundle.to_string(),
            field_name: field_name.to_string(),
            field_type: field_type.to_string(),
            deleted: false,
        });
    }

    /// Soft-delete an instance. Returns whether one was found.
    pub async fn mark_deleted(&self, entity_type: &str, bundle: &str, field_name: &str) -> bool {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| {
            r.entity_type == entity_type && r.bundle == bundle && r.field_name == field_name
        }) {
            Some(record) => {
                record.deleted = true;
                true
            }
            None => false,
        }
    }

    /// Rename a bundle in every instance of `entity_type`.
    pub async fn rename_bundle(&self, entity_type: &str, old: &str, new: &str) -> usize {
        let mut records = self.records.write().await;
        let mut renamed = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.entity_type == entity_type && r.bundle == old)
        {
            record.bundle = new.to_string();
            renamed += 1;
        }
        renamed
    }
}

#[async_trait]
impl FieldConfigStore for InMemoryFieldConfig {
    async fn query_fields(&self, query: &FieldQuery) -> Result<Vec<FieldInstanceRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| query.matches(r)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn populated() -> Arc<InMemoryFieldConfig> {
        let config = Arc::new(InMemoryFieldConfig::new());
        config.attach("node", "article", "field_ticket", "serial").await;
        config.attach("node", "article", "field_body", "text").await;
        config.attach("node", "page", "field_ticket", "serial").await;
        config.attach("user", "user", "field_member_no", "serial").await;
        config
    }

    #[tokio::test]
    async fn test_list_managed_fields_filters_type() {
        let config = populated().await;
        let registry = FieldRegistry::new(config, "serial");

        let fields = registry.list_managed_fields().await.unwrap();
        assert_eq!(fields.len(), 3);
        assert!(fields.iter().all(|f| f.field_name != "field_body"));
    }

    #[tokio::test]
    async fn test_deleted_instances_excluded() {
        let config = populated().await;
        assert!(config.mark_deleted("node", "page", "field_ticket").await);
        assert!(!config.mark_deleted("node", "missing", "field_ticket").await);

        let registry = FieldRegistry::new(config.clone(), "serial");
        let fields = registry.list_managed_fields().await.unwrap();
        assert_eq!(fields.len(), 2);

        // Read-through: reviving shows up immediately.
        config.attach("node", "page", "field_ticket", "serial").await;
        assert_eq!(registry.list_managed_fields().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_fields_for_bundle() {
        let config = populated().await;
        let registry = FieldRegistry::new(config.clone(), "serial");

        let fields = registry.fields_for_bundle("node", "article").await.unwrap();
        assert_eq!(fields, vec![ManagedField::new("node", "article", "field_ticket")]);

        assert_eq!(config.rename_bundle("node", "article", "story").await, 2);
        assert!(registry.fields_for_bundle("node", "article").await.unwrap().is_empty());
        assert_eq!(registry.fields_for_bundle("node", "story").await.unwrap().len(), 1);
    }

    #[test]
    fn test_query_matching() {
        let record = FieldInstanceRecord {
            entity_type: "node".into(),
            bundle: "article".into(),
            field_name: "f".into(),
            field_type: "serial".into(),
            deleted: true,
        };
        assert!(FieldQuery::of_type("serial").matches(&record));
        assert!(!FieldQuery::of_type("serial").exclude_deleted().matches(&record));
        assert!(!FieldQuery::of_type("serial").bundle("page").matches(&record));
        assert!(FieldQuery::of_type("serial").entity_type("node").matches(&record));
    }
}
