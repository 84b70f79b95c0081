use crate::core::{Result, Serial, SerialError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

pub type EntityId = u64;

/// A host entity with its field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// `None` until the host has saved the entity
    pub id: Option<EntityId>,
    pub entity_type: String,
    pub bundle: String,
    pub fields: BTreeMap<String, JsonValue>,
}

impl Entity {
    pub fn new(entity_type: &str, bundle: &str) -> Self {
        Self {
            id: None,
            entity_type: entity_type.to_string(),
            bundle: bundle.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: JsonValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// A field counts as empty when absent or null.
    pub fn has_value(&self, field_name: &str) -> bool {
        self.fields
            .get(field_name)
            .is_some_and(|value| !value.is_null())
    }

    pub fn serial(&self, field_name: &str) -> Option<Serial> {
        self.fields.get(field_name).and_then(JsonValue::as_u64)
    }

    pub fn set_serial(&mut self, field_name: &str, value: Serial) {
        self.fields
            .insert(field_name.to_string(), JsonValue::from(value));
    }
}

/// Host entity framework operations the backfill needs.
#[async_trait]
pub trait EntityFramework: Send + Sync {
    /// Whether queries on this entity type can be restricted by bundle.
    async fn supports_bundles(&self, entity_type: &str) -> Result<bool>;

    /// IDs of entities with no value for `field_name`.
    async fn find_entities_missing_field(
        &self,
        entity_type: &str,
        bundle: Option<&str>,
        field_name: &str,
    ) -> Result<Vec<EntityId>>;

    /// The stored form of an entity, ignoring any unsaved edits.
    async fn load_canonical(&self, entity_type: &str, id: EntityId) -> Result<Entity>;

    /// Persist one field value through the field storage write path.
    async fn write_field_value(&self, entity: &Entity, field_name: &str, value: Serial) -> Result<()>;
}

/// In-memory entity store.
pub struct InMemoryEntityStore {
    bundle_support: RwLock<HashMap<String, bool>>,
    entities: RwLock<BTreeMap<(String, EntityId), Entity>>,
    next_id: AtomicU64,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self {
            bundle_support: RwLock::new(HashMap::new()),
            entities: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Unregistered entity types are assumed to support bundles.
    pub async fn register_entity_type(&self, entity_type: &str, supports_bundles: bool) {
        self.bundle_support
            .write()
            .await
            .insert(entity_type.to_string(), supports_bundles);
    }

    /// Save a new entity and return it with its assigned ID.
    pub async fn insert(&self, mut entity: Entity) -> Entity {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        entity.id = Some(id);
        self.entities
            .write()
            .await
            .insert((entity.entity_type.clone(), id), entity.clone());
        entity
    }

    pub async fn get(&self, entity_type: &str, id: EntityId) -> Option<Entity> {
        self.entities
            .read()
            .await
            .get(&(entity_type.to_string(), id))
            .cloned()
    }

    pub async fn all_of_type(&self, entity_type: &str) -> Vec<Entity> {
        self.entities
            .read()
            .await
            .values()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityFramework for InMemoryEntityStore {
    async fn supports_bundles(&self, entity_type: &str) -> Result<bool> {
        Ok(self
            .bundle_support
            .read()
            .await
            .get(entity_type)
            .copied()
            .unwrap_or(true))
    }

    async fn find_entities_missing_field(
        &self,
        entity_type: &str,
        bundle: Option<&str>,
        field_name: &str,
    ) -> Result<Vec<EntityId>> {
        let entities = self.entities.read().await;
        Ok(entities
            .iter()
            .filter(|((t, _), e)| {
                t == entity_type
                    && bundle.is_none_or(|b| e.bundle == b)
                    && !e.has_value(field_name)
            })
            .map(|((_, id), _)| *id)
            .collect())
    }

    async fn load_canonical(&self, entity_type: &str, id: EntityId) -> Result<Entity> {
        self.get(entity_type, id)
            .await
            .ok_or_else(|| SerialError::EntityNotFound {
                entity_type: entity_type.to_string(),
                id,
            })
    }

    async fn write_field_value(&self, entity: &Entity, field_name: &str, value: Serial) -> Result<()> {
        let id = entity
            .id
            .ok_or_else(|| SerialError::Host("Cannot write a field of an unsaved entity".into()))?;
        let mut entities = self.entities.write().await;
        let stored = entities
            .get_mut(&(entity.entity_type.clone(), id))
            .ok_or_else(|| SerialError::EntityNotFound {
                entity_type: entity.entity_type.clone(),
                id,
            })?;
        stored.set_serial(field_name, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_value() {
        let entity = Entity::new("node", "article")
            .with_field("title", json!("Hello"))
            .with_field("field_ticket", JsonValue::Null);
        assert!(entity.has_value("title"));
        assert!(!entity.has_value("field_ticket"));
        assert!(!entity.has_value("missing"));
        assert!(entity.id.is_none());
    }

    #[tokio::test]
    async fn test_missing_field_query_respects_bundle() {
        let store = InMemoryEntityStore::new();
        store.insert(Entity::new("node", "article")).await;
        store.insert(Entity::new("node", "page")).await;
        store
            .insert(Entity::new("node", "article").with_field("f", json!(7)))
            .await;

        let article = store
            .find_entities_missing_field("node", Some("article"), "f")
            .await
            .unwrap();
        assert_eq!(article.len(), 1);

        let any = store.find_entities_missing_field("node", None, "f").await.unwrap();
        assert_eq!(any.len(), 2);
    }

    #[tokio::test]
    async fn test_write_field_value_persists() {
        let store = InMemoryEntityStore::new();
        let saved = store.insert(Entity::new("node", "article")).await;
        let id = saved.id.unwrap();

        store.write_field_value(&saved, "f", 42).await.unwrap();
        let loaded = store.load_canonical("node", id).await.unwrap();
        assert_eq!(loaded.serial("f"), Some(42));

        assert!(store
            .write_field_value(&Entity::new("node", "article"), "f", 1)
            .await
            .is_err());
        assert!(matches!(
            store.load_canonical("node", 9999).await,
            Err(SerialError::EntityNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_bundle_support_default() {
        let store = InMemoryEntityStore::new();
        store.register_entity_type("comment", false).await;
        assert!(!store.supports_bundles("comment").await.unwrap());
        assert!(store.supports_bundles("node").await.unwrap());
    }
}
