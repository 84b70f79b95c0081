use crate::allocator::ValueAllocator;
use crate::core::{ManagedField, Result, SerialError};
use crate::entity::{EntityFramework, EntityId};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Assigns initial serial values to entities that predate a field.
///
/// Each entity gets its own allocation transaction and its own write, so an
/// aborted run leaves processed entities initialized. Rerunning picks up
/// where it stopped because initialized entities no longer match the
/// missing-value query.
pub struct BackfillCoordinator {
    entities: Arc<dyn EntityFramework>,
    allocator: Arc<ValueAllocator>,
}

impl BackfillCoordinator {
    pub fn new(entities: Arc<dyn EntityFramework>, allocator: Arc<ValueAllocator>) -> Self {
        Self {
            entities,
            allocator,
        }
    }

    /// Returns how many entities received a value.
    pub async fn initialize_existing(&self, field: &ManagedField) -> Result<usize> {
        let span = info_span!(
            "serial.backfill",
            entity_type = %field.entity_type,
            bundle = %field.bundle,
            field_name = %field.field_name
        );

        async {
            let bundle = if self.entities.supports_bundles(&field.entity_type).await? {
                Some(field.bundle.as_str())
            } else {
                None
            };

            let ids = self
                .entities
                .find_entities_missing_field(&field.entity_type, bundle, &field.field_name)
                .await?;
            if ids.is_empty() {
                return Ok(0);
            }

            let mut initialized = 0;
            for id in ids {
                match self.initialize_one(field, id).await {
                    Ok(true) => initialized += 1,
                    Ok(false) => {}
                    Err(source) => {
                        event!(
                            Level::ERROR,
                            entity_id = id,
                            initialized,
                            error = %source,
                            "backfill aborted"
                        );
                        return Err(SerialError::BackfillAborted {
                            field: field.clone(),
                            initialized,
                            source: Box::new(source),
                        });
                    }
                }
            }

            event!(Level::INFO, initialized, "backfill finished");
            Ok(initialized)
        }
        .instrument(span)
        .await
    }

    async fn initialize_one(&self, field: &ManagedField, id: EntityId) -> Result<bool> {
        let mut entity = self.entities.load_canonical(&field.entity_type, id).await?;
        // Filled in since the query ran.
        if entity.has_value(&field.field_name) {
            return Ok(false);
        }

        let value = self.allocator.allocate(field, false).await?;
        entity.set_serial(&field.field_name, value);
        self.entities
            .write_field_value(&entity, &field.field_name, value)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SerialConfig;
    use crate::entity::{Entity, InMemoryEntityStore};
    use crate::naming::TableNamer;
    use crate::storage::{CounterTableSchema, InMemoryStorage, SchemaService};
    use serde_json::json;

    async fn coordinator(
        field: &ManagedField,
    ) -> (Arc<InMemoryEntityStore>, Arc<InMemoryStorage>, BackfillCoordinator) {
        let config = SerialConfig::default();
        let storage = Arc::new(InMemoryStorage::new());
        let table = TableNamer::new(&config).resolve(field).unwrap();
        storage.create_table(CounterTableSchema::new(table)).await.unwrap();

        let entities = Arc::new(InMemoryEntityStore::new());
        let allocator = Arc::new(ValueAllocator::new(storage.clone(), &config));
        let backfill = BackfillCoordinator::new(entities.clone(), allocator);
        (entities, storage, backfill)
    }

    #[tokio::test]
    async fn test_backfill_skips_entities_with_values() {
        let field = ManagedField::new("article", "news", "ticket_no");
        let (entities, _, backfill) = coordinator(&field).await;

        entities.insert(Entity::new("article", "news")).await;
        entities
            .insert(Entity::new("article", "news").with_field("ticket_no", json!(99)))
            .await;
        entities.insert(Entity::new("article", "blog")).await;

        assert_eq!(backfill.initialize_existing(&field).await.unwrap(), 1);
        assert_eq!(backfill.initialize_existing(&field).await.unwrap(), 0);

        let untouched = entities.all_of_type("article").await;
        assert!(untouched.iter().any(|e| e.serial("ticket_no") == Some(99)));
        assert!(untouched
            .iter()
            .any(|e| e.bundle == "blog" && !e.has_value("ticket_no")));
    }

    #[tokio::test]
    async fn test_backfill_skips_cleanup() {
        let field = ManagedField::new("article", "news", "ticket_no");
        let (entities, storage, backfill) = coordinator(&field).await;
        for _ in 0..12 {
            entities.insert(Entity::new("article", "news")).await;
        }

        assert_eq!(backfill.initialize_existing(&field).await.unwrap(), 12);
        let table = TableNamer::default().resolve(&field).unwrap();
        assert_eq!(storage.committed_sids(&table).await.unwrap().len(), 12);
    }

    #[tokio::test]
    async fn test_missing_table_aborts_backfill() {
        let field = ManagedField::new("article", "news", "ticket_no");
        let (entities, storage, backfill) = coordinator(&field).await;
        entities.insert(Entity::new("article", "news")).await;
        storage
            .drop_table(&TableNamer::default().resolve(&field).unwrap())
            .await
            .unwrap();

        match backfill.initialize_existing(&field).await {
            Err(SerialError::BackfillAborted { initialized, source, .. }) => {
                assert_eq!(initialized, 0);
                assert!(matches!(*source, SerialError::CounterTableMissing { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
