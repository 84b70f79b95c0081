use crate::allocator::{AllocatorStats, ValueAllocator};
use crate::backfill::BackfillCoordinator;
use crate::config::SerialConfig;
use crate::core::{FieldDescriptor, InstanceDescriptor, ManagedField, Result, Serial, SerialError};
use crate::entity::{Entity, EntityFramework, InMemoryEntityStore};
use crate::lifecycle::CounterTableLifecycle;
use crate::naming::TableNamer;
use crate::registry::{FieldConfigStore, FieldRegistry, InMemoryFieldConfig};
use crate::storage::{InMemoryStorage, StorageEngine};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{Level, event};

/// Serial field hooks for a host framework.
///
/// The host calls these from its own field and entity lifecycle events.
pub struct SerialFields {
    config: SerialConfig,
    storage: Arc<dyn StorageEngine>,
    registry: FieldRegistry,
    lifecycle: CounterTableLifecycle,
    allocator: Arc<ValueAllocator>,
    backfill: BackfillCoordinator,
}

impl SerialFields {
    pub fn new(
        config: SerialConfig,
        storage: Arc<dyn StorageEngine>,
        fields: Arc<dyn FieldConfigStore>,
        entities: Arc<dyn EntityFramework>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = FieldRegistry::new(fields, &config.field_type);
        let lifecycle =
            CounterTableLifecycle::new(storage.clone(), TableNamer::new(&config), registry.clone());
        let allocator = Arc::new(ValueAllocator::new(storage.clone(), &config));
        let backfill = BackfillCoordinator::new(entities, allocator.clone());

        Ok(Self {
            config,
            storage,
            registry,
            lifecycle,
            allocator,
            backfill,
        })
    }

    fn manages(&self, field: &FieldDescriptor) -> bool {
        field.field_type == self.config.field_type
    }

    /// A field was attached to a bundle: create its counter table and give
    /// existing entities a value. Returns the number of entities backfilled.
    pub async fn field_instance_created(
        &self,
        field: &FieldDescriptor,
        instance: &InstanceDescriptor,
    ) -> Result<usize> {
        if !self.manages(field) {
            return Ok(0);
        }
        self.lifecycle.ensure_created(field, instance).await?;
        self.backfill
            .initialize_existing(&instance.managed_field())
            .await
    }

    /// A field was detached from a bundle. Returns whether a table was
    /// dropped; an already absent table is not an error here.
    pub async fn field_instance_deleted(
        &self,
        field: &FieldDescriptor,
        instance: &InstanceDescriptor,
    ) -> Result<bool> {
        if !self.manages(field) {
            return Ok(false);
        }
        match self.lifecycle.drop(field, instance).await {
            Ok(()) => Ok(true),
            Err(SerialError::TableNotFound(table)) => {
                event!(
                    Level::WARN,
                    table = %table,
                    field = %instance.managed_field(),
                    "counter table already absent"
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// A bundle's machine name changed from `old` to `new`.
    pub async fn bundle_renamed(&self, entity_type: &str, old: &str, new: &str) -> Result<usize> {
        self.lifecycle.rename_for_bundle(entity_type, old, new).await
    }

    /// Fill every empty managed field of `entity` before the host saves it.
    /// Values already present are kept. Returns how many were assigned.
    pub async fn entity_presave(&self, entity: &mut Entity) -> Result<usize> {
        let fields = self
            .registry
            .fields_for_bundle(&entity.entity_type, &entity.bundle)
            .await?;

        let mut assigned = 0;
        for field in fields {
            if entity.has_value(&field.field_name) {
                continue;
            }
            let value = self.allocator.allocate(&field, true).await?;
            entity.set_serial(&field.field_name, value);
            assigned += 1;
        }
        Ok(assigned)
    }

    pub async fn generate(&self, entity_type: &str, bundle: &str, field_name: &str) -> Result<Serial> {
        self.allocator
            .allocate(&ManagedField::new(entity_type, bundle, field_name), true)
            .await
    }

    /// Create any counter table missing for a managed field. Returns how many
    /// were created.
    pub async fn ensure_all_tables(&self) -> Result<usize> {
        let mut created = 0;
        for field in self.registry.list_managed_fields().await? {
            if self.lifecycle.ensure_table(&field).await? {
                created += 1;
            }
        }
        if created > 0 {
            event!(Level::INFO, created, "missing counter tables created");
        }
        Ok(created)
    }

    /// Compact every managed field's table down to its latest row. Fields
    /// without a table are skipped. Returns the number of rows removed.
    pub async fn housekeep(&self) -> Result<usize> {
        let fields = self.registry.list_managed_fields().await?;
        let removed = try_join_all(fields.iter().map(|field| async move {
            match self.allocator.compact(field).await {
                Err(SerialError::TableNotFound(table)) => {
                    event!(Level::WARN, table = %table, field = %field, "no counter table to compact");
                    Ok(0)
                }
                other => other,
            }
        }))
        .await?;

        let total: usize = removed.iter().sum();
        event!(Level::DEBUG, fields = fields.len(), removed = total, "housekeeping finished");
        Ok(total)
    }

    /// Persist the store, if it keeps durable state.
    pub async fn checkpoint(&self) -> Result<bool> {
        self.storage.checkpoint().await
    }

    pub fn stats(&self) -> AllocatorStats {
        self.allocator.stats()
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &CounterTableLifecycle {
        &self.lifecycle
    }

    pub fn allocator(&self) -> &Arc<ValueAllocator> {
        &self.allocator
    }
}

/// The in-memory collaborators, kept so callers can act as the host.
#[derive(Clone)]
pub struct InMemoryBackend {
    pub storage: Arc<InMemoryStorage>,
    pub fields: Arc<InMemoryFieldConfig>,
    pub entities: Arc<InMemoryEntityStore>,
}

impl InMemoryBackend {
    /// Fresh backend; storage is restored from `config.snapshot_path` when set.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let storage = match &config.snapshot_path {
            Some(path) => InMemoryStorage::open(path)?,
            None => InMemoryStorage::new(),
        };
        Ok(Self {
            storage: Arc::new(storage),
            fields: Arc::new(InMemoryFieldConfig::new()),
            entities: Arc::new(InMemoryEntityStore::new()),
        })
    }

    pub fn serial_fields(&self, config: SerialConfig) -> Result<SerialFields> {
        SerialFields::new(
            config,
            self.storage.clone(),
            self.fields.clone(),
            self.entities.clone(),
        )
    }
}
