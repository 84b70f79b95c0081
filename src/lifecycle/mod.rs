// ============================================================================
// Counter Table Lifecycle
// ============================================================================
//
// One counter table per managed field instance, created on attach, dropped
// on detach and physically renamed (never recreated) when the bundle's
// machine name changes, so the generator position survives.
//
// Callers must not run these concurrently with allocations on the same table.
//
// ============================================================================

use crate::core::{FieldDescriptor, InstanceDescriptor, ManagedField, Result, SerialError};
use crate::naming::TableNamer;
use crate::registry::FieldRegistry;
use crate::storage::{CounterTableSchema, StorageEngine};
use std::sync::Arc;
use tracing::{Level, event};

pub struct CounterTableLifecycle {
    storage: Arc<dyn StorageEngine>,
    namer: TableNamer,
    registry: FieldRegistry,
}

impl CounterTableLifecycle {
    pub fn new(storage: Arc<dyn StorageEngine>, namer: TableNamer, registry: FieldRegistry) -> Self {
        Self {
            storage,
            namer,
            registry,
        }
    }

    /// Create the counter table for `instance` unless it already exists.
    /// Returns whether a table was created.
    pub async fn ensure_created(
        &self,
        field: &FieldDescriptor,
        instance: &InstanceDescriptor,
    ) -> Result<bool> {
        if field.field_name != instance.field_name {
            return Err(SerialError::Host(format!(
                "Instance of '{}' passed with field '{}'",
                instance.field_name, field.field_name
            )));
        }
        self.ensure_table(&instance.managed_field()).await
    }

    /// Create the counter table for `field` unless it already exists.
    pub async fn ensure_table(&self, field: &ManagedField) -> Result<bool> {
        let name = self.namer.resolve(field)?;

        if let Some(existing) = self.storage.describe_table(&name).await? {
            return self.adopt(&existing, field).map(|_| false);
        }

        let schema = CounterTableSchema::new(name.clone()).owned_by(field.clone());
        match self.storage.create_table(schema).await {
            Ok(()) => {
                event!(Level::INFO, table = %name, field = %field, "counter table created");
                Ok(true)
            }
            // Lost a creation race; the winner's table is just as good.
            Err(SerialError::TableExists(_)) => match self.storage.describe_table(&name).await? {
                Some(existing) => self.adopt(&existing, field).map(|_| false),
                None => Err(SerialError::TableNotFound(name)),
            },
            Err(err) => Err(err),
        }
    }

    fn adopt(&self, existing: &CounterTableSchema, field: &ManagedField) -> Result<()> {
        match existing.owner() {
            Some(owner) if owner != field => Err(SerialError::Naming(format!(
                "Table '{}' for {} is already owned by {}",
                existing.name(),
                field,
                owner
            ))),
            _ => Ok(()),
        }
    }

    /// Drop the counter table for `instance`. An absent table is an error.
    pub async fn drop(&self, field: &FieldDescriptor, instance: &InstanceDescriptor) -> Result<()> {
        let managed = instance.managed_field();
        let name = self.namer.resolve(&managed)?;
        self.storage.drop_table(&name).await?;
        event!(
            Level::INFO,
            table = %name,
            field = %managed,
            field_type = %field.field_type,
            "counter table dropped"
        );
        Ok(())
    }

    /// Move every managed field's table of `entity_type` from `old_bundle`'s
    /// name to `new_bundle`'s. Must run after the host registry already
    /// reports the fields under `new_bundle`.
    ///
    /// Stops at the first failure; renames already applied stay applied and
    /// their count is carried by the returned `RenameAborted`.
    pub async fn rename_for_bundle(
        &self,
        entity_type: &str,
        old_bundle: &str,
        new_bundle: &str,
    ) -> Result<usize> {
        if old_bundle == new_bundle {
            return Ok(0);
        }

        let fields = self.registry.fields_for_bundle(entity_type, new_bundle).await?;
        let mut renamed = 0;

        for field in fields {
            if let Err(source) = self.rename_one(&field, old_bundle).await {
                event!(
                    Level::ERROR,
                    field = %field,
                    old_bundle,
                    renamed,
                    error = %source,
                    "bundle rename aborted"
                );
                return Err(SerialError::RenameAborted {
                    entity_type: entity_type.to_string(),
                    bundle: old_bundle.to_string(),
                    renamed,
                    source: Box::new(source),
                });
            }
            renamed += 1;
        }

        Ok(renamed)
    }

    async fn rename_one(&self, field: &ManagedField, old_bundle: &str) -> Result<()> {
        let from = self.namer.resolve(&field.with_bundle(old_bundle))?;
        let to = self.namer.resolve(field)?;
        self.storage
            .rename_table(&from, CounterTableSchema::new(to.clone()).owned_by(field.clone()))
            .await?;
        event!(Level::INFO, from = %from, to = %to, field = %field, "counter table renamed");
        Ok(())
    }

    pub fn namer(&self) -> &TableNamer {
        &self.namer
    }
}
