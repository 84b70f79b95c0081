// ============================================================================
// serialfield Library
// ============================================================================
//
// Per-field serial values, each backed by its own counter table whose only
// job is to hand out the next generated key on insert.
//
// ============================================================================

pub mod allocator;
pub mod backfill;
pub mod config;
pub mod core;
pub mod entity;
pub mod facade;
pub mod lifecycle;
pub mod naming;
pub mod prelude;
pub mod registry;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use allocator::{AllocatorStats, ValueAllocator};
pub use backfill::BackfillCoordinator;
pub use config::{DegradedPolicy, SerialConfig};
pub use crate::core::{FieldDescriptor, InstanceDescriptor, ManagedField, Result, Serial, SerialError};
pub use entity::{Entity, EntityFramework, EntityId, InMemoryEntityStore};
pub use facade::{InMemoryBackend, SerialFields};
pub use lifecycle::CounterTableLifecycle;
pub use naming::{TableNamer, resolve};
pub use registry::{FieldConfigStore, FieldQuery, FieldRegistry, InMemoryFieldConfig};
pub use storage::{InMemoryStorage, StorageEngine, TableStats};

// ============================================================================
// Quick start
// ============================================================================

/// Wire the hooks to the in-memory backend in one call.
///
/// # Examples
///
/// ```
/// use serialfield::{Entity, FieldDescriptor, InstanceDescriptor, SerialConfig};
///
/// # tokio_test::block_on(async {
/// let (backend, hooks) = serialfield::in_memory(SerialConfig::default()).unwrap();
///
/// backend.fields.attach("article", "news", "ticket_no", "serial").await;
/// hooks
///     .field_instance_created(
///         &FieldDescriptor::new("ticket_no", "serial"),
///         &InstanceDescriptor::new("article", "news", "ticket_no"),
///     )
///     .await
///     .unwrap();
///
/// let mut article = Entity::new("article", "news");
/// hooks.entity_presave(&mut article).await.unwrap();
/// assert_eq!(article.serial("ticket_no"), Some(1));
/// # });
/// ```
pub fn in_memory(config: SerialConfig) -> Result<(InMemoryBackend, SerialFields)> {
    let backend = InMemoryBackend::open(&config)?;
    let hooks = backend.serial_fields(config)?;
    Ok((backend, hooks))
}
