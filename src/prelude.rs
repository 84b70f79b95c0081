//! Recommended imports grouped by how much of the crate a caller touches.
//!
//! `hooks` is enough for a host that only forwards lifecycle events.
//! `advanced` adds the components and collaborator traits for custom backends.

pub mod hooks {
    //! Host-facing surface.
    pub use crate::{
        Entity, FieldDescriptor, InstanceDescriptor, Result, Serial, SerialConfig, SerialError,
        SerialFields, in_memory,
    };
}

pub mod advanced {
    //! Components and the traits a custom backend implements.
    pub use crate::entity::EntityFramework;
    pub use crate::registry::{FieldConfigStore, FieldInstanceRecord, FieldQuery};
    pub use crate::storage::{
        CounterTableSchema, RowCondition, RowOperations, SchemaService, StorageEngine,
        TransactionService,
    };
    pub use crate::transaction::TransactionId;
    pub use crate::{
        BackfillCoordinator, CounterTableLifecycle, FieldRegistry, ManagedField, TableNamer,
        ValueAllocator,
    };
}
