pub mod catalog;
pub mod engine;
pub mod guard;
pub mod memory;
pub mod persistence;
pub mod table;

pub use catalog::Catalog;
pub use engine::{RowCondition, RowOperations, SchemaService, StorageEngine, TransactionService};
pub use guard::TransactionGuard;
pub use memory::{InMemoryStorage, TableStats};
pub use persistence::{SnapshotManager, StorageSnapshot};
pub use table::{CounterTable, CounterTableSchema, UNIQID_MAX_LEN};
