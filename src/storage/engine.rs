use super::table::CounterTableSchema;
use crate::core::{Result, Serial};
use crate::transaction::TransactionId;
use async_trait::async_trait;

/// Physical table management.
#[async_trait]
pub trait SchemaService: Send + Sync {
    async fn table_exists(&self, name: &str) -> Result<bool>;

    /// Schema of `name`, or `None` if there is no such table.
    async fn describe_table(&self, name: &str) -> Result<Option<CounterTableSchema>>;

    /// Fails with `TableExists` if the name is taken.
    async fn create_table(&self, schema: CounterTableSchema) -> Result<()>;

    /// Fails with `TableNotFound` if the table is absent.
    async fn drop_table(&self, name: &str) -> Result<()>;

    /// Rename `from` to `to.name()` keeping its rows and generator state;
    /// the table adopts `to`'s owner.
    async fn rename_table(&self, from: &str, to: CounterTableSchema) -> Result<()>;
}

#[async_trait]
pub trait TransactionService: Send + Sync {
    async fn begin(&self) -> Result<TransactionId>;
    async fn commit(&self, txn: TransactionId) -> Result<()>;
    async fn rollback(&self, txn: TransactionId) -> Result<()>;
}

/// Row predicate for deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCondition {
    /// `sid < n`
    SidBelow(Serial),
}

/// Row operations, scoped to an open transaction.
#[async_trait]
pub trait RowOperations: Send + Sync {
    /// Insert a row with the given `uniqid` and return the generated `sid`.
    /// `None` means the engine produced no key.
    async fn insert(&self, txn: TransactionId, table: &str, uniqid: &str) -> Result<Option<Serial>>;

    /// Delete matching rows and return how many were removed.
    async fn delete(&self, txn: TransactionId, table: &str, condition: RowCondition) -> Result<usize>;

    /// Highest committed `sid` currently stored in `table`.
    async fn max_sid(&self, table: &str) -> Result<Option<Serial>>;
}

/// Everything the serial core needs from a relational store.
#[async_trait]
pub trait StorageEngine: SchemaService + TransactionService + RowOperations {
    /// Flush committed state to durable storage, if the engine keeps any.
    /// Returns whether anything was written.
    async fn checkpoint(&self) -> Result<bool> {
        Ok(false)
    }
}
