use super::engine::{
    RowCondition, RowOperations, SchemaService, StorageEngine, TransactionService,
};
use super::persistence::{SnapshotManager, StorageSnapshot};
use super::table::{CounterTable, CounterTableSchema};
use super::Catalog;
use crate::core::{ManagedField, Result, Serial, SerialError};
use crate::transaction::{Change, TransactionId, TransactionManager, TransactionStats};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{Level, event};

/// Per-table summary for inspection and tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub name: String,
    pub owner: Option<ManagedField>,
    pub row_count: usize,
    pub high_water: Serial,
}

impl std::fmt::Display for TableStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let owner = self
            .owner
            .as_ref()
            .map(|o| o.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{} ({}): {} rows, high water {}",
            self.name, owner, self.row_count, self.high_water
        )
    }
}

/// In-memory relational store for counter tables
pub struct InMemoryStorage {
    /// Tables with individual locks
    tables: RwLock<HashMap<String, Arc<RwLock<CounterTable>>>>,
    /// Metadata only, cloned by readers
    catalog: RwLock<Catalog>,
    transactions: TransactionManager,
    snapshots: Option<SnapshotManager>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            catalog: RwLock::new(Catalog::new()),
            transactions: TransactionManager::new(),
            snapshots: None,
        }
    }

    /// Open a store backed by a snapshot file, restoring it if present.
    pub fn open<P: AsRef<Path>>(snapshot_path: P) -> Result<Self> {
        let manager = SnapshotManager::new(snapshot_path);
        let mut tables = HashMap::new();
        let mut catalog = Catalog::new();

        if let Some(snapshot) = manager.load()? {
            event!(
                Level::INFO,
                path = %manager.path().display(),
                tables = snapshot.tables.len(),
                rows = snapshot.row_count(),
                "counter store restored from snapshot"
            );
            for (name, table) in snapshot.tables {
                catalog = catalog.with_table(table.schema().clone())?;
                tables.insert(name, Arc::new(RwLock::new(table)));
            }
        }

        Ok(Self {
            tables: RwLock::new(tables),
            catalog: RwLock::new(catalog),
            transactions: TransactionManager::new(),
            snapshots: Some(manager),
        })
    }

    /// Write committed state to the snapshot file. Returns `false` when the
    /// store has no snapshot path.
    pub async fn write_snapshot(&self) -> Result<bool> {
        let Some(manager) = &self.snapshots else {
            return Ok(false);
        };

        let mut committed = HashMap::new();
        {
            let tables = self.tables.read().await;
            for (name, handle) in tables.iter() {
                let table = handle.read().await;
                committed.insert(name.clone(), table.committed_view());
            }
        }

        let snapshot = StorageSnapshot::new(committed);
        manager.save(&snapshot)?;
        event!(
            Level::DEBUG,
            path = %manager.path().display(),
            tables = snapshot.tables.len(),
            "counter store checkpointed"
        );
        Ok(true)
    }

    fn table_handle(
        tables: &HashMap<String, Arc<RwLock<CounterTable>>>,
        name: &str,
    ) -> Result<Arc<RwLock<CounterTable>>> {
        tables
            .get(name)
            .cloned()
            .ok_or_else(|| SerialError::TableNotFound(name.to_string()))
    }

    async fn get_table(&self, name: &str) -> Result<Arc<RwLock<CounterTable>>> {
        let tables = self.tables.read().await;
        Self::table_handle(&tables, name)
    }

    pub async fn list_tables(&self) -> Vec<String> {
        let catalog = self.catalog.read().await.clone();
        let mut names: Vec<String> = catalog.list_tables().into_iter().map(String::from).collect();
        names.sort();
        names
    }

    pub async fn table_stats(&self, name: &str) -> Result<TableStats> {
        let handle = self.get_table(name).await?;
        let table = handle.read().await;
        Ok(TableStats {
            name: name.to_string(),
            owner: table.schema().owner().cloned(),
            row_count: table.row_count(),
            high_water: table.high_water(),
        })
    }

    /// Committed `sid` values currently stored, ascending.
    pub async fn committed_sids(&self, name: &str) -> Result<Vec<Serial>> {
        let handle = self.get_table(name).await?;
        let table = handle.read().await;
        Ok(table.committed_sids())
    }

    /// Name of the table backing `field`, from the ownership registry.
    pub async fn table_owned_by(&self, field: &ManagedField) -> Option<String> {
        let catalog = self.catalog.read().await;
        catalog.table_owned_by(field).map(String::from)
    }

    pub async fn transaction_stats(&self) -> TransactionStats {
        self.transactions.stats().await
    }

    async fn apply_commit(&self, txn: TransactionId, changes: Vec<Change>) {
        let tables = self.tables.read().await;
        for change in changes {
            // A table dropped mid-transaction has nothing left to finalize.
            let Some(handle) = tables.get(change.table_name()) else {
                continue;
            };
            let mut table = handle.write().await;
            match change {
                Change::InsertRow { sid, .. } => table.finalize_insert(sid),
                Change::DeleteRows { sids, .. } => {
                    table.purge(&sids, txn.0);
                }
            }
        }
    }

    async fn apply_rollback(&self, txn: TransactionId, changes: Vec<Change>) {
        let tables = self.tables.read().await;
        for change in changes.into_iter().rev() {
            let Some(handle) = tables.get(change.table_name()) else {
                continue;
            };
            let mut table = handle.write().await;
            match change {
                Change::InsertRow { sid, .. } => table.undo_insert(sid),
                Change::DeleteRows { sids, .. } => table.undo_delete(&sids, txn.0),
            }
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaService for InMemoryStorage {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.catalog.read().await.table_exists(name))
    }

    async fn describe_table(&self, name: &str) -> Result<Option<CounterTableSchema>> {
        let catalog = self.catalog.read().await;
        Ok(catalog.get_table(name).ok().cloned())
    }

    async fn create_table(&self, schema: CounterTableSchema) -> Result<()> {
        let mut tables = self.tables.write().await;
        let mut catalog = self.catalog.write().await;

        let name = schema.name().to_string();
        *catalog = catalog.clone().with_table(schema.clone())?;
        tables.insert(name, Arc::new(RwLock::new(CounterTable::new(schema))));
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let mut catalog = self.catalog.write().await;

        *catalog = catalog.clone().without_table(name)?;
        tables.remove(name);
        Ok(())
    }

    async fn rename_table(&self, from: &str, to: CounterTableSchema) -> Result<()> {
        let mut tables = self.tables.write().await;
        let mut catalog = self.catalog.write().await;

        let current = catalog.get_table(from)?;
        if !current.same_layout(&to) {
            return Err(SerialError::Storage(format!(
                "Cannot rename '{}' to '{}': column layout differs",
                from,
                to.name()
            )));
        }

        *catalog = catalog.clone().with_renamed(from, to.clone())?;
        let handle = tables
            .remove(from)
            .ok_or_else(|| SerialError::TableNotFound(from.to_string()))?;
        handle.write().await.set_schema(to.clone());
        tables.insert(to.name().to_string(), handle);
        Ok(())
    }
}

#[async_trait]
impl TransactionService for InMemoryStorage {
    async fn begin(&self) -> Result<TransactionId> {
        self.transactions.begin().await
    }

    async fn commit(&self, txn: TransactionId) -> Result<()> {
        let changes = self.transactions.commit(txn).await?;
        self.apply_commit(txn, changes).await;
        Ok(())
    }

    async fn rollback(&self, txn: TransactionId) -> Result<()> {
        let changes = self.transactions.rollback(txn).await?;
        self.apply_rollback(txn, changes).await;
        Ok(())
    }
}

#[async_trait]
impl RowOperations for InMemoryStorage {
    async fn insert(&self, txn: TransactionId, table: &str, uniqid: &str) -> Result<Option<Serial>> {
        self.transactions.ensure_active(txn).await?;
        let handle = self.get_table(table).await?;

        let sid = {
            let mut guard = handle.write().await;
            guard.insert(uniqid, txn.0)?
        };

        if let Err(err) = self
            .transactions
            .record_change(
                txn,
                Change::InsertRow {
                    table: table.to_string(),
                    sid,
                },
            )
            .await
        {
            // The transaction closed underneath us; nobody will finalize the row.
            handle.write().await.undo_insert(sid);
            return Err(err);
        }

        Ok(Some(sid))
    }

    async fn delete(&self, txn: TransactionId, table: &str, condition: RowCondition) -> Result<usize> {
        self.transactions.ensure_active(txn).await?;
        let handle = self.get_table(table).await?;

        let sids = {
            let mut guard = handle.write().await;
            match condition {
                RowCondition::SidBelow(bound) => guard.mark_deleted_below(bound, txn.0),
            }
        };

        if sids.is_empty() {
            return Ok(0);
        }

        let count = sids.len();
        if let Err(err) = self
            .transactions
            .record_change(
                txn,
                Change::DeleteRows {
                    table: table.to_string(),
                    sids: sids.clone(),
                },
            )
            .await
        {
            handle.write().await.undo_delete(&sids, txn.0);
            return Err(err);
        }

        Ok(count)
    }

    async fn max_sid(&self, table: &str) -> Result<Option<Serial>> {
        let handle = self.get_table(table).await?;
        let guard = handle.read().await;
        Ok(guard.max_committed_sid())
    }
}

#[async_trait]
impl StorageEngine for InMemoryStorage {
    async fn checkpoint(&self) -> Result<bool> {
        self.write_snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage_with_table(name: &str) -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        storage
            .create_table(CounterTableSchema::new(name))
            .await
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn test_create_drop() {
        let storage = storage_with_table("serial_a").await;
        assert!(storage.table_exists("serial_a").await.unwrap());
        assert!(matches!(
            storage.create_table(CounterTableSchema::new("serial_a")).await,
            Err(SerialError::TableExists(_))
        ));

        storage.drop_table("serial_a").await.unwrap();
        assert!(!storage.table_exists("serial_a").await.unwrap());
        assert!(matches!(
            storage.drop_table("serial_a").await,
            Err(SerialError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_makes_rows_permanent() {
        let storage = storage_with_table("serial_a").await;

        let txn = storage.begin().await.unwrap();
        let sid = storage.insert(txn, "serial_a", "tok1").await.unwrap();
        assert_eq!(sid, Some(1));
        assert!(storage.committed_sids("serial_a").await.unwrap().is_empty());

        storage.commit(txn).await.unwrap();
        assert_eq!(storage.committed_sids("serial_a").await.unwrap(), vec![1]);
        assert_eq!(storage.max_sid("serial_a").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_rollback_leaves_gap() {
        let storage = storage_with_table("serial_a").await;

        let txn = storage.begin().await.unwrap();
        storage.insert(txn, "serial_a", "tok1").await.unwrap();
        storage.rollback(txn).await.unwrap();
        assert_eq!(storage.table_stats("serial_a").await.unwrap().row_count, 0);

        let txn = storage.begin().await.unwrap();
        let sid = storage.insert(txn, "serial_a", "tok1").await.unwrap();
        storage.commit(txn).await.unwrap();
        assert_eq!(sid, Some(2));
    }

    #[tokio::test]
    async fn test_delete_below_is_transactional() {
        let storage = storage_with_table("serial_a").await;
        for i in 0..5 {
            let txn = storage.begin().await.unwrap();
            storage
                .insert(txn, "serial_a", &format!("tok{}", i))
                .await
                .unwrap();
            storage.commit(txn).await.unwrap();
        }

        let txn = storage.begin().await.unwrap();
        let deleted = storage
            .delete(txn, "serial_a", RowCondition::SidBelow(4))
            .await
            .unwrap();
        assert_eq!(deleted, 3);
        storage.rollback(txn).await.unwrap();
        assert_eq!(
            storage.committed_sids("serial_a").await.unwrap(),
            vec![1, 2, 3, 4, 5]
        );

        let txn = storage.begin().await.unwrap();
        storage
            .delete(txn, "serial_a", RowCondition::SidBelow(4))
            .await
            .unwrap();
        storage.commit(txn).await.unwrap();
        assert_eq!(storage.committed_sids("serial_a").await.unwrap(), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_rename_keeps_generator() {
        let storage = storage_with_table("serial_a").await;
        let txn = storage.begin().await.unwrap();
        storage.insert(txn, "serial_a", "tok").await.unwrap();
        storage.commit(txn).await.unwrap();

        let owner = ManagedField::new("node", "story", "f");
        storage
            .rename_table("serial_a", CounterTableSchema::new("serial_b").owned_by(owner.clone()))
            .await
            .unwrap();
        assert!(!storage.table_exists("serial_a").await.unwrap());
        assert_eq!(storage.table_owned_by(&owner).await.as_deref(), Some("serial_b"));

        let txn = storage.begin().await.unwrap();
        let sid = storage.insert(txn, "serial_b", "tok2").await.unwrap();
        storage.commit(txn).await.unwrap();
        assert_eq!(sid, Some(2));
    }

    #[tokio::test]
    async fn test_operations_require_open_transaction() {
        let storage = storage_with_table("serial_a").await;
        let txn = storage.begin().await.unwrap();
        storage.commit(txn).await.unwrap();
        assert!(matches!(
            storage.insert(txn, "serial_a", "tok").await,
            Err(SerialError::Transaction(_))
        ));
    }

    #[tokio::test]
    async fn test_checkpoint_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.snapshot");

        {
            let storage = InMemoryStorage::open(&path).unwrap();
            storage
                .create_table(CounterTableSchema::new("serial_a"))
                .await
                .unwrap();
            for i in 0..3 {
                let txn = storage.begin().await.unwrap();
                storage
                    .insert(txn, "serial_a", &format!("tok{}", i))
                    .await
                    .unwrap();
                storage.commit(txn).await.unwrap();
            }
            // In flight at checkpoint time: must not survive.
            let txn = storage.begin().await.unwrap();
            storage.insert(txn, "serial_a", "pending").await.unwrap();
            assert!(storage.checkpoint().await.unwrap());
        }

        let reopened = InMemoryStorage::open(&path).unwrap();
        assert_eq!(reopened.committed_sids("serial_a").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(reopened.table_stats("serial_a").await.unwrap().high_water, 4);

        let txn = reopened.begin().await.unwrap();
        let sid = reopened.insert(txn, "serial_a", "next").await.unwrap();
        reopened.commit(txn).await.unwrap();
        assert_eq!(sid, Some(5));
    }

    #[tokio::test]
    async fn test_checkpoint_without_path() {
        let storage = InMemoryStorage::new();
        assert!(!storage.checkpoint().await.unwrap());
    }
}
