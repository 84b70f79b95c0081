// ============================================================================
// Value Allocator
// ============================================================================
//
// allocate():
//   BEGIN
//   INSERT INTO <counter table> (uniqid) VALUES (<token>)  -> generated sid
//   [sid % cleanup_interval == 0] DELETE FROM <counter table> WHERE sid < <sid>
//   COMMIT  (ROLLBACK + re-raise on any failure)
//
// Uniqueness comes from the store's key generation alone; no locks are held
// here. The transaction lives in a TransactionGuard, so a dropped call is
// rolled back too.
//
// ============================================================================

pub mod token;

use crate::config::{DegradedPolicy, SerialConfig};
use crate::core::{ManagedField, Result, Serial, SerialError};
use crate::naming::TableNamer;
use crate::storage::{RowCondition, StorageEngine, TransactionGuard};
use crate::transaction::TransactionId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Instrument, Level, event, info_span};

pub use token::generate_token;

#[derive(Debug, Default)]
struct AllocatorCounters {
    allocations: AtomicU64,
    cleanups: AtomicU64,
    rows_cleaned: AtomicU64,
    degraded: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of the allocator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub allocations: u64,
    pub cleanups: u64,
    pub rows_cleaned: u64,
    /// Inserts for which the store returned no key
    pub degraded: u64,
    pub failures: u64,
}

pub struct ValueAllocator {
    storage: Arc<dyn StorageEngine>,
    namer: TableNamer,
    cleanup_interval: u64,
    degraded_policy: DegradedPolicy,
    counters: AllocatorCounters,
}

impl ValueAllocator {
    pub fn new(storage: Arc<dyn StorageEngine>, config: &SerialConfig) -> Self {
        Self {
            storage,
            namer: TableNamer::new(config),
            cleanup_interval: config.cleanup_interval,
            degraded_policy: config.degraded_policy,
            counters: AllocatorCounters::default(),
        }
    }

    /// Produce the next serial value for `field`.
    ///
    /// With `cleanup`, an allocation landing on a multiple of the cleanup
    /// interval also deletes every row below it.
    ///
    /// ```
    /// use serialfield::{InMemoryStorage, ManagedField, SerialConfig, ValueAllocator};
    /// use serialfield::storage::{CounterTableSchema, SchemaService};
    /// use std::sync::Arc;
    ///
    /// # tokio_test::block_on(async {
    /// let config = SerialConfig::default();
    /// let storage = Arc::new(InMemoryStorage::new());
    /// let field = ManagedField::new("article", "news", "ticket_no");
    /// let table = serialfield::naming::TableNamer::new(&config).resolve(&field).unwrap();
    /// storage.create_table(CounterTableSchema::new(table)).await.unwrap();
    ///
    /// let allocator = ValueAllocator::new(storage, &config);
    /// let first = allocator.allocate(&field, true).await.unwrap();
    /// let second = allocator.allocate(&field, true).await.unwrap();
    /// assert!(second > first);
    /// # });
    /// ```
    pub async fn allocate(&self, field: &ManagedField, cleanup: bool) -> Result<Serial> {
        let table = self.namer.resolve(field)?;
        let span = info_span!(
            "serial.allocate",
            entity_type = %field.entity_type,
            bundle = %field.bundle,
            field_name = %field.field_name,
            table = %table
        );

        async {
            let mut txn = TransactionGuard::begin(self.storage.clone()).await?;

            let outcome = match self.allocate_in(txn.id(), field, &table, cleanup).await {
                Ok(value) => txn.commit().await.map(|_| value),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(value) => {
                    self.counters.allocations.fetch_add(1, Ordering::Relaxed);
                    event!(Level::DEBUG, value, "serial value allocated");
                    Ok(value)
                }
                Err(err) => {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    event!(Level::ERROR, error = %err, "serial allocation failed, rolling back");
                    if let Err(rollback_err) = txn.rollback().await {
                        event!(Level::ERROR, error = %rollback_err, "serial allocation rollback failed");
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn allocate_in(
        &self,
        txn: TransactionId,
        field: &ManagedField,
        table: &str,
        cleanup: bool,
    ) -> Result<Serial> {
        let token = generate_token();

        let sid = match self.storage.insert(txn, table, &token).await {
            Ok(Some(sid)) => sid,
            Ok(None) => return self.degraded(table),
            Err(SerialError::TableNotFound(_)) => {
                return Err(SerialError::CounterTableMissing {
                    table: table.to_string(),
                    field: field.clone(),
                });
            }
            Err(err) => return Err(err),
        };

        if cleanup && sid > 0 && sid % self.cleanup_interval == 0 {
            let removed = self
                .storage
                .delete(txn, table, RowCondition::SidBelow(sid))
                .await?;
            self.counters.cleanups.fetch_add(1, Ordering::Relaxed);
            self.counters
                .rows_cleaned
                .fetch_add(removed as u64, Ordering::Relaxed);
            event!(Level::DEBUG, sid, removed, "counter table cleaned");
        }

        Ok(sid)
    }

    fn degraded(&self, table: &str) -> Result<Serial> {
        self.counters.degraded.fetch_add(1, Ordering::Relaxed);
        match self.degraded_policy {
            DegradedPolicy::FallbackToZero => {
                event!(
                    Level::WARN,
                    table = %table,
                    "store returned no generated key, falling back to 0"
                );
                Ok(0)
            }
            DegradedPolicy::Fail => Err(SerialError::DegradedAllocation(table.to_string())),
        }
    }

    /// Delete every row below the highest committed `sid` of `field`'s table.
    /// The generator position is unaffected.
    pub async fn compact(&self, field: &ManagedField) -> Result<usize> {
        let table = self.namer.resolve(field)?;
        let Some(max) = self.storage.max_sid(&table).await? else {
            return Ok(0);
        };

        let mut txn = TransactionGuard::begin(self.storage.clone()).await?;
        let removed = match self
            .storage
            .delete(txn.id(), &table, RowCondition::SidBelow(max))
            .await
        {
            Ok(removed) => removed,
            Err(err) => {
                txn.rollback().await?;
                return Err(err);
            }
        };
        txn.commit().await?;

        self.counters
            .rows_cleaned
            .fetch_add(removed as u64, Ordering::Relaxed);
        event!(Level::DEBUG, table = %table, removed, "counter table compacted");
        Ok(removed)
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            allocations: self.counters.allocations.load(Ordering::Relaxed),
            cleanups: self.counters.cleanups.load(Ordering::Relaxed),
            rows_cleaned: self.counters.rows_cleaned.load(Ordering::Relaxed),
            degraded: self.counters.degraded.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}
