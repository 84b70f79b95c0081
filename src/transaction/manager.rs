// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Change, Transaction, TransactionId, TransactionState};
use crate::core::{Result, SerialError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct TransactionManager {
    // Full state of in-flight transactions.
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,

    // Copy-on-Write cache of active IDs, cloned without holding the map lock.
    active_ids: Arc<RwLock<Arc<HashSet<u64>>>>,

    committed: Arc<RwLock<u64>>,
    aborted: Arc<RwLock<u64>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
            active_ids: Arc::new(RwLock::new(Arc::new(HashSet::new()))),
            committed: Arc::new(RwLock::new(0)),
            aborted: Arc::new(RwLock::new(0)),
        }
    }

    pub async fn begin(&self) -> Result<TransactionId> {
        let transaction_id = TransactionId::new();

        {
            let mut active_lock = self.active_ids.write().await;
            let mut new_set = (**active_lock).clone();
            new_set.insert(transaction_id.0);
            *active_lock = Arc::new(new_set);
        }

        let mut transactions = self.transactions.write().await;
        transactions.insert(transaction_id, Transaction::new(transaction_id));

        Ok(transaction_id)
    }

    pub async fn record_change(&self, txn_id: TransactionId, change: Change) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&txn_id)
            .ok_or_else(|| SerialError::Transaction(format!("Transaction {} not found", txn_id)))?;
        transaction.record_change(change)
    }

    /// Ensure `txn_id` is open before touching rows on its behalf.
    pub async fn ensure_active(&self, txn_id: TransactionId) -> Result<()> {
        if self.is_active(txn_id).await {
            Ok(())
        } else {
            Err(SerialError::Transaction(format!(
                "Transaction {} is not active",
                txn_id
            )))
        }
    }

    pub async fn is_active(&self, txn_id: TransactionId) -> bool {
        self.active_ids.read().await.contains(&txn_id.0)
    }

    /// Close the transaction as committed and return its changes.
    pub async fn commit(&self, txn_id: TransactionId) -> Result<Vec<Change>> {
        let changes = {
            let mut transactions = self.transactions.write().await;
            let transaction = transactions
                .get_mut(&txn_id)
                .ok_or_else(|| SerialError::Transaction(format!("Transaction {} not found", txn_id)))?;

            if transaction.state() != TransactionState::Active {
                return Err(SerialError::Transaction("Transaction not active".into()));
            }

            let changes = transaction.commit()?;
            transactions.remove(&txn_id);
            changes
        };

        self.deactivate(txn_id).await;
        *self.committed.write().await += 1;

        Ok(changes)
    }

    /// Close the transaction as aborted and return the changes to undo.
    /// Rolling back an unknown or finished transaction is a no-op.
    pub async fn rollback(&self, txn_id: TransactionId) -> Result<Vec<Change>> {
        let changes = {
            let mut transactions = self.transactions.write().await;
            match transactions.get_mut(&txn_id) {
                Some(transaction) => {
                    let changes = transaction.rollback()?;
                    transactions.remove(&txn_id);
                    changes
                }
                None => return Ok(Vec::new()),
            }
        };

        self.deactivate(txn_id).await;
        *self.aborted.write().await += 1;

        Ok(changes)
    }

    async fn deactivate(&self, txn_id: TransactionId) {
        let mut active_lock = self.active_ids.write().await;
        if active_lock.contains(&txn_id.0) {
            let mut new_set = (**active_lock).clone();
            new_set.remove(&txn_id.0);
            *active_lock = Arc::new(new_set);
        }
    }

    pub async fn stats(&self) -> TransactionStats {
        TransactionStats {
            active: self.active_ids.read().await.len(),
            committed: *self.committed.read().await,
            aborted: *self.aborted.read().await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionStats {
    pub active: usize,
    pub committed: u64,
    pub aborted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_commit() {
        let manager = TransactionManager::new();
        let txn = manager.begin().await.unwrap();
        assert!(manager.is_active(txn).await);

        manager
            .record_change(
                txn,
                Change::InsertRow {
                    table: "serial_a".into(),
                    sid: 1,
                },
            )
            .await
            .unwrap();

        let changes = manager.commit(txn).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert!(!manager.is_active(txn).await);
        assert!(manager.commit(txn).await.is_err());

        let stats = manager.stats().await;
        assert_eq!(stats.active, 0);
        assert_eq!(stats.committed, 1);
    }

    #[tokio::test]
    async fn test_rollback_is_idempotent() {
        let manager = TransactionManager::new();
        let txn = manager.begin().await.unwrap();

        assert!(manager.rollback(txn).await.unwrap().is_empty());
        assert!(manager.rollback(txn).await.unwrap().is_empty());
        assert!(manager.ensure_active(txn).await.is_err());
        assert_eq!(manager.stats().await.aborted, 1);
    }
}
