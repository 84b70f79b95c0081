use super::engine::StorageEngine;
use crate::core::Result;
use crate::transaction::TransactionId;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{Level, event};

/// An open transaction that is rolled back if dropped before it closes.
///
/// A caller that stops polling mid-way (timeout, aborted task, a sibling
/// failing in `try_join_all`) leaves no pending rows behind: the drop
/// schedules the rollback on the current runtime.
pub struct TransactionGuard {
    storage: Arc<dyn StorageEngine>,
    txn: TransactionId,
    open: bool,
}

impl TransactionGuard {
    pub async fn begin(storage: Arc<dyn StorageEngine>) -> Result<Self> {
        let txn = storage.begin().await?;
        Ok(Self {
            storage,
            txn,
            open: true,
        })
    }

    pub fn id(&self) -> TransactionId {
        self.txn
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.storage.commit(self.txn).await?;
        self.open = false;
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        let result = self.storage.rollback(self.txn).await;
        self.open = false;
        result
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if !self.open {
            return;
        }

        let txn = self.txn;
        match Handle::try_current() {
            Ok(handle) => {
                event!(Level::WARN, txn = %txn, "transaction abandoned, rolling back");
                let storage = self.storage.clone();
                handle.spawn(async move {
                    if let Err(err) = storage.rollback(txn).await {
                        event!(Level::ERROR, txn = %txn, error = %err, "background rollback failed");
                    }
                });
            }
            Err(_) => {
                event!(Level::ERROR, txn = %txn, "transaction abandoned outside a runtime");
            }
        }
    }
}
