// ============================================================================
// Transaction State Management
// ============================================================================
//
// Each allocation runs in its own short transaction:
//   Active -> Committed (pending rows become permanent, marked rows purged)
//   Active -> Aborted   (pending rows vanish, delete marks are cleared)
//
// ============================================================================

use super::Change;
use crate::core::{Result, SerialError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// One storage transaction and the changes it has applied so far
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    changes: Vec<Change>,
}

impl Transaction {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            changes: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Record a change in this transaction
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn record_change(&mut self, change: Change) -> Result<()> {
        if !self.state.is_active() {
            return Err(SerialError::Transaction(format!(
                "Cannot record change: transaction {} is {}",
                self.id, self.state
            )));
        }

        self.changes.push(change);
        Ok(())
    }

    /// Mark transaction as committed, handing back the changes to finalize
    pub fn commit(&mut self) -> Result<Vec<Change>> {
        if !self.state.is_active() {
            return Err(SerialError::Transaction(format!(
                "Cannot commit: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.state = TransactionState::Committed;
        Ok(std::mem::take(&mut self.changes))
    }

    /// Mark transaction as aborted, handing back the changes to undo
    pub fn rollback(&mut self) -> Result<Vec<Change>> {
        if !self.state.is_active() {
            return Err(SerialError::Transaction(format!(
                "Cannot rollback: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.state = TransactionState::Aborted;
        Ok(std::mem::take(&mut self.changes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_generation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert!(id2 > id1);
    }

    #[test]
    fn test_transaction_lifecycle() {
        let mut txn = Transaction::new(TransactionId::new());

        assert_eq!(txn.state(), TransactionState::Active);
        assert!(txn.state().is_active());

        txn.record_change(Change::InsertRow {
            table: "serial_a".to_string(),
            sid: 1,
        })
        .unwrap();

        let changes = txn.commit().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(txn.commit().is_err());
    }

    #[test]
    fn test_cannot_commit_twice() {
        let mut txn = Transaction::new(TransactionId::new());
        txn.commit().unwrap();
        assert!(txn.commit().is_err());
        assert!(txn.rollback().is_err());
    }

    #[test]
    fn test_rollback_returns_changes_to_undo() {
        let mut txn = Transaction::new(TransactionId::new());
        txn.record_change(Change::DeleteRows {
            table: "serial_a".to_string(),
            sids: vec![1, 2],
        })
        .unwrap();

        let undo = txn.rollback().unwrap();
        assert_eq!(undo.len(), 1);
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert!(txn.record_change(Change::InsertRow {
            table: "serial_a".to_string(),
            sid: 3,
        })
        .is_err());
    }
}
