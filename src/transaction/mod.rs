// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Short-lived transactions scoping counter-table inserts and range deletes.
//
// Design Patterns Used:
// - State Pattern: Transaction state management (Active, Committed, Aborted)
// - Command Pattern: Recorded changes finalized on commit, reversed on rollback
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::Change;
pub use manager::{TransactionManager, TransactionStats};
pub use state::{Transaction, TransactionId, TransactionState};
