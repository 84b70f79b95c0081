// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Command Pattern: every row operation performed inside a transaction is
// recorded so that commit can finalize it and rollback can reverse it.
//
// ============================================================================

use crate::core::Serial;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A row inserted as pending under this transaction
    InsertRow { table: String, sid: Serial },

    /// Rows marked deleted by this transaction
    DeleteRows { table: String, sids: Vec<Serial> },
}

impl Change {
    pub fn table_name(&self) -> &str {
        match self {
            Change::InsertRow { table, .. } => table,
            Change::DeleteRows { table, .. } => table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_table_name() {
        let insert = Change::InsertRow {
            table: "serial_a".to_string(),
            sid: 7,
        };
        let delete = Change::DeleteRows {
            table: "serial_b".to_string(),
            sids: vec![1, 2, 3],
        };
        assert_eq!(insert.table_name(), "serial_a");
        assert_eq!(delete.table_name(), "serial_b");
    }
}
