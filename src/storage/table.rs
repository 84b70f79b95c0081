use crate::core::{ManagedField, Result, Serial, SerialError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Width of the `uniqid` column.
pub const UNIQID_MAX_LEN: usize = 23;

/// Schema of one counter table: `sid` (generated primary key) and
/// `uniqid` (unique throwaway token).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterTableSchema {
    name: String,
    owner: Option<ManagedField>,
    uniqid_max_len: usize,
}

impl CounterTableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            uniqid_max_len: UNIQID_MAX_LEN,
        }
    }

    /// Record which field instance this table backs.
    pub fn owned_by(mut self, field: ManagedField) -> Self {
        self.owner = Some(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<&ManagedField> {
        self.owner.as_ref()
    }

    /// True when both schemas describe the same columns.
    pub fn same_layout(&self, other: &CounterTableSchema) -> bool {
        self.uniqid_max_len == other.uniqid_max_len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowState {
    /// Inserted by a transaction that has not finished yet
    Pending(u64),
    Committed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRow {
    pub uniqid: String,
    pub state: RowState,
    /// Transaction that marked this row for deletion
    pub deleted_by: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterTable {
    schema: CounterTableSchema,
    rows: BTreeMap<Serial, CounterRow>,
    uniqid_index: HashMap<String, Serial>,
    /// Next value handed out by `insert`; never lowered.
    next_sid: Serial,
}

impl CounterTable {
    pub fn new(schema: CounterTableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            uniqid_index: HashMap::new(),
            next_sid: 1,
        }
    }

    pub fn schema(&self) -> &CounterTableSchema {
        &self.schema
    }

    pub(crate) fn set_schema(&mut self, schema: CounterTableSchema) {
        self.schema = schema;
    }

    /// Insert a pending row and return its generated `sid`.
    pub fn insert(&mut self, uniqid: &str, tx_id: u64) -> Result<Serial> {
        self.validate_uniqid(uniqid)?;

        // Pending and delete-marked rows still hold their token.
        if self.uniqid_index.contains_key(uniqid) {
            return Err(SerialError::ConstraintViolation(format!(
                "Unique constraint violation: column 'uniqid' already contains '{}' in '{}'",
                uniqid, self.schema.name
            )));
        }

        let sid = self.next_sid;
        self.next_sid = sid.checked_add(1).ok_or_else(|| {
            SerialError::Storage(format!("Serial space exhausted in '{}'", self.schema.name))
        })?;

        self.rows.insert(
            sid,
            CounterRow {
                uniqid: uniqid.to_string(),
                state: RowState::Pending(tx_id),
                deleted_by: None,
            },
        );
        self.uniqid_index.insert(uniqid.to_string(), sid);

        Ok(sid)
    }

    /// Mark every row with `sid < bound` that the transaction may see.
    /// Rows pending under other transactions are left alone.
    pub fn mark_deleted_below(&mut self, bound: Serial, tx_id: u64) -> Vec<Serial> {
        let mut marked = Vec::new();
        for (sid, row) in self.rows.range_mut(..bound) {
            let visible = match row.state {
                RowState::Committed => true,
                RowState::Pending(owner) => owner == tx_id,
            };
            if visible && row.deleted_by.is_none() {
                row.deleted_by = Some(tx_id);
                marked.push(*sid);
            }
        }
        marked
    }

    pub fn finalize_insert(&mut self, sid: Serial) {
        if let Some(row) = self.rows.get_mut(&sid) {
            row.state = RowState::Committed;
        }
    }

    pub fn undo_insert(&mut self, sid: Serial) {
        if let Some(row) = self.rows.remove(&sid) {
            self.uniqid_index.remove(&row.uniqid);
        }
    }

    /// Physically remove rows this transaction marked.
    pub fn purge(&mut self, sids: &[Serial], tx_id: u64) -> usize {
        let mut removed = 0;
        for sid in sids {
            let owned = self
                .rows
                .get(sid)
                .is_some_and(|row| row.deleted_by == Some(tx_id));
            if owned && let Some(row) = self.rows.remove(sid) {
                self.uniqid_index.remove(&row.uniqid);
                removed += 1;
            }
        }
        removed
    }

    pub fn undo_delete(&mut self, sids: &[Serial], tx_id: u64) {
        for sid in sids {
            if let Some(row) = self.rows.get_mut(sid)
                && row.deleted_by == Some(tx_id)
            {
                row.deleted_by = None;
            }
        }
    }

    pub fn committed_sids(&self) -> Vec<Serial> {
        self.rows
            .iter()
            .filter(|(_, row)| row.state == RowState::Committed)
            .map(|(sid, _)| *sid)
            .collect()
    }

    pub fn max_committed_sid(&self) -> Option<Serial> {
        self.rows
            .iter()
            .rev()
            .find(|(_, row)| row.state == RowState::Committed)
            .map(|(sid, _)| *sid)
    }

    /// Highest value ever handed out, committed or not.
    pub fn high_water(&self) -> Serial {
        self.next_sid - 1
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Copy holding only committed rows with delete marks cleared.
    pub fn committed_view(&self) -> CounterTable {
        let rows: BTreeMap<Serial, CounterRow> = self
            .rows
            .iter()
            .filter(|(_, row)| row.state == RowState::Committed)
            .map(|(sid, row)| {
                (
                    *sid,
                    CounterRow {
                        uniqid: row.uniqid.clone(),
                        state: RowState::Committed,
                        deleted_by: None,
                    },
                )
            })
            .collect();
        let uniqid_index = rows
            .iter()
            .map(|(sid, row)| (row.uniqid.clone(), *sid))
            .collect();

        CounterTable {
            schema: self.schema.clone(),
            rows,
            uniqid_index,
            next_sid: self.next_sid,
        }
    }

    fn validate_uniqid(&self, uniqid: &str) -> Result<()> {
        if uniqid.is_empty() {
            return Err(SerialError::ConstraintViolation(
                "Column 'uniqid' cannot be empty".into(),
            ));
        }
        if uniqid.len() > self.schema.uniqid_max_len {
            return Err(SerialError::ConstraintViolation(format!(
                "Column 'uniqid' holds at most {} characters, got {}",
                self.schema.uniqid_max_len,
                uniqid.len()
            )));
        }
        Ok(())
    }
}
