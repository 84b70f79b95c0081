use super::CounterTableSchema;
use crate::core::{ManagedField, Result, SerialError};
use std::collections::HashMap;
use std::sync::Arc;

/// Catalog of counter table schemas, including which field owns each table.
/// Immutable once built, so readers clone it without holding a lock.
#[derive(Clone, Debug)]
pub struct Catalog {
    /// Copy-on-Write: every change builds a new map
    tables: Arc<HashMap<String, CounterTableSchema>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(HashMap::new()),
        }
    }

    /// Add a table, returning a NEW Catalog
    pub fn with_table(self, schema: CounterTableSchema) -> Result<Self> {
        let name = schema.name().to_string();

        if self.tables.contains_key(&name) {
            return Err(SerialError::TableExists(name));
        }

        let mut new_tables = (*self.tables).clone();
        new_tables.insert(name, schema);

        Ok(Self {
            tables: Arc::new(new_tables),
        })
    }

    /// Remove a table, returning a NEW Catalog
    pub fn without_table(self, name: &str) -> Result<Self> {
        if !self.tables.contains_key(name) {
            return Err(SerialError::TableNotFound(name.to_string()));
        }

        let mut new_tables = (*self.tables).clone();
        new_tables.remove(name);

        Ok(Self {
            tables: Arc::new(new_tables),
        })
    }

    /// Move `from` to `to.name()`, adopting `to`'s owner.
    pub fn with_renamed(self, from: &str, to: CounterTableSchema) -> Result<Self> {
        if !self.tables.contains_key(from) {
            return Err(SerialError::TableNotFound(from.to_string()));
        }
        if self.tables.contains_key(to.name()) {
            return Err(SerialError::TableExists(to.name().to_string()));
        }

        let mut new_tables = (*self.tables).clone();
        new_tables.remove(from);
        new_tables.insert(to.name().to_string(), to);

        Ok(Self {
            tables: Arc::new(new_tables),
        })
    }

    pub fn get_table(&self, name: &str) -> Result<&CounterTableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| SerialError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn list_tables(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }

    /// Reverse lookup: the table currently backing `field`.
    pub fn table_owned_by(&self, field: &ManagedField) -> Option<&str> {
        self.tables
            .values()
            .find(|schema| schema.owner() == Some(field))
            .map(|schema| schema.name())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
