use super::types::ManagedField;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("Naming error: {0}")]
    Naming(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Counter table '{table}' for field {field} does not exist")]
    CounterTableMissing { table: String, field: ManagedField },

    #[error("Storage returned no generated key for counter table '{0}'")]
    DegradedAllocation(String),

    #[error("Backfill of {field} aborted after {initialized} entities: {source}")]
    BackfillAborted {
        field: ManagedField,
        initialized: usize,
        #[source]
        source: Box<SerialError>,
    },

    #[error("Bundle rename {entity_type}.{bundle} aborted after {renamed} tables: {source}")]
    RenameAborted {
        entity_type: String,
        bundle: String,
        renamed: usize,
        #[source]
        source: Box<SerialError>,
    },

    #[error("Entity {entity_type}/{id} not found")]
    EntityNotFound { entity_type: String, id: u64 },

    #[error("Host error: {0}")]
    Host(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, SerialError>;

impl From<std::io::Error> for SerialError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for SerialError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Storage(format!("Failed to serialize snapshot: {}", err))
    }
}

impl From<rmp_serde::decode::Error> for SerialError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Storage(format!("Failed to deserialize snapshot: {}", err))
    }
}
