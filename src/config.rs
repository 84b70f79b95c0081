use crate::core::{Result, SerialError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Length of an md5 digest rendered as hex.
pub const HASH_HEX_LEN: usize = 32;

/// What the allocator does when the store hands back no generated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedPolicy {
    /// Return 0, log a warning and count it.
    #[default]
    FallbackToZero,
    /// Roll back and return `SerialError::DegradedAllocation`.
    Fail,
}

/// Serial field configuration
///
/// Built with chained setters, or deserialized from JSON:
///
/// ```
/// use serialfield::SerialConfig;
///
/// let config = SerialConfig::new()
///     .table_prefix("serial_")
///     .cleanup_interval(10);
/// assert!(config.validate().is_ok());
///
/// let parsed = SerialConfig::from_json_str(r#"{ "cleanup_interval": 50 }"#).unwrap();
/// assert_eq!(parsed.cleanup_interval, 50);
/// assert_eq!(parsed.table_prefix, "serial_");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Namespace marker prepended to every counter table name
    pub table_prefix: String,

    /// Longest identifier the storage engine accepts
    pub max_identifier_len: usize,

    /// Allocations whose value is a multiple of this trigger cleanup
    pub cleanup_interval: u64,

    /// Host field type handled by this crate
    pub field_type: String,

    /// Behavior when the store returns no generated key
    pub degraded_policy: DegradedPolicy,

    /// Storage snapshot file (in-memory backend only)
    pub snapshot_path: Option<PathBuf>,
}

impl SerialConfig {
    pub fn new() -> Self {
        Self {
            table_prefix: "serial_".to_string(),
            max_identifier_len: 64,
            cleanup_interval: 10,
            field_type: "serial".to_string(),
            degraded_policy: DegradedPolicy::FallbackToZero,
            snapshot_path: None,
        }
    }

    pub fn table_prefix(mut self, prefix: &str) -> Self {
        self.table_prefix = prefix.to_string();
        self
    }

    pub fn max_identifier_len(mut self, len: usize) -> Self {
        self.max_identifier_len = len;
        self
    }

    pub fn cleanup_interval(mut self, interval: u64) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn field_type(mut self, field_type: &str) -> Self {
        self.field_type = field_type.to_string();
        self
    }

    pub fn degraded_policy(mut self, policy: DegradedPolicy) -> Self {
        self.degraded_policy = policy;
        self
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SerialError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SerialError::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_prefix.is_empty() {
            return Err(SerialError::Config("table_prefix cannot be empty".into()));
        }

        if crate::naming::escape_table(&self.table_prefix) != self.table_prefix {
            return Err(SerialError::Config(format!(
                "table_prefix '{}' contains characters not allowed in identifiers",
                self.table_prefix
            )));
        }

        if self.table_prefix.len() + HASH_HEX_LEN > self.max_identifier_len {
            return Err(SerialError::Config(format!(
                "table_prefix '{}' leaves no room for the hash within {} characters",
                self.table_prefix, self.max_identifier_len
            )));
        }

        if self.cleanup_interval == 0 {
            return Err(SerialError::Config("cleanup_interval must be > 0".into()));
        }

        if self.field_type.is_empty() {
            return Err(SerialError::Config("field_type cannot be empty".into()));
        }

        Ok(())
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new()
    }
}
