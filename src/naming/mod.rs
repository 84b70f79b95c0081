// ============================================================================
// Counter Table Naming
// ============================================================================
//
// Maps a (entity type, bundle, field name) triple to a bounded-length
// physical table name: prefix + md5("entity_type:bundle:field_name").
//
// ============================================================================

use crate::config::SerialConfig;
use crate::core::{ManagedField, Result, SerialError};
use lazy_static::lazy_static;
use md5::{Digest, Md5};
use regex::Regex;

/// Separator between triple components before hashing. Machine names never
/// contain it, so distinct triples always produce distinct hash inputs.
pub const COMPONENT_SEPARATOR: char = ':';

lazy_static! {
    static ref IDENTIFIER_STRIP: Regex = Regex::new(r"[^A-Za-z0-9_.]+").unwrap();
}

/// Strips every character that is not valid in an unquoted table identifier.
pub fn escape_table(name: &str) -> String {
    IDENTIFIER_STRIP.replace_all(name, "").into_owned()
}

/// Resolves a triple with the default prefix and identifier limit.
pub fn resolve(entity_type: &str, bundle: &str, field_name: &str) -> Result<String> {
    TableNamer::default().resolve_parts(entity_type, bundle, field_name)
}

#[derive(Debug, Clone)]
pub struct TableNamer {
    prefix: String,
    max_len: usize,
}

impl TableNamer {
    pub fn new(config: &SerialConfig) -> Self {
        Self {
            prefix: config.table_prefix.clone(),
            max_len: config.max_identifier_len,
        }
    }

    pub fn resolve(&self, field: &ManagedField) -> Result<String> {
        self.resolve_parts(&field.entity_type, &field.bundle, &field.field_name)
    }

    pub fn resolve_parts(&self, entity_type: &str, bundle: &str, field_name: &str) -> Result<String> {
        for (label, part) in [
            ("entity type", entity_type),
            ("bundle", bundle),
            ("field name", field_name),
        ] {
            if part.is_empty() {
                return Err(SerialError::Naming(format!("{} cannot be empty", label)));
            }
        }

        let key = format!(
            "{}{sep}{}{sep}{}",
            entity_type,
            bundle,
            field_name,
            sep = COMPONENT_SEPARATOR
        );
        let digest = Md5::digest(key.as_bytes());
        let name = escape_table(&format!("{}{:x}", self.prefix, digest));

        if name.len() > self.max_len {
            return Err(SerialError::Naming(format!(
                "Resolved table name '{}' exceeds the identifier limit of {}",
                name, self.max_len
            )));
        }

        Ok(name)
    }
}

impl Default for TableNamer {
    fn default() -> Self {
        Self::new(&SerialConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_deterministic() {
        let first = resolve("article", "news", "ticket_no").unwrap();
        let second = resolve("article", "news", "ticket_no").unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("serial_"));
        assert_eq!(first.len(), "serial_".len() + 32);
        assert!(first.len() <= 64);
    }

    #[test]
    fn test_distinct_triples_distinct_names() {
        let a = resolve("node", "article", "field_a").unwrap();
        let b = resolve("node", "article", "field_b").unwrap();
        let c = resolve("node", "page", "field_a").unwrap();
        let d = resolve("user", "article", "field_a").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_separator_keeps_boundaries() {
        // Underscore-joined inputs would both hash "node_a_b_c".
        let left = resolve("node", "a_b", "c").unwrap();
        let right = resolve("node", "a", "b_c").unwrap();
        assert_ne!(left, right);
    }

    #[test]
    fn test_long_components_stay_bounded() {
        let long = "x".repeat(500);
        let name = resolve(&long, &long, &long).unwrap();
        assert!(name.len() <= 64);
    }

    #[test]
    fn test_empty_component_rejected() {
        assert!(matches!(resolve("", "news", "f"), Err(SerialError::Naming(_))));
        assert!(matches!(resolve("node", "", "f"), Err(SerialError::Naming(_))));
        assert!(matches!(resolve("node", "news", ""), Err(SerialError::Naming(_))));
    }

    #[test]
    fn test_escape_table() {
        assert_eq!(escape_table("serial_abc"), "serial_abc");
        assert_eq!(escape_table("db.serial-x y;"), "db.serialxy");
    }

    #[test]
    fn test_custom_prefix() {
        let namer = TableNamer::new(&SerialConfig::new().table_prefix("ctr_"));
        let name = namer.resolve(&ManagedField::new("node", "news", "f")).unwrap();
        assert!(name.starts_with("ctr_"));
        assert_eq!(&name[4..], &resolve("node", "news", "f").unwrap()[7..]);
    }
}
