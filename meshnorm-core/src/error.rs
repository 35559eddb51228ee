//! Error types for meshnorm operations.
//!
//! Only structural failures abort a run. Per-heading and per-publication
//! problems (missing concepts, ambiguous concepts, unresolved tree numbers)
//! are reported as data on the build and batch reports instead.

use thiserror::Error;

/// Result type alias for meshnorm operations.
pub type Result<T> = std::result::Result<T, MeshNormError>;

/// Core error types for table building and annotation.
#[derive(Error, Debug)]
pub enum MeshNormError {
    /// A required column is absent from an input table
    #[error("schema error: table '{table}' is missing required column '{column}'")]
    Schema { table: String, column: String },

    /// A thesaurus row could not be turned into a record
    #[error("invalid thesaurus record at line {line}: {reason}")]
    InvalidRecord { line: u64, reason: String },

    /// The hierarchy lookup collaborator failed (not a "no codes" outcome)
    #[error("hierarchy lookup failed for '{term}': {reason}")]
    Lookup { term: String, reason: String },

    /// Target branch prefix is unusable
    #[error("invalid tree number prefix: {0:?}")]
    InvalidPrefix(String),

    /// CSV reading or writing failed
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Report serialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeshNormError {
    /// Returns true if this error must halt the whole batch.
    ///
    /// Record-level and lookup failures are recovered by the caller.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            MeshNormError::InvalidRecord { .. } | MeshNormError::Lookup { .. }
        )
    }

    /// Shorthand for a missing-column error.
    pub(crate) fn schema(table: &str, column: &str) -> Self {
        MeshNormError::Schema {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(MeshNormError::schema("thesaurus", "CUI").is_fatal());
        assert!(!MeshNormError::Lookup {
            term: "Neoplasms".into(),
            reason: "429".into()
        }
        .is_fatal());
        assert!(!MeshNormError::InvalidRecord {
            line: 3,
            reason: "empty CUI".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_schema_message() {
        let err = MeshNormError::schema("vocabulary", "UMLS_CUI");
        assert_eq!(
            err.to_string(),
            "schema error: table 'vocabulary' is missing required column 'UMLS_CUI'"
        );
    }
}
