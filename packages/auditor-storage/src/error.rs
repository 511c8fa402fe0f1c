//! Error types for auditor-storage

use std::fmt;
use thiserror::Error;

/// Storage error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Database errors (SQLite)
    Database,
    /// Live database does not match the schema registry
    Schema,
    /// Manifest/receipt reconciliation failure
    Fidelity,
    /// Transaction errors
    Transaction,
    /// Post-write integrity audit failure
    Integrity,
    /// Serialization/deserialization errors
    Serialization,
    /// I/O errors
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Database => "database",
            ErrorKind::Schema => "schema",
            ErrorKind::Fidelity => "fidelity",
            ErrorKind::Transaction => "transaction",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Io => "io",
        }
    }

    /// Fatal kinds abort the pipeline (exit code 2); the rest are
    /// recoverable at a per-file or per-rule boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::Schema | ErrorKind::Fidelity | ErrorKind::Integrity
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StorageError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema, message)
    }

    pub fn fidelity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fidelity, message)
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transaction, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integrity, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::database(format!("SQLite error: {}", err)).with_source(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::serialization(format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::new(ErrorKind::Io, format!("I/O error: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::schema("column missing: symbols.scope");
        let msg = format!("{}", err);
        assert_eq!(msg, "[schema] column missing: symbols.scope");
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(ErrorKind::Schema.is_fatal());
        assert!(ErrorKind::Fidelity.is_fatal());
        assert!(ErrorKind::Integrity.is_fatal());
        assert!(!ErrorKind::Database.is_fatal());
        assert!(!ErrorKind::Io.is_fatal());
    }

    #[test]
    fn test_from_rusqlite_error() {
        let err: StorageError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.kind, ErrorKind::Database);
        assert!(err.source.is_some());
    }

    #[test]
    fn test_result_propagation() {
        fn inner() -> Result<()> {
            Err(StorageError::fidelity("zero rows stored"))
        }

        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }

        assert_eq!(outer().unwrap_err().kind, ErrorKind::Fidelity);
    }
}
