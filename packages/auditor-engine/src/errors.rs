//! Error types for auditor-engine
//!
//! Provides unified error handling across the crate. Fatal errors abort the
//! pipeline with exit code 2; per-file and per-rule failures are caught at
//! the narrowest boundary and recorded as structured rows.

use thiserror::Error;

/// Main error type for engine operations
#[derive(Debug, Error)]
pub enum AuditError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error (per-file, recoverable)
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// Extraction error (per-file, recoverable)
    #[error("Extraction error in {file}: {message}")]
    Extraction { file: String, message: String },

    /// Graph construction error
    #[error("Graph error: {0}")]
    Graph(String),

    /// Taint analysis error
    #[error("Taint analysis error: {0}")]
    Taint(String),

    /// Rule execution error (per-rule, recoverable)
    #[error("Rule error in {rule}: {message}")]
    Rule { rule: String, message: String },

    /// Storage layer error
    #[error(transparent)]
    Storage(#[from] auditor_storage::StorageError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run cancelled by the caller
    #[error("Cancelled")]
    Cancelled,
}

impl AuditError {
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        AuditError::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn extraction(file: impl Into<String>, message: impl Into<String>) -> Self {
        AuditError::Extraction {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        AuditError::Rule {
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        AuditError::Config(message.into())
    }

    /// Fatal errors surface immediately and abort the pipeline (exit 2).
    pub fn is_fatal(&self) -> bool {
        match self {
            AuditError::Storage(err) => err.kind.is_fatal(),
            AuditError::Graph(_) | AuditError::Config(_) | AuditError::Cancelled => true,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for AuditError {
    fn from(err: rusqlite::Error) -> Self {
        AuditError::Storage(err.into())
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AuditError::Graph("unidirectional".into()).is_fatal());
        assert!(!AuditError::parse("a.py", "bad syntax").is_fatal());
        assert!(!AuditError::rule("jwt_weak_patterns", "boom").is_fatal());

        let fidelity: AuditError =
            auditor_storage::StorageError::fidelity("zero rows stored").into();
        assert!(fidelity.is_fatal());
        let database: AuditError =
            auditor_storage::StorageError::database("locked").into();
        assert!(!database.is_fatal());
    }
}
