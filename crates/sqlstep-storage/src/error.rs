//! Storage error types

use serde::Serialize;
use thiserror::Error;

/// Result type alias for migration runs
pub type MigrateResult<T> = std::result::Result<T, MigrateError>;

/// Semantic class of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// The queried table does not exist
    RelationMissing,
    Other,
}

/// Driver-reported details of a failed statement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
}

impl Diagnostics {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// A backend failure, already classified by the backend's
/// [`ErrorClassifier`](crate::traits::ErrorClassifier)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .diagnostics.message)]
pub struct DatabaseError {
    pub kind: ErrorKind,
    pub diagnostics: Diagnostics,
}

impl DatabaseError {
    pub fn new(kind: ErrorKind, diagnostics: Diagnostics) -> Self {
        Self { kind, diagnostics }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, Diagnostics::new(message))
    }

    pub fn is_relation_missing(&self) -> bool {
        self.kind == ErrorKind::RelationMissing
    }
}

/// Errors returned by a migration run
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error(transparent)]
    Source(#[from] sqlstep_core::Error),

    #[error("Connection error: {0}")]
    Connect(#[source] DatabaseError),

    #[error("Unable to read schema version from {table}: {source}")]
    VersionRead {
        table: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Unable to create version table {table}: {source}")]
    Bootstrap {
        table: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Unable to start transaction for {name}: {source}")]
    Begin {
        name: String,
        #[source]
        source: DatabaseError,
    },

    #[error("executing {name}: {source}")]
    Execution {
        name: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Unable to record schema version {version}: {source}")]
    VersionWrite {
        version: u32,
        #[source]
        source: DatabaseError,
    },

    #[error("Unable to commit {name}: {source}")]
    Commit {
        name: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Migration cancelled at version {version}")]
    Cancelled { version: u32 },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl MigrateError {
    /// Driver diagnostics attached to the failure, if any
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            MigrateError::Connect(source)
            | MigrateError::VersionRead { source, .. }
            | MigrateError::Bootstrap { source, .. }
            | MigrateError::Begin { source, .. }
            | MigrateError::Execution { source, .. }
            | MigrateError::VersionWrite { source, .. }
            | MigrateError::Commit { source, .. } => Some(&source.diagnostics),
            _ => None,
        }
    }
}

/// Check a table or schema name before it is interpolated into SQL
pub fn validate_identifier(name: &str) -> MigrateResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                && name.len() <= 63
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(MigrateError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("_migrate_").is_ok());
        assert!(validate_identifier("schema_versions2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("users; DROP TABLE x").is_err());
        assert!(validate_identifier("a.b").is_err());
    }

    #[test]
    fn test_diagnostics_exposed() {
        let err = MigrateError::Execution {
            name: "001-foo.up.sql".to_string(),
            source: DatabaseError::other("syntax error"),
        };
        assert_eq!(err.to_string(), "executing 001-foo.up.sql: syntax error");
        assert_eq!(err.diagnostics().unwrap().message, "syntax error");

        let err = MigrateError::Cancelled { version: 2 };
        assert!(err.diagnostics().is_none());
    }
}
