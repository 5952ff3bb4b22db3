//! Error types for sqlstep core

use std::path::PathBuf;

use thiserror::Error;

use crate::migration::Direction;

/// Result type alias using sqlstep's core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while discovering, validating and planning migrations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unable to read migrations from {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to read migration {name}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid version filename {0}")]
    InvalidFilename(String),

    #[error("Bad filename: {0}")]
    BadFilename(String),

    #[error("Duplicate {direction} migration {number}: {first} and {second}")]
    DuplicateMigration {
        number: u32,
        direction: Direction,
        first: String,
        second: String,
    },

    #[error("Missing {direction} migration {number}")]
    MissingMigration { number: u32, direction: Direction },

    #[error("Invalid target version {0} (use -1 for latest)")]
    InvalidTarget(i64),

    #[error("Target version {target} is beyond the latest migration {latest}")]
    TargetOutOfRange { target: u32, latest: u32 },
}

impl Error {
    /// Whether the error was raised while validating migration names
    pub fn is_filename_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFilename(_) | Error::BadFilename(_) | Error::DuplicateMigration { .. }
        )
    }
}
