//! sqlstep Storage - Version tracking and migration execution
//!
//! This crate persists the applied schema version inside the target
//! database and runs migration steps against it, one transaction per step.

#![allow(clippy::result_large_err)]

pub mod error;
pub mod memory;
pub mod migration;
pub mod observer;
pub mod traits;
pub mod version;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Table the current version is tracked in unless configured otherwise
pub const DEFAULT_VERSION_TABLE: &str = "_migrate_";

pub use error::{DatabaseError, Diagnostics, ErrorKind, MigrateError, MigrateResult};
pub use memory::MemoryBackend;
pub use migration::{migrate_database, MigrationRunner, RunReport};
pub use observer::{MigrationObserver, NoopObserver, TracingObserver};
pub use traits::{ErrorClassifier, MigrationBackend, StepTransaction};
pub use version::VersionStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;

pub use tokio_util::sync::CancellationToken;
