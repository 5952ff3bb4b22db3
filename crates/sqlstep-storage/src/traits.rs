//! Backend trait definitions

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DatabaseError, Diagnostics, ErrorKind};

/// Maps a driver's native error into the small set of kinds the engine
/// acts on
pub trait ErrorClassifier {
    type DriverError;

    fn classify(&self, err: &Self::DriverError) -> ErrorKind;

    fn diagnostics(&self, err: &Self::DriverError) -> Diagnostics;

    fn database_error(&self, err: &Self::DriverError) -> DatabaseError {
        DatabaseError::new(self.classify(err), self.diagnostics(err))
    }
}

/// A database the runner can track versions in and apply steps to
#[async_trait]
pub trait MigrationBackend: Send + Sync {
    /// Name of the single-row version table
    fn version_table(&self) -> &str;

    /// Read the raw value of the version row
    async fn read_version(&self) -> Result<i64, DatabaseError>;

    /// Create the version table holding a single row with version 0
    async fn create_version_table(&self) -> Result<(), DatabaseError>;

    /// Open the transaction one migration step runs in
    async fn begin(&self) -> Result<Box<dyn StepTransaction>, DatabaseError>;
}

/// An open transaction scoped to one migration step
#[async_trait]
pub trait StepTransaction: Send {
    /// Execute a whole migration entry as one batch
    async fn execute_batch(&mut self, sql: &str) -> Result<(), DatabaseError>;

    /// Overwrite the version row
    async fn write_version(&mut self, version: u32) -> Result<(), DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}

#[async_trait]
impl<T: MigrationBackend + ?Sized> MigrationBackend for &T {
    fn version_table(&self) -> &str {
        (**self).version_table()
    }

    async fn read_version(&self) -> Result<i64, DatabaseError> {
        (**self).read_version().await
    }

    async fn create_version_table(&self) -> Result<(), DatabaseError> {
        (**self).create_version_table().await
    }

    async fn begin(&self) -> Result<Box<dyn StepTransaction>, DatabaseError> {
        (**self).begin().await
    }
}

#[async_trait]
impl<T: MigrationBackend + ?Sized> MigrationBackend for Arc<T> {
    fn version_table(&self) -> &str {
        (**self).version_table()
    }

    async fn read_version(&self) -> Result<i64, DatabaseError> {
        (**self).read_version().await
    }

    async fn create_version_table(&self) -> Result<(), DatabaseError> {
        (**self).create_version_table().await
    }

    async fn begin(&self) -> Result<Box<dyn StepTransaction>, DatabaseError> {
        (**self).begin().await
    }
}
