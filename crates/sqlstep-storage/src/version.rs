//! Persisted schema version tracking

use crate::error::{DatabaseError, MigrateError, MigrateResult};
use crate::traits::{MigrationBackend, StepTransaction};

/// Reads and bootstraps the version row of a backend
pub struct VersionStore<'a> {
    backend: &'a dyn MigrationBackend,
}

impl<'a> VersionStore<'a> {
    pub fn new(backend: &'a dyn MigrationBackend) -> Self {
        Self { backend }
    }

    /// Current version, creating the version table at 0 if it is missing.
    ///
    /// Only a missing table triggers the bootstrap; every other read
    /// failure is returned as `VersionRead`.
    pub async fn get_or_bootstrap(&self) -> MigrateResult<u32> {
        match self.current().await? {
            Some(version) => Ok(version),
            None => {
                let table = self.backend.version_table().to_string();
                tracing::info!("Creating version table {}", table);
                self.backend
                    .create_version_table()
                    .await
                    .map_err(|source| MigrateError::Bootstrap { table, source })?;
                Ok(0)
            }
        }
    }

    /// Current version, or `None` when the version table does not exist yet
    pub async fn current(&self) -> MigrateResult<Option<u32>> {
        let table = self.backend.version_table();
        match self.backend.read_version().await {
            Ok(raw) => u32::try_from(raw).map(Some).map_err(|_| MigrateError::VersionRead {
                table: table.to_string(),
                source: DatabaseError::other(format!("{} is not a valid schema version", raw)),
            }),
            Err(err) if err.is_relation_missing() => Ok(None),
            Err(source) => Err(MigrateError::VersionRead {
                table: table.to_string(),
                source,
            }),
        }
    }

    /// Record a new version inside a step's transaction
    pub async fn set_version(tx: &mut dyn StepTransaction, version: u32) -> MigrateResult<()> {
        tx.write_version(version)
            .await
            .map_err(|source| MigrateError::VersionWrite { version, source })
    }
}
