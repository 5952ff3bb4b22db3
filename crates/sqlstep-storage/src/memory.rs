//! In-memory backend for testing
//!
//! Does not interpret SQL. Batches are recorded verbatim, and failures can
//! be injected to exercise the runner's error paths.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{DatabaseError, Diagnostics, ErrorKind, MigrateResult};
use crate::traits::{ErrorClassifier, MigrationBackend, StepTransaction};

/// Native errors raised by [`MemoryBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    NoSuchTable(String),
    Injected { message: String, detail: Option<String> },
}

/// Classifier for [`MemoryError`]
pub struct MemoryClassifier;

impl ErrorClassifier for MemoryClassifier {
    type DriverError = MemoryError;

    fn classify(&self, err: &MemoryError) -> ErrorKind {
        match err {
            MemoryError::NoSuchTable(_) => ErrorKind::RelationMissing,
            _ => ErrorKind::Other,
        }
    }

    fn diagnostics(&self, err: &MemoryError) -> Diagnostics {
        match err {
            MemoryError::NoSuchTable(table) => {
                Diagnostics::new(format!("relation \"{}\" does not exist", table))
            }
            MemoryError::Injected { message, detail } => Diagnostics {
                detail: detail.clone(),
                ..Diagnostics::new(message.clone())
            },
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    version: Option<i64>,
    executed: Vec<String>,
    table_creations: usize,
    transactions: usize,
    fail_reads: Option<String>,
    fail_marker: Option<String>,
    fail_commits: bool,
}

/// In-memory backend
///
/// Clones share state, so a test can keep a handle while a runner owns
/// another.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    table: String,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            table: crate::DEFAULT_VERSION_TABLE.to_string(),
        }
    }

    /// Backend whose version table already holds `version`
    pub fn with_version(version: i64) -> Self {
        let backend = Self::new();
        backend.lock_state().version = Some(version);
        backend
    }

    pub fn with_version_table(mut self, table: impl Into<String>) -> MigrateResult<Self> {
        let table = table.into();
        crate::error::validate_identifier(&table)?;
        self.table = table;
        Ok(self)
    }

    /// Make every version read fail with `message`
    pub fn fail_version_reads(&self, message: impl Into<String>) {
        self.lock_state().fail_reads = Some(message.into());
    }

    /// Make any batch containing `marker` fail
    pub fn fail_batches_containing(&self, marker: impl Into<String>) {
        self.lock_state().fail_marker = Some(marker.into());
    }

    pub fn fail_commits(&self, fail: bool) {
        self.lock_state().fail_commits = fail;
    }

    /// Committed version, `None` before bootstrap
    pub fn version(&self) -> Option<i64> {
        self.lock_state().version
    }

    /// Batches from committed transactions, in order
    pub fn executed(&self) -> Vec<String> {
        self.lock_state().executed.clone()
    }

    pub fn table_creations(&self) -> usize {
        self.lock_state().table_creations
    }

    pub fn transactions_begun(&self) -> usize {
        self.lock_state().transactions
    }

    fn lock_state(&self) -> MutexGuard<'_, MemoryState> {
        lock(&self.state)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

// poisoning is ignored, the state is plain data
fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl MigrationBackend for MemoryBackend {
    fn version_table(&self) -> &str {
        &self.table
    }

    async fn read_version(&self) -> Result<i64, DatabaseError> {
        let state = self.lock_state();
        if let Some(message) = &state.fail_reads {
            return Err(MemoryClassifier.database_error(&MemoryError::Injected {
                message: message.clone(),
                detail: None,
            }));
        }
        state
            .version
            .ok_or_else(|| MemoryClassifier.database_error(&MemoryError::NoSuchTable(self.table.clone())))
    }

    async fn create_version_table(&self) -> Result<(), DatabaseError> {
        let mut state = self.lock_state();
        state.version = Some(0);
        state.table_creations += 1;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StepTransaction>, DatabaseError> {
        self.lock_state().transactions += 1;
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            table: self.table.clone(),
            pending: Vec::new(),
            pending_version: None,
        }))
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    table: String,
    pending: Vec<String>,
    pending_version: Option<u32>,
}

#[async_trait]
impl StepTransaction for MemoryTransaction {
    async fn execute_batch(&mut self, sql: &str) -> Result<(), DatabaseError> {
        let marker = lock(&self.state).fail_marker.clone();
        if let Some(marker) = marker {
            if sql.contains(&marker) {
                return Err(MemoryClassifier.database_error(&MemoryError::Injected {
                    message: format!("syntax error at or near \"{}\"", marker),
                    detail: Some(format!("batch of {} bytes", sql.len())),
                }));
            }
        }
        self.pending.push(sql.to_string());
        Ok(())
    }

    async fn write_version(&mut self, version: u32) -> Result<(), DatabaseError> {
        if lock(&self.state).version.is_none() {
            return Err(MemoryClassifier.database_error(&MemoryError::NoSuchTable(self.table.clone())));
        }
        self.pending_version = Some(version);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let mut state = lock(&self.state);
        if state.fail_commits {
            return Err(MemoryClassifier.database_error(&MemoryError::Injected {
                message: "could not serialize access due to concurrent update".to_string(),
                detail: None,
            }));
        }
        state.executed.extend(self.pending.iter().cloned());
        if let Some(version) = self.pending_version {
            state.version = Some(i64::from(version));
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_table_is_classified() {
        let backend = MemoryBackend::new();
        let err = backend.read_version().await.unwrap_err();
        assert!(err.is_relation_missing());
        assert_eq!(err.to_string(), "relation \"_migrate_\" does not exist");
    }

    #[tokio::test]
    async fn test_rollback_discards_pending() {
        let backend = MemoryBackend::with_version(0);

        let mut tx = backend.begin().await.unwrap();
        tx.execute_batch("CREATE TABLE foo (id int);").await.unwrap();
        tx.write_version(1).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(backend.executed().is_empty());
        assert_eq!(backend.version(), Some(0));
    }

    #[tokio::test]
    async fn test_injected_batch_failure() {
        let backend = MemoryBackend::with_version(0);
        backend.fail_batches_containing("BROKEN");

        let mut tx = backend.begin().await.unwrap();
        let err = tx.execute_batch("SELECT BROKEN;").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Other);
        assert!(err.diagnostics.detail.is_some());
    }

    #[test]
    fn test_rejects_bad_table_name() {
        assert!(MemoryBackend::new().with_version_table("bad name").is_err());
    }
}
