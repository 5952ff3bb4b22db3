//! SQLite backend

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{validate_identifier, DatabaseError, Diagnostics, ErrorKind, MigrateError, MigrateResult};
use crate::traits::{ErrorClassifier, MigrationBackend, StepTransaction};

/// Recognizes SQLite's "no such table" failure
pub struct SqliteClassifier;

fn is_missing_table(msg: &str) -> bool {
    msg.starts_with("no such table")
}

impl ErrorClassifier for SqliteClassifier {
    type DriverError = rusqlite::Error;

    fn classify(&self, err: &rusqlite::Error) -> ErrorKind {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if is_missing_table(msg) => {
                ErrorKind::RelationMissing
            }
            rusqlite::Error::SqlInputError { msg, .. } if is_missing_table(msg) => {
                ErrorKind::RelationMissing
            }
            _ => ErrorKind::Other,
        }
    }

    fn diagnostics(&self, err: &rusqlite::Error) -> Diagnostics {
        match err {
            rusqlite::Error::SqliteFailure(code, msg) => Diagnostics {
                code: Some(code.extended_code.to_string()),
                ..Diagnostics::new(msg.clone().unwrap_or_else(|| code.to_string()))
            },
            // offset is the byte position of the error within the batch
            rusqlite::Error::SqlInputError {
                error, msg, offset, ..
            } => Diagnostics {
                code: Some(error.extended_code.to_string()),
                position: (*offset >= 0).then(|| offset.to_string()),
                ..Diagnostics::new(msg.clone())
            },
            other => Diagnostics::new(other.to_string()),
        }
    }
}

fn db_err(err: rusqlite::Error) -> DatabaseError {
    SqliteClassifier.database_error(&err)
}

/// SQLite backend
///
/// Steps hold the connection lock for their whole transaction.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteBackend {
    /// Open or create a SQLite database at the given path
    pub fn open(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let conn = Connection::open(path).map_err(|e| MigrateError::Connect(db_err(e)))?;
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> MigrateResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| MigrateError::Connect(db_err(e)))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            table: crate::DEFAULT_VERSION_TABLE.to_string(),
        }
    }

    /// Track the version in `table` instead of the default
    pub fn with_version_table(mut self, table: impl Into<String>) -> MigrateResult<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        self.table = table;
        Ok(self)
    }

    /// Run `f` against the underlying connection
    pub async fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> R) -> R {
        let conn = self.conn.lock().await;
        f(&conn)
    }
}

#[async_trait]
impl MigrationBackend for SqliteBackend {
    fn version_table(&self) -> &str {
        &self.table
    }

    async fn read_version(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn.lock().await;
        conn.query_row(&format!("SELECT version FROM {}", self.table), [], |row| row.get(0))
            .map_err(db_err)
    }

    async fn create_version_table(&self) -> Result<(), DatabaseError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute_batch(&format!(
            "CREATE TABLE {table} (version int primary key);
             INSERT INTO {table} (version) VALUES (0);",
            table = self.table
        ))
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    async fn begin(&self) -> Result<Box<dyn StepTransaction>, DatabaseError> {
        let conn = self.conn.clone().lock_owned().await;
        conn.execute_batch("BEGIN").map_err(db_err)?;
        Ok(Box::new(SqliteTransaction {
            conn,
            table: self.table.clone(),
            finished: false,
        }))
    }
}

struct SqliteTransaction {
    conn: OwnedMutexGuard<Connection>,
    table: String,
    finished: bool,
}

impl SqliteTransaction {
    fn end(&mut self, sql: &str) -> Result<(), DatabaseError> {
        // some failures already rolled the transaction back
        if self.conn.is_autocommit() {
            self.finished = true;
            return Ok(());
        }
        self.conn.execute_batch(sql).map_err(db_err)?;
        self.finished = true;
        Ok(())
    }
}

#[async_trait]
impl StepTransaction for SqliteTransaction {
    async fn execute_batch(&mut self, sql: &str) -> Result<(), DatabaseError> {
        self.conn.execute_batch(sql).map_err(db_err)
    }

    async fn write_version(&mut self, version: u32) -> Result<(), DatabaseError> {
        self.conn
            .execute(&format!("UPDATE {} SET version = ?1", self.table), params![version])
            .map(|_| ())
            .map_err(db_err)
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let mut tx = self;
        if tx.conn.is_autocommit() {
            return Err(DatabaseError::other("transaction was rolled back before commit"));
        }
        tx.end("COMMIT")
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        let mut tx = self;
        tx.end("ROLLBACK")
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.conn.is_autocommit() {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!("Rollback on drop failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationRunner;
    use crate::version::VersionStore;
    use sqlstep_core::{EmbeddedSource, Target};

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    fn fixture() -> EmbeddedSource {
        [
            ("001-foo.up.sql", "CREATE TABLE foo (id int);"),
            ("001-foo.down.sql", "DROP TABLE foo;"),
            ("002-bar.up.sql", "CREATE TABLE bar (id int);"),
            ("002-bar.down.sql", "DROP TABLE bar"),
            ("003-baz.up.sql", "CREATE TABLE baz (id int);"),
            ("003-baz.down.sql", "DROP TABLE baz;"),
        ]
        .into_iter()
        .collect()
    }

    async fn tables(backend: &SqliteBackend) -> Vec<bool> {
        backend
            .with_connection(|c| ["foo", "bar", "baz"].map(|t| table_exists(c, t)).to_vec())
            .await
    }

    #[tokio::test]
    async fn test_missing_table_classified() {
        let backend = SqliteBackend::in_memory().unwrap();
        let err = backend.read_version().await.unwrap_err();
        assert!(err.is_relation_missing(), "{:?}", err);
    }

    #[tokio::test]
    async fn test_syntax_error_not_relation_missing() {
        let backend = SqliteBackend::in_memory().unwrap();
        let err = backend
            .with_connection(|c| c.execute_batch("SELEC nonsense").unwrap_err())
            .await;
        assert_eq!(SqliteClassifier.classify(&err), ErrorKind::Other);
        let diag = SqliteClassifier.diagnostics(&err);
        assert!(diag.code.is_some());
        assert!(diag.message.contains("syntax error"), "{:?}", diag);
        assert_eq!(diag.position.as_deref(), Some("0"));
    }

    #[test]
    fn test_input_error_no_such_table() {
        let err = rusqlite::Error::SqlInputError {
            error: rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            msg: "no such table: missing".to_string(),
            sql: "SELECT version FROM missing".to_string(),
            offset: 20,
        };
        assert_eq!(SqliteClassifier.classify(&err), ErrorKind::RelationMissing);
        let diag = SqliteClassifier.diagnostics(&err);
        assert_eq!(diag.position.as_deref(), Some("20"));
        assert_eq!(diag.code.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_failed_step_reports_position() {
        let backend = SqliteBackend::in_memory().unwrap();
        let source = fixture().with_entry("002-bar.up.sql", "CREATE TABLE bar (id int); SELEC 1;");
        let err = MigrationRunner::new(&backend, source)
            .run(Target::Latest)
            .await
            .unwrap_err();

        let diag = err.diagnostics().unwrap();
        assert!(diag.message.contains("syntax error"), "{:?}", diag);
        assert!(diag.position.is_some());
        assert_eq!(VersionStore::new(&backend).current().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_bootstrap_two_paths() {
        let backend = SqliteBackend::in_memory().unwrap();
        let store = VersionStore::new(&backend);
        assert_eq!(store.get_or_bootstrap().await.unwrap(), 0);
        assert_eq!(store.get_or_bootstrap().await.unwrap(), 0);
        assert!(backend.with_connection(|c| table_exists(c, "_migrate_")).await);
    }

    #[tokio::test]
    async fn test_empty_version_table_is_read_error() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .with_connection(|c| c.execute_batch("CREATE TABLE _migrate_ (version int primary key);"))
            .await
            .unwrap();
        let err = VersionStore::new(&backend).get_or_bootstrap().await.unwrap_err();
        assert!(matches!(err, MigrateError::VersionRead { .. }));
    }

    #[tokio::test]
    async fn test_non_integer_version_is_read_error() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .with_connection(|c| {
                c.execute_batch(
                    "CREATE TABLE _migrate_ (version text); INSERT INTO _migrate_ VALUES ('two');",
                )
            })
            .await
            .unwrap();
        let err = VersionStore::new(&backend).get_or_bootstrap().await.unwrap_err();
        assert!(matches!(err, MigrateError::VersionRead { .. }));
    }

    #[tokio::test]
    async fn test_scenario() {
        let backend = Arc::new(SqliteBackend::in_memory().unwrap());
        let runner = MigrationRunner::new(backend.clone(), fixture());
        let store = VersionStore::new(&backend);

        assert_eq!(store.get_or_bootstrap().await.unwrap(), 0);
        assert_eq!(store.get_or_bootstrap().await.unwrap(), 0);

        runner.run(Target::Version(2)).await.unwrap();
        assert_eq!(store.current().await.unwrap(), Some(2));
        assert_eq!(tables(&backend).await, vec![true, true, false]);

        runner.run(Target::Version(1)).await.unwrap();
        assert_eq!(store.current().await.unwrap(), Some(1));
        assert_eq!(tables(&backend).await, vec![true, false, false]);

        runner.run(Target::Latest).await.unwrap();
        assert_eq!(store.current().await.unwrap(), Some(3));
        assert_eq!(tables(&backend).await, vec![true, true, true]);

        runner.run(Target::Version(0)).await.unwrap();
        assert_eq!(tables(&backend).await, vec![false, false, false]);
        runner.run(Target::Latest).await.unwrap();
        assert_eq!(store.current().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_failed_step_rolls_back() {
        let backend = Arc::new(SqliteBackend::in_memory().unwrap());
        let source = fixture()
            .with_entry("003-baz.up.sql", "CREATE TABLE baz (id int); CREATE TABLE broken (;")
            .with_entry("003-baz.down.sql", "DROP TABLE baz;");
        let runner = MigrationRunner::new(backend.clone(), source);

        let err = runner.run(Target::Latest).await.unwrap_err();
        assert!(matches!(err, MigrateError::Execution { ref name, .. } if name == "003-baz.up.sql"));
        assert!(err.diagnostics().is_some());

        // baz was created inside the failed transaction and must be gone
        assert_eq!(tables(&backend).await, vec![true, true, false]);
        assert_eq!(VersionStore::new(&backend).current().await.unwrap(), Some(2));

        // the connection is usable again
        runner.run(Target::Version(1)).await.unwrap();
        assert_eq!(tables(&backend).await, vec![true, false, false]);
    }

    #[tokio::test]
    async fn test_custom_version_table() {
        let backend = SqliteBackend::in_memory()
            .unwrap()
            .with_version_table("schema_version")
            .unwrap();
        let runner = MigrationRunner::new(&backend, fixture());
        runner.run(Target::Version(1)).await.unwrap();

        assert!(backend.with_connection(|c| table_exists(c, "schema_version")).await);
        assert!(!backend.with_connection(|c| table_exists(c, "_migrate_")).await);
        assert!(SqliteBackend::in_memory().unwrap().with_version_table("x y").is_err());
    }

    #[tokio::test]
    async fn test_open_file_persists_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            MigrationRunner::new(&backend, fixture())
                .run(Target::Version(2))
                .await
                .unwrap();
        }

        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(VersionStore::new(&backend).current().await.unwrap(), Some(2));
    }
}
