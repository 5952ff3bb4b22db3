//! Postgres backend

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgDatabaseError, PgErrorPosition, PgPool, PgPoolOptions};
use sqlx::{Executor, Postgres, Transaction};

use crate::error::{validate_identifier, DatabaseError, Diagnostics, ErrorKind, MigrateError, MigrateResult};
use crate::traits::{ErrorClassifier, MigrationBackend, StepTransaction};

/// SQLSTATE for `undefined_table`
const UNDEFINED_TABLE: &str = "42P01";

const CONNECT_ATTEMPTS: u32 = 30;

/// Recognizes `undefined_table` and extracts the server's error fields
pub struct PostgresClassifier;

impl ErrorClassifier for PostgresClassifier {
    type DriverError = sqlx::Error;

    fn classify(&self, err: &sqlx::Error) -> ErrorKind {
        match err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNDEFINED_TABLE) => {
                ErrorKind::RelationMissing
            }
            _ => ErrorKind::Other,
        }
    }

    fn diagnostics(&self, err: &sqlx::Error) -> Diagnostics {
        let sqlx::Error::Database(db) = err else {
            return Diagnostics::new(err.to_string());
        };

        let mut diag = Diagnostics::new(db.message());
        diag.code = db.code().map(|c| c.into_owned());
        if let Some(pg) = db.try_downcast_ref::<PgDatabaseError>() {
            diag.detail = pg.detail().map(str::to_string);
            diag.position = pg.position().map(|p| match p {
                PgErrorPosition::Original(pos) => pos.to_string(),
                PgErrorPosition::Internal { position, query } => {
                    format!("{} in internal query {}", position, query)
                }
            });
            diag.table = pg.table().map(str::to_string);
            diag.where_clause = pg.r#where().map(str::to_string);
        }
        diag
    }
}

fn db_err(err: sqlx::Error) -> DatabaseError {
    PostgresClassifier.database_error(&err)
}

/// Postgres backend over an sqlx pool
pub struct PostgresBackend {
    pool: PgPool,
    table: String,
}

impl PostgresBackend {
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            table: crate::DEFAULT_VERSION_TABLE.to_string(),
        }
    }

    /// Connect to `url`, retrying while the server comes up
    pub async fn connect(url: &str) -> MigrateResult<Self> {
        let pool = connect_with_retry(PgPoolOptions::new(), url).await?;
        Ok(Self::from_pool(pool))
    }

    /// Recreate `schema` from scratch and connect with every pooled
    /// connection's `search_path` set to it.
    ///
    /// Meant for tests: each run gets an empty, isolated schema.
    pub async fn connect_in_schema(url: &str, schema: &str) -> MigrateResult<Self> {
        validate_identifier(schema)?;

        let admin = connect_with_retry(PgPoolOptions::new().max_connections(1), url).await?;
        admin
            .execute(
                format!(
                    "DROP SCHEMA IF EXISTS {schema} CASCADE; CREATE SCHEMA {schema};",
                    schema = schema
                )
                .as_str(),
            )
            .await
            .map_err(|e| MigrateError::Connect(db_err(e)))?;
        admin.close().await;

        let search_path = format!("SET search_path TO {}", schema);
        let options = PgPoolOptions::new().after_connect(move |conn, _meta| {
            let search_path = search_path.clone();
            Box::pin(async move {
                conn.execute(search_path.as_str()).await?;
                Ok(())
            })
        });
        let pool = connect_with_retry(options, url).await?;
        tracing::debug!("Connected with search_path {}", schema);
        Ok(Self::from_pool(pool))
    }

    /// Track the version in `table` instead of the default
    pub fn with_version_table(mut self, table: impl Into<String>) -> MigrateResult<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        self.table = table;
        Ok(self)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn connect_with_retry(options: PgPoolOptions, url: &str) -> MigrateResult<PgPool> {
    let mut attempt = 1;
    loop {
        match options.clone().connect(url).await {
            Ok(pool) => return Ok(pool),
            Err(err @ (sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)) if attempt < CONNECT_ATTEMPTS => {
                tracing::debug!("Postgres not ready (attempt {}): {}", attempt, err);
                attempt += 1;
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(err) => return Err(MigrateError::Connect(db_err(err))),
        }
    }
}

#[async_trait]
impl MigrationBackend for PostgresBackend {
    fn version_table(&self) -> &str {
        &self.table
    }

    async fn read_version(&self) -> Result<i64, DatabaseError> {
        let sql = format!("SELECT version FROM {}", self.table);
        sqlx::query_scalar::<_, i32>(sql.as_str())
            .fetch_one(&self.pool)
            .await
            .map(i64::from)
            .map_err(db_err)
    }

    async fn create_version_table(&self) -> Result<(), DatabaseError> {
        let sql = format!(
            "CREATE TABLE {table} (version int primary key);
             INSERT INTO {table} (version) VALUES (0);",
            table = self.table
        );
        self.pool
            .execute(sql.as_str())
            .await
            .map(|_| ())
            .map_err(db_err)
    }

    async fn begin(&self) -> Result<Box<dyn StepTransaction>, DatabaseError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PostgresTransaction {
            tx,
            table: self.table.clone(),
        }))
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    table: String,
}

#[async_trait]
impl StepTransaction for PostgresTransaction {
    async fn execute_batch(&mut self, sql: &str) -> Result<(), DatabaseError> {
        // a plain &str goes through the simple query protocol, which
        // accepts several statements
        (&mut *self.tx)
            .execute(sql)
            .await
            .map(|_| ())
            .map_err(db_err)
    }

    async fn write_version(&mut self, version: u32) -> Result<(), DatabaseError> {
        let version = i32::try_from(version)
            .map_err(|_| DatabaseError::other(format!("version {} does not fit an int column", version)))?;
        let sql = format!("UPDATE {} SET version = $1", self.table);
        sqlx::query(sql.as_str())
            .bind(version)
            .execute(&mut *self.tx)
            .await
            .map(|_| ())
            .map_err(db_err)
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.commit().await.map_err(db_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.rollback().await.map_err(db_err)
    }
}
