//! Migration runner
//!
//! Moves a backend's schema from its persisted version to a target version
//! one numbered step at a time. Each step runs in its own transaction
//! together with the version update, so the persisted version always
//! matches the last committed step.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlstep_core::{DirectorySource, MigrationSource, Plan, Step, Target};
use tokio_util::sync::CancellationToken;

use crate::error::{MigrateError, MigrateResult};
use crate::observer::{MigrationObserver, TracingObserver};
use crate::traits::{MigrationBackend, StepTransaction};
use crate::version::VersionStore;

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub from: u32,
    pub to: u32,
    /// Applied steps, in execution order
    pub applied: Vec<Step>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }

    /// Numbers of the applied entries, in execution order
    pub fn applied_numbers(&self) -> Vec<u32> {
        self.applied.iter().map(|s| s.number).collect()
    }
}

/// Applies migrations from a source to a backend
pub struct MigrationRunner<B, S> {
    backend: B,
    source: S,
    observer: Arc<dyn MigrationObserver>,
}

impl<B, S> MigrationRunner<B, S>
where
    B: MigrationBackend,
    S: MigrationSource,
{
    /// Create a runner reporting through `tracing`
    pub fn new(backend: B, source: S) -> Self {
        Self {
            backend,
            source,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn MigrationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Read (or bootstrap) the current version, load the source and plan
    /// the steps to `target` without applying any of them
    pub async fn plan(&self, target: Target) -> MigrateResult<Plan> {
        let current = VersionStore::new(&self.backend).get_or_bootstrap().await?;
        let set = sqlstep_core::load(&self.source).await?;
        let to = target.resolve(set.max_number())?;
        Ok(Plan::between(&set, current, to)?)
    }

    /// Plan the steps to `target` without writing anything.
    ///
    /// Unlike [`plan`](Self::plan) a missing version table is not created;
    /// the plan then starts from version 0.
    pub async fn preview(&self, target: Target) -> MigrateResult<Plan> {
        let current = VersionStore::new(&self.backend)
            .current()
            .await?
            .unwrap_or(0);
        let set = sqlstep_core::load(&self.source).await?;
        let to = target.resolve(set.max_number())?;
        Ok(Plan::between(&set, current, to)?)
    }

    /// Run to `target`
    pub async fn run(&self, target: Target) -> MigrateResult<RunReport> {
        self.run_until_cancelled(target, &CancellationToken::new())
            .await
    }

    /// Run to `target`, stopping before the next step once `cancel` fires.
    ///
    /// A step that has already started always runs to commit or rollback.
    pub async fn run_until_cancelled(
        &self,
        target: Target,
        cancel: &CancellationToken,
    ) -> MigrateResult<RunReport> {
        let started_at = Utc::now();
        let plan = self.plan(target).await?;
        self.observer.plan(&plan);

        let mut version = plan.from;
        let mut applied = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            if cancel.is_cancelled() {
                tracing::warn!("Migration cancelled at version {}", version);
                return Err(MigrateError::Cancelled { version });
            }

            self.observer.step_started(step);
            if let Err(err) = self.apply_step(step).await {
                self.observer.step_failed(step, &err);
                return Err(err);
            }
            self.observer.step_applied(step);

            version = step.version_after;
            applied.push(step.clone());
        }

        Ok(RunReport {
            from: plan.from,
            to: version,
            applied,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn apply_step(&self, step: &Step) -> MigrateResult<()> {
        let sql = self.source.fetch(&step.name).await?;

        let mut tx = self
            .backend
            .begin()
            .await
            .map_err(|source| MigrateError::Begin {
                name: step.name.clone(),
                source,
            })?;

        if let Err(source) = tx.execute_batch(&sql).await {
            rollback(tx, &step.name).await;
            return Err(MigrateError::Execution {
                name: step.name.clone(),
                source,
            });
        }

        if let Err(err) = VersionStore::set_version(tx.as_mut(), step.version_after).await {
            rollback(tx, &step.name).await;
            return Err(err);
        }

        tx.commit().await.map_err(|source| MigrateError::Commit {
            name: step.name.clone(),
            source,
        })
    }
}

async fn rollback(tx: Box<dyn StepTransaction>, name: &str) {
    if let Err(err) = tx.rollback().await {
        tracing::warn!("Rollback of {} failed: {}", name, err);
    }
}

/// Migrate the schema behind `backend` using the entries in
/// `migrations_dir`. A `target` of `-1` means the latest migration.
pub async fn migrate_database<B>(
    cancel: &CancellationToken,
    backend: &B,
    migrations_dir: impl AsRef<Path>,
    target: i64,
) -> MigrateResult<RunReport>
where
    B: MigrationBackend + ?Sized,
{
    let target = Target::from_raw(target)?;
    MigrationRunner::new(backend, DirectorySource::new(migrations_dir.as_ref()))
        .run_until_cancelled(target, cancel)
        .await
}
