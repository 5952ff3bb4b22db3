//! Run observers
//!
//! The runner reports its plan and every step through a
//! [`MigrationObserver`] supplied at construction time.

use sqlstep_core::{Plan, Step};

use crate::error::MigrateError;

/// Receives progress events from a [`MigrationRunner`](crate::MigrationRunner)
pub trait MigrationObserver: Send + Sync {
    fn plan(&self, _plan: &Plan) {}

    fn step_started(&self, _step: &Step) {}

    fn step_applied(&self, _step: &Step) {}

    fn step_failed(&self, _step: &Step, _error: &MigrateError) {}
}

/// Ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MigrationObserver for NoopObserver {}

/// Reports events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl MigrationObserver for TracingObserver {
    fn plan(&self, plan: &Plan) {
        if plan.is_empty() {
            tracing::debug!("Schema already at version {}", plan.from);
        } else {
            tracing::info!(
                "Migrate from {} to {} ({} steps)",
                plan.from,
                plan.to,
                plan.steps.len()
            );
        }
    }

    fn step_started(&self, step: &Step) {
        tracing::debug!("File: {}", step.name);
    }

    fn step_applied(&self, step: &Step) {
        tracing::info!("Applied {} (version {})", step.name, step.version_after);
    }

    fn step_failed(&self, step: &Step, error: &MigrateError) {
        let Some(diag) = error.diagnostics() else {
            tracing::error!("Migration {} failed: {}", step.name, error);
            return;
        };

        tracing::error!("Database error in {}: {}", step.name, diag.message);
        if let Some(code) = &diag.code {
            tracing::error!("Code: {}", code);
        }
        if let Some(detail) = &diag.detail {
            tracing::error!("Detail: {}", detail);
        }
        if let Some(position) = &diag.position {
            tracing::error!("Position: {}", position);
        }
        if let Some(table) = &diag.table {
            tracing::error!("Table: {}", table);
        }
        if let Some(where_clause) = &diag.where_clause {
            tracing::error!("Where: {}", where_clause);
        }
    }
}
