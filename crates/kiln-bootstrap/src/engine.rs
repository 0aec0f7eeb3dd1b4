//! Runs bootstrap workers in order and records their versions.

use kiln_core::repository::{MigrationRepository, Store};
use kiln_core::{AppContext, Diagnostics, KilnError, KilnResult};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::worker::{BootstrapEnv, MigrationWorker, Outcome, SKIPPED_PATH_ENTRY};
use crate::workers::default_workers;

const MODULE: &str = "bootstrap";

/// Workers that ran in a successful pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub applied: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

/// A worker failed; the ones before it stay applied until rolled back.
#[derive(Debug, Error)]
#[error("bootstrap worker {worker} failed: {source}")]
pub struct BootstrapFailure {
    pub worker: &'static str,
    #[source]
    pub source: KilnError,
    /// Workers that applied changes earlier in the same run.
    pub applied: Vec<&'static str>,
}

impl From<BootstrapFailure> for KilnError {
    fn from(failure: BootstrapFailure) -> Self {
        failure.source
    }
}

pub struct BootstrapEngine<S: Store> {
    env: BootstrapEnv<S>,
    workers: Vec<Box<dyn MigrationWorker<S>>>,
}

impl<S: Store> BootstrapEngine<S> {
    /// Engine with the five default workers.
    pub fn new(env: BootstrapEnv<S>) -> Self {
        Self::with_workers(env, default_workers())
    }

    pub fn with_workers(env: BootstrapEnv<S>, workers: Vec<Box<dyn MigrationWorker<S>>>) -> Self {
        Self { env, workers }
    }

    pub fn worker_names(&self) -> Vec<&'static str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    async fn apply(
        &self,
        ctx: &AppContext,
        worker: &dyn MigrationWorker<S>,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<Outcome> {
        ctx.check()?;
        // Checked before each store call; a started write always finishes.
        let ctx = &ctx.shielded();
        let store = &self.env.store;
        let env = &self.env;
        store
            .with_transaction(move || async move {
                let outcome = worker.up(ctx, env, diagnostics).await?;
                let recorded = ctx
                    .run(env.store.migrations().applied_version(worker.name()))
                    .await?;
                if recorded.is_none_or(|record| record.version != worker.version()) {
                    ctx.run(env.store.migrations().record(worker.name(), worker.version()))
                        .await?;
                }
                Ok(outcome)
            })
            .await
    }

    /// Apply every worker in order, stopping at the first failure.
    ///
    /// `diagnostics` receives one child node per worker that ran.
    pub async fn run(
        &self,
        ctx: &AppContext,
        diagnostics: &mut Diagnostics,
    ) -> Result<BootstrapReport, BootstrapFailure> {
        let mut report = BootstrapReport::default();

        for worker in &self.workers {
            let name = worker.name();
            let mut node = Diagnostics::new(name);
            let result = self.apply(ctx, worker.as_ref(), &mut node).await;

            match result {
                Ok(Outcome::Skipped) => {
                    node.add_path_entry_with_metadata(
                        SKIPPED_PATH_ENTRY,
                        MODULE,
                        serde_json::json!({ "worker": name, "version": worker.version() }),
                    );
                    info!(worker = name, "Already exists, skipping");
                    report.skipped.push(name);
                }
                Ok(Outcome::Applied) => {
                    node.add_path_entry_with_metadata(
                        "applied",
                        MODULE,
                        serde_json::json!({ "worker": name, "version": worker.version() }),
                    );
                    info!(worker = name, version = worker.version(), "Applied bootstrap worker");
                    report.applied.push(name);
                }
                Err(err) => {
                    node.record(MODULE, &err);
                    node.complete();
                    diagnostics.append(node);
                    error!(worker = name, error = %err, "Bootstrap worker failed");
                    return Err(BootstrapFailure {
                        worker: name,
                        source: err,
                        applied: report.applied,
                    });
                }
            }
            node.complete();
            diagnostics.append(node);
        }

        Ok(report)
    }

    /// Revert the named workers in reverse order and forget their
    /// recorded versions. Every worker is attempted; the first error is
    /// returned.
    pub async fn rollback(
        &self,
        ctx: &AppContext,
        workers: &[&str],
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<()> {
        let mut first_error = None;

        for worker in self.workers.iter().rev() {
            let name = worker.name();
            if !workers.contains(&name) {
                continue;
            }
            let mut node = Diagnostics::new(format!("{name} down"));
            let ctx = &ctx.shielded();
            let env = &self.env;
            let sub = &mut node;
            let result = env
                .store
                .with_transaction(move || async move {
                    worker.down(ctx, env, sub).await?;
                    ctx.run(env.store.migrations().remove(name)).await
                })
                .await;

            match result {
                Ok(()) => {
                    node.add_path_entry(format!("reverted {name}"), MODULE);
                    info!(worker = name, "Reverted bootstrap worker");
                }
                Err(err) => {
                    warn!(worker = name, error = %err, "Failed to revert bootstrap worker");
                    node.record(MODULE, &err);
                    first_error.get_or_insert(err);
                }
            }
            node.complete();
            diagnostics.append(node);
        }

        first_error.map_or(Ok(()), Err)
    }
}
