//! The unit of bootstrap work.

use std::sync::Arc;

use async_trait::async_trait;
use kiln_core::catalog::SystemCatalog;
use kiln_core::repository::Store;
use kiln_core::{AppContext, Diagnostics, KilnResult};
use kiln_pki::CertificateService;

use crate::config::BootstrapConfig;

/// Path entry left by a worker that found its output already in place.
pub const SKIPPED_PATH_ENTRY: &str = "already exists, skipping";

/// What `up` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped,
}

/// Everything a worker may touch.
#[derive(Clone)]
pub struct BootstrapEnv<S: Store> {
    pub store: S,
    pub catalog: Arc<SystemCatalog>,
    pub certificates: CertificateService<S>,
    pub config: BootstrapConfig,
}

/// A named, versioned, idempotent seeding step.
///
/// `up` runs inside a store transaction. `down` removes only the rows the
/// worker owns and tolerates their absence.
#[async_trait]
pub trait MigrationWorker<S: Store>: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn version(&self) -> u32;

    async fn up(
        &self,
        ctx: &AppContext,
        env: &BootstrapEnv<S>,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<Outcome>;

    async fn down(
        &self,
        ctx: &AppContext,
        env: &BootstrapEnv<S>,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<()>;
}

/// `Ok(())` for results whose only failure is "already gone".
pub(crate) fn ignore_missing(result: KilnResult<()>) -> KilnResult<()> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}
