use async_trait::async_trait;
use kiln_core::repository::{CertificateRepository, Store};
use kiln_core::well_known::{GLOBAL_ROOT_CERTIFICATE_ID, GLOBAL_TENANT_ID};
use kiln_core::{AppContext, Diagnostics, KilnResult};

use crate::worker::{BootstrapEnv, MigrationWorker, Outcome, ignore_missing};

/// Mints the global root CA.
pub struct RootCertificateMigration;

#[async_trait]
impl<S: Store> MigrationWorker<S> for RootCertificateMigration {
    fn name(&self) -> &'static str {
        "RootCertificateMigration"
    }

    fn description(&self) -> &'static str {
        "Generates the global root certificate"
    }

    fn version(&self) -> u32 {
        1
    }

    async fn up(
        &self,
        ctx: &AppContext,
        env: &BootstrapEnv<S>,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<Outcome> {
        match ctx.run(env.store.certificates().get_root()).await {
            Ok(_) => return Ok(Outcome::Skipped),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        env.certificates.ensure_root(ctx, diagnostics).await?;
        Ok(Outcome::Applied)
    }

    async fn down(
        &self,
        ctx: &AppContext,
        env: &BootstrapEnv<S>,
        _diagnostics: &mut Diagnostics,
    ) -> KilnResult<()> {
        ignore_missing(
            ctx.run(
                env.store
                    .certificates()
                    .delete(GLOBAL_TENANT_ID, GLOBAL_ROOT_CERTIFICATE_ID),
            )
            .await,
        )
    }
}
