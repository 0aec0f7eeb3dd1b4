use async_trait::async_trait;
use kiln_core::models::tenant::CreateTenant;
use kiln_core::repository::{Store, TenantRepository};
use kiln_core::well_known::{
    GLOBAL_TENANT_DOMAIN, GLOBAL_TENANT_ID, GLOBAL_TENANT_NAME, GLOBAL_TENANT_SLUG,
};
use kiln_core::{AppContext, Diagnostics, KilnResult};
use tracing::info;

use crate::worker::{BootstrapEnv, MigrationWorker, Outcome, ignore_missing};

/// Creates the global tenant under its well-known id.
pub struct DefaultTenantMigration;

#[async_trait]
impl<S: Store> MigrationWorker<S> for DefaultTenantMigration {
    fn name(&self) -> &'static str {
        "DefaultTenantMigration"
    }

    fn description(&self) -> &'static str {
        "Creates the global tenant"
    }

    fn version(&self) -> u32 {
        1
    }

    async fn up(
        &self,
        ctx: &AppContext,
        env: &BootstrapEnv<S>,
        _diagnostics: &mut Diagnostics,
    ) -> KilnResult<Outcome> {
        match ctx.run(env.store.tenants().get_by_id(GLOBAL_TENANT_ID)).await {
            Ok(_) => return Ok(Outcome::Skipped),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        ctx.run(env.store.tenants().create(CreateTenant {
            id: Some(GLOBAL_TENANT_ID),
            slug: GLOBAL_TENANT_SLUG.into(),
            name: GLOBAL_TENANT_NAME.into(),
            domain: GLOBAL_TENANT_DOMAIN.into(),
            contact_email: None,
            require_2fa: false,
            metadata: None,
            created_by: None,
        }))
        .await?;
        info!(tenant_id = %GLOBAL_TENANT_ID, "Created global tenant");
        Ok(Outcome::Applied)
    }

    async fn down(
        &self,
        ctx: &AppContext,
        env: &BootstrapEnv<S>,
        _diagnostics: &mut Diagnostics,
    ) -> KilnResult<()> {
        ignore_missing(ctx.run(env.store.tenants().delete(GLOBAL_TENANT_ID)).await)
    }
}
