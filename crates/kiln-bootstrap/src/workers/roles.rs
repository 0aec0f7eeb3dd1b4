use async_trait::async_trait;
use kiln_core::models::role::default_roles;
use kiln_core::repository::{RoleRepository, Store};
use kiln_core::well_known::SUPERUSER_ROLE_ID;
use kiln_core::{AppContext, Diagnostics, KilnResult};
use tracing::info;

use crate::worker::{BootstrapEnv, MigrationWorker, Outcome, ignore_missing};

/// Creates the seven default roles, one per security level.
pub struct DefaultRolesMigration;

#[async_trait]
impl<S: Store> MigrationWorker<S> for DefaultRolesMigration {
    fn name(&self) -> &'static str {
        "DefaultRolesMigration"
    }

    fn description(&self) -> &'static str {
        "Creates the default roles"
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
        match ctx.run(env.store.roles().get_by_id(SUPERUSER_ROLE_ID)).await {
            Ok(_) => return Ok(Outcome::Skipped),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        for role in default_roles() {
            let role = ctx.run(env.store.roles().create(role)).await?;
            info!(role = %role.slug, "Created default role");
        }
        Ok(Outcome::Applied)
    }

    async fn down(
        &self,
        ctx: &AppContext,
        env: &BootstrapEnv<S>,
        _diagnostics: &mut Diagnostics,
    ) -> KilnResult<()> {
        for role in default_roles() {
            if let Some(id) = role.id {
                ignore_missing(ctx.run(env.store.roles().delete(id)).await)?;
            }
        }
        Ok(())
    }
}
