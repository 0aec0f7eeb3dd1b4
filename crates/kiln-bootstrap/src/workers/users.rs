use async_trait::async_trait;
use kiln_core::models::tenant::UpdateTenant;
use kiln_core::models::user::{CreateUser, UserStatus};
use kiln_core::repository::{ClaimRepository, Pagination, Store, TenantRepository, UserRepository};
use kiln_core::well_known::{
    DEFAULT_SUPERUSER_USER_ID, GLOBAL_TENANT_DOMAIN, GLOBAL_TENANT_ID, SUPERUSER_ROLE_ID,
};
use kiln_core::{AppContext, Diagnostics, KilnError, KilnResult};
use tracing::info;

use crate::worker::{BootstrapEnv, MigrationWorker, Outcome, ignore_missing};

/// Creates the root user and makes it the global tenant's owner.
pub struct DefaultUsersMigration;

#[async_trait]
impl<S: Store> MigrationWorker<S> for DefaultUsersMigration {
    fn name(&self) -> &'static str {
        "DefaultUsersMigration"
    }

    fn description(&self) -> &'static str {
        "Creates the root user"
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
        match ctx
            .run(env.store.users().get_by_id(GLOBAL_TENANT_ID, DEFAULT_SUPERUSER_USER_ID))
            .await
        {
            Ok(_) => return Ok(Outcome::Skipped),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let root = &env.config.root_user;
        if root.username.trim().is_empty() || root.password.is_empty() {
            return Err(KilnError::validation(
                "rootUser.username and rootUser.password must be set",
            ));
        }

        let claims = ctx
            .run(env.store.claims().list(None, Pagination::all()))
            .await?;
        let user = ctx
            .run(env.store.users().create(CreateUser {
                id: Some(DEFAULT_SUPERUSER_USER_ID),
                tenant_id: GLOBAL_TENANT_ID,
                username: root.username.clone(),
                name: "Root".into(),
                email: root
                    .email
                    .clone()
                    .unwrap_or_else(|| format!("{}@{GLOBAL_TENANT_DOMAIN}", root.username)),
                password: root.password.clone(),
                roles: vec![SUPERUSER_ROLE_ID],
                claims: claims.items.iter().map(|claim| claim.id).collect(),
                status: Some(UserStatus::Active),
                metadata: None,
                created_by: None,
            }))
            .await?;

        ctx.run(env.store.tenants().update(
            GLOBAL_TENANT_ID,
            UpdateTenant {
                owner_id: Some(Some(user.id)),
                ..Default::default()
            },
        ))
        .await?;

        info!(user_id = %user.id, username = %user.username, "Created root user");
        Ok(Outcome::Applied)
    }

    async fn down(
        &self,
        ctx: &AppContext,
        env: &BootstrapEnv<S>,
        _diagnostics: &mut Diagnostics,
    ) -> KilnResult<()> {
        let cleared = ctx
            .run(env.store.tenants().update(
                GLOBAL_TENANT_ID,
                UpdateTenant {
                    owner_id: Some(None),
                    ..Default::default()
                },
            ))
            .await
            .map(|_| ());
        ignore_missing(cleared)?;
        ignore_missing(
            ctx.run(
                env.store
                    .users()
                    .delete(GLOBAL_TENANT_ID, DEFAULT_SUPERUSER_USER_ID),
            )
            .await,
        )
    }
}
