use std::collections::BTreeSet;

use async_trait::async_trait;
use kiln_core::access::{AccessLevel, PrivilegeOrder, SecurityLevel};
use kiln_core::catalog::SystemCatalog;
use kiln_core::models::claim::{ClaimPattern, UNIVERSAL_CLAIM, UpsertClaim};
use kiln_core::models::role::default_roles;
use kiln_core::repository::{ClaimRepository, RoleRepository, Store};
use kiln_core::{AppContext, Diagnostics, KilnResult};
use tracing::info;

use crate::worker::{BootstrapEnv, MigrationWorker, Outcome, ignore_missing};

/// Materializes every catalog claim and grants each default role the
/// default claims of its level.
pub struct DefaultClaimsMigration;

/// Lowest security level whose default action covers `action`.
fn level_for(action: AccessLevel) -> SecurityLevel {
    SecurityLevel::ALL
        .iter()
        .rev()
        .copied()
        .find(|level| level.default_access_level().can_access(action))
        .unwrap_or(SecurityLevel::Admin)
}

fn system_claim(pattern: ClaimPattern) -> UpsertClaim {
    let security_level = if pattern.is_universal() {
        SecurityLevel::Superuser
    } else {
        level_for(pattern.action())
    };
    UpsertClaim {
        tenant_id: None,
        pattern,
        security_level,
    }
}

/// Slugs of every global claim `up` writes.
fn seeded_slugs(catalog: &SystemCatalog) -> BTreeSet<String> {
    let mut slugs: BTreeSet<String> = catalog
        .generate_system_claims()
        .iter()
        .map(ClaimPattern::slug)
        .collect();
    for role in default_roles() {
        slugs.extend(
            catalog
                .generate_default_claims(role.security_level)
                .into_iter()
                .map(|generated| generated.pattern.slug()),
        );
    }
    slugs
}

#[async_trait]
impl<S: Store> MigrationWorker<S> for DefaultClaimsMigration {
    fn name(&self) -> &'static str {
        "DefaultClaimsMigration"
    }

    fn description(&self) -> &'static str {
        "Creates the system claims and attaches role defaults"
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
            .run(env.store.claims().get_by_slug(None, UNIVERSAL_CLAIM))
            .await
        {
            Ok(_) => return Ok(Outcome::Skipped),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let system = env.catalog.generate_system_claims();
        let count = system.len();
        for pattern in system {
            ctx.run(env.store.claims().upsert(system_claim(pattern)))
                .await?;
        }

        for role in default_roles() {
            let Some(role_id) = role.id else { continue };
            for generated in env.catalog.generate_default_claims(role.security_level) {
                let claim = ctx
                    .run(env.store.claims().upsert(system_claim(generated.pattern)))
                    .await?;
                ctx.run(env.store.roles().attach_claim(role_id, claim.id))
                    .await?;
            }
        }

        info!(claims = count, "Created system claims");
        Ok(Outcome::Applied)
    }

    async fn down(
        &self,
        ctx: &AppContext,
        env: &BootstrapEnv<S>,
        _diagnostics: &mut Diagnostics,
    ) -> KilnResult<()> {
        for slug in seeded_slugs(&env.catalog) {
            let claim = match ctx.run(env.store.claims().get_by_slug(None, &slug)).await {
                Ok(claim) => claim,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            ignore_missing(ctx.run(env.store.claims().delete(claim.id)).await)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_land_at_the_lowest_level_that_grants_them() {
        assert_eq!(level_for(AccessLevel::View), SecurityLevel::Guest);
        assert_eq!(level_for(AccessLevel::Read), SecurityLevel::Auditor);
        assert_eq!(level_for(AccessLevel::Write), SecurityLevel::Manager);
        assert_eq!(level_for(AccessLevel::Delete), SecurityLevel::Manager);
        assert_eq!(level_for(AccessLevel::All), SecurityLevel::Admin);
        assert_eq!(
            system_claim(ClaimPattern::universal()).security_level,
            SecurityLevel::Superuser
        );
    }

    #[test]
    fn seeded_slugs_cover_role_defaults_but_not_arbitrary_wildcards() {
        let catalog = SystemCatalog::default_blueprint();
        let slugs = seeded_slugs(&catalog);
        assert!(slugs.contains(UNIVERSAL_CLAIM));
        assert!(slugs.contains("pki::certificates::write"));
        assert!(!slugs.contains("docker::containers::*"));
    }
}
