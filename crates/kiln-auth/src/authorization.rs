//! Claim-based authorization.
//!
//! A principal's effective claims are resolved from the store on every
//! call; the decision itself is a pure function of that snapshot.

use chrono::Utc;
use kiln_core::access::{PrivilegeOrder, SecurityLevel};
use kiln_core::models::claim::ClaimPattern;
use kiln_core::repository::{ApiKeyRepository, RoleRepository, Store, UserRepository};
use kiln_core::{AppContext, KilnError, KilnResult};
use tracing::debug;
use uuid::Uuid;

use crate::principal::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }

    /// `Deny` as an authorization error.
    pub fn ensure(self, what: &str) -> KilnResult<()> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny => Err(KilnError::AuthorizationDenied {
                reason: format!("missing {what}"),
            }),
        }
    }
}

/// A claim demanded by an operation, optionally bound to a tenant.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub claim: ClaimPattern,
    pub tenant_id: Option<Uuid>,
}

impl Requirement {
    pub fn new(claim: ClaimPattern) -> Self {
        Self {
            claim,
            tenant_id: None,
        }
    }

    pub fn in_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}

/// Minimum role level plus claims that must all be authorized.
#[derive(Debug, Clone)]
pub struct SecurityRequirement {
    pub security_level: SecurityLevel,
    pub required_claims: Vec<ClaimPattern>,
}

/// Claims and privilege of a principal at one point in time.
#[derive(Debug, Clone)]
pub struct ResolvedPrincipal {
    pub principal: Principal,
    pub claims: Vec<ClaimPattern>,
    /// Holds a role with `is_super_user` or security level superuser.
    pub superuser_role: bool,
    /// Highest security level among the principal's roles.
    pub security_level: Option<SecurityLevel>,
}

impl ResolvedPrincipal {
    /// No claims, no roles.
    pub fn empty(principal: Principal) -> Self {
        Self {
            principal,
            claims: Vec::new(),
            superuser_role: false,
            security_level: None,
        }
    }

    pub fn system() -> Self {
        Self {
            principal: Principal::System,
            claims: vec![ClaimPattern::universal()],
            superuser_role: true,
            security_level: Some(SecurityLevel::Superuser),
        }
    }

    pub fn is_superuser(&self) -> bool {
        self.superuser_role || self.claims.iter().any(ClaimPattern::is_universal)
    }

    fn in_scope(&self, tenant_id: Option<Uuid>) -> bool {
        tenant_id.is_none_or(|t| t == self.principal.tenant_id()) || self.is_superuser()
    }

    pub fn decide(&self, required: &Requirement) -> Decision {
        if !self.in_scope(required.tenant_id) {
            return Decision::Deny;
        }
        if self.is_superuser() || self.claims.iter().any(|c| c.can_access(&required.claim)) {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }

    /// Whether a credential minted by this principal in `tenant_id` may
    /// carry `claim`. Every delegated claim must be covered by one the
    /// principal holds itself.
    pub fn can_delegate(&self, claim: &ClaimPattern, tenant_id: Uuid) -> bool {
        if !self.in_scope(Some(tenant_id)) {
            return false;
        }
        self.is_superuser() || self.claims.iter().any(|held| held.covers(claim))
    }

    /// Whether this principal may mint a credential at `level`. Only
    /// superusers mint superuser credentials.
    pub fn can_delegate_level(&self, level: SecurityLevel) -> bool {
        if self.is_superuser() {
            return true;
        }
        level != SecurityLevel::Superuser
            && self.security_level.is_some_and(|own| own.satisfies(level))
    }

    pub fn satisfies(&self, requirement: &SecurityRequirement, tenant_id: Option<Uuid>) -> Decision {
        if self.is_superuser() {
            return Decision::Allow;
        }
        if !self.in_scope(tenant_id) {
            return Decision::Deny;
        }
        let level_ok = self
            .security_level
            .is_some_and(|level| level.satisfies(requirement.security_level));
        let claims_ok = requirement.required_claims.iter().all(|claim| {
            self.decide(&Requirement {
                claim: claim.clone(),
                tenant_id,
            })
            .is_allowed()
        });
        if level_ok && claims_ok {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Resolves principals against the store and decides access.
#[derive(Clone)]
pub struct Authorizer<S: Store> {
    store: S,
}

impl<S: Store> Authorizer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Effective claims of `principal`. Unknown, blocked or inactive
    /// principals resolve to nothing.
    pub async fn resolve(
        &self,
        ctx: &AppContext,
        principal: Principal,
    ) -> KilnResult<ResolvedPrincipal> {
        match principal {
            Principal::System => Ok(ResolvedPrincipal::system()),
            Principal::User { tenant_id, user_id } => {
                let user = match ctx.run(self.store.users().get_by_id(tenant_id, user_id)).await {
                    Ok(user) => user,
                    Err(err) if err.is_not_found() => return Ok(ResolvedPrincipal::empty(principal)),
                    Err(err) => return Err(err),
                };
                if !user.is_enabled() {
                    debug!(user_id = %user_id, "Disabled user resolves to no claims");
                    return Ok(ResolvedPrincipal::empty(principal));
                }

                let claims = ctx
                    .run(self.store.users().get_user_claims(tenant_id, user_id))
                    .await?;
                ctx.check()?;
                let roles = ctx.run(self.store.roles().get_by_ids(&user.roles)).await?;

                Ok(ResolvedPrincipal {
                    principal,
                    claims: claims
                        .iter()
                        .filter_map(|claim| claim.pattern().ok())
                        .collect(),
                    superuser_role: roles.iter().any(|role| role.grants_superuser()),
                    security_level: roles
                        .iter()
                        .map(|role| role.security_level)
                        .min_by_key(|level| level.index()),
                })
            }
            Principal::ApiKey { tenant_id, key_id } => {
                let key = match ctx.run(self.store.api_keys().get_by_id(tenant_id, key_id)).await
                {
                    Ok(key) => key,
                    Err(err) if err.is_not_found() => return Ok(ResolvedPrincipal::empty(principal)),
                    Err(err) => return Err(err),
                };
                if !key.is_usable(Utc::now()) {
                    return Ok(ResolvedPrincipal::empty(principal));
                }
                Ok(ResolvedPrincipal {
                    principal,
                    claims: key.claims,
                    superuser_role: false,
                    security_level: Some(key.security_level.security_level()),
                })
            }
        }
    }

    pub async fn authorize(
        &self,
        ctx: &AppContext,
        principal: Principal,
        required: &Requirement,
    ) -> KilnResult<Decision> {
        let resolved = self.resolve(ctx, principal).await?;
        let decision = resolved.decide(required);
        debug!(
            principal = %principal,
            required = %required.claim,
            allowed = decision.is_allowed(),
            "Authorization decision"
        );
        Ok(decision)
    }

    pub async fn check(
        &self,
        ctx: &AppContext,
        principal: Principal,
        requirement: &SecurityRequirement,
        tenant_id: Option<Uuid>,
    ) -> KilnResult<Decision> {
        let resolved = self.resolve(ctx, principal).await?;
        Ok(resolved.satisfies(requirement, tenant_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(slug: &str) -> ClaimPattern {
        ClaimPattern::parse(slug).unwrap()
    }

    fn user(tenant_id: Uuid, claims: &[&str]) -> ResolvedPrincipal {
        ResolvedPrincipal {
            principal: Principal::User {
                tenant_id,
                user_id: Uuid::new_v4(),
            },
            claims: claims.iter().map(|c| claim(c)).collect(),
            superuser_role: false,
            security_level: Some(SecurityLevel::Manager),
        }
    }

    #[test]
    fn higher_action_grants_lower_action() {
        let t = Uuid::new_v4();
        let p = user(t, &["user::api::write"]);
        assert!(p.decide(&Requirement::new(claim("user::api::read"))).is_allowed());
        assert!(p.decide(&Requirement::new(claim("user::api::delete"))).is_allowed());
        assert!(!p.decide(&Requirement::new(claim("user::api::*"))).is_allowed());
        assert!(!p.decide(&Requirement::new(claim("admin::api::read"))).is_allowed());

        let reader = user(t, &["user::api::read"]);
        assert!(!reader.decide(&Requirement::new(claim("user::api::write"))).is_allowed());
    }

    #[test]
    fn tenant_mismatch_denies_unless_superuser() {
        let t = Uuid::new_v4();
        let other = Uuid::new_v4();
        let p = user(t, &["pki::certificates::*"]);
        let required = Requirement::new(claim("pki::certificates::read"));
        assert!(p.decide(&required.clone().in_tenant(t)).is_allowed());
        assert!(!p.decide(&required.clone().in_tenant(other)).is_allowed());

        let mut su = user(t, &[]);
        su.superuser_role = true;
        assert!(su.decide(&required.in_tenant(other)).is_allowed());
    }

    #[test]
    fn universal_claim_is_superuser() {
        let p = user(Uuid::new_v4(), &["*::*::*"]);
        assert!(p.is_superuser());
        assert!(
            p.decide(&Requirement::new(claim("docker::containers::delete")).in_tenant(Uuid::new_v4()))
                .is_allowed()
        );
        assert!(ResolvedPrincipal::system().is_superuser());
    }

    #[test]
    fn empty_principal_is_denied() {
        let p = ResolvedPrincipal::empty(Principal::ApiKey {
            tenant_id: Uuid::new_v4(),
            key_id: Uuid::new_v4(),
        });
        assert_eq!(
            p.decide(&Requirement::new(claim("user::api::view"))),
            Decision::Deny
        );
        assert!(Decision::Deny.ensure("user::api::view").is_err());
    }

    #[test]
    fn delegation_stays_within_own_claims_and_level() {
        let t = Uuid::new_v4();
        let manager = user(t, &["identity::api_keys::write", "pki::certificates::write"]);

        assert!(manager.can_delegate(&claim("pki::certificates::read"), t));
        assert!(manager.can_delegate(&claim("identity::api_keys::create"), t));
        assert!(!manager.can_delegate(&claim("pki::certificates::*"), t));
        assert!(!manager.can_delegate(&claim("*::*::read"), t));
        assert!(!manager.can_delegate(&ClaimPattern::universal(), t));
        assert!(!manager.can_delegate(&claim("identity::users::read"), t));
        assert!(!manager.can_delegate(&claim("pki::certificates::read"), Uuid::new_v4()));

        assert!(manager.can_delegate_level(SecurityLevel::Manager));
        assert!(manager.can_delegate_level(SecurityLevel::User));
        assert!(!manager.can_delegate_level(SecurityLevel::Admin));
        assert!(!manager.can_delegate_level(SecurityLevel::Superuser));

        let mut su = user(t, &[]);
        su.superuser_role = true;
        assert!(su.can_delegate(&ClaimPattern::universal(), Uuid::new_v4()));
        assert!(su.can_delegate_level(SecurityLevel::Superuser));
        assert!(!ResolvedPrincipal::empty(manager.principal).can_delegate_level(SecurityLevel::None));
    }

    #[test]
    fn security_requirement_needs_level_and_every_claim() {
        let t = Uuid::new_v4();
        let p = user(t, &["user::api::write", "pki::certificates::read"]);

        let ok = SecurityRequirement {
            security_level: SecurityLevel::User,
            required_claims: vec![claim("user::api::read"), claim("pki::certificates::view")],
        };
        assert!(p.satisfies(&ok, Some(t)).is_allowed());

        let too_high = SecurityRequirement {
            security_level: SecurityLevel::Admin,
            required_claims: vec![],
        };
        assert!(!p.satisfies(&too_high, Some(t)).is_allowed());

        let missing = SecurityRequirement {
            security_level: SecurityLevel::User,
            required_claims: vec![claim("user::api::read"), claim("pki::certificates::write")],
        };
        assert!(!p.satisfies(&missing, None).is_allowed());

        let mut su = user(t, &[]);
        su.superuser_role = true;
        su.security_level = None;
        assert!(su.satisfies(&too_high, Some(Uuid::new_v4())).is_allowed());
    }
}
