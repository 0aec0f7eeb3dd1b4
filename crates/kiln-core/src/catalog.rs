//! System catalog: the registry of services, their modules and the actions
//! each module allows.
//!
//! The catalog validates claims and synthesizes default claim sets for
//! security levels. It is built once at startup, shared through an `Arc`,
//! and optionally installed into a process-wide registry.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::access::{AccessLevel, PrivilegeOrder, SecurityLevel};
use crate::error::{KilnError, KilnResult};
use crate::models::claim::{ClaimPattern, WILDCARD};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub name: String,
    pub description: String,
    pub allowed_actions: Vec<AccessLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub description: String,
    pub modules: Vec<ModuleDefinition>,
}

impl ServiceDefinition {
    pub fn module(&self, name: &str) -> Option<&ModuleDefinition> {
        self.modules.iter().find(|m| m.name == name)
    }
}

/// A claim synthesized for a security level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedClaim {
    pub pattern: ClaimPattern,
    pub security_level: SecurityLevel,
}

#[derive(Debug, Clone, Default)]
pub struct SystemCatalog {
    services: Vec<ServiceDefinition>,
}

impl SystemCatalog {
    pub fn new(services: impl IntoIterator<Item = ServiceDefinition>) -> Self {
        let mut catalog = Self::default();
        for service in services {
            catalog.add_service(service);
        }
        catalog
    }

    /// Register a service, replacing any existing one with the same name.
    pub fn add_service(&mut self, service: ServiceDefinition) {
        match self.services.iter_mut().find(|s| s.name == service.name) {
            Some(existing) => *existing = service,
            None => self.services.push(service),
        }
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn services(&self) -> &[ServiceDefinition] {
        &self.services
    }

    /// Check a claim against the catalog. Wildcard segments skip the lookup.
    pub fn validate_claim(&self, claim: &ClaimPattern) -> KilnResult<()> {
        if claim.service() == WILDCARD {
            return Ok(());
        }
        let service = self
            .service(claim.service())
            .ok_or_else(|| KilnError::UnknownService(claim.service().to_string()))?;
        if claim.module() == WILDCARD {
            return Ok(());
        }
        let module = service
            .module(claim.module())
            .ok_or_else(|| KilnError::UnknownModule {
                service: service.name.clone(),
                module: claim.module().to_string(),
            })?;
        if claim.action() == AccessLevel::All || module.allowed_actions.contains(&claim.action())
        {
            return Ok(());
        }
        Err(KilnError::DisallowedAction {
            service: service.name.clone(),
            module: module.name.clone(),
            action: claim.action().to_string(),
        })
    }

    /// Every `(service, module, allowed action)` plus `*::*::*`.
    pub fn generate_system_claims(&self) -> Vec<ClaimPattern> {
        let mut claims = Vec::new();
        for service in &self.services {
            for module in &service.modules {
                for &action in &module.allowed_actions {
                    if let Ok(claim) =
                        ClaimPattern::new(service.name.clone(), module.name.clone(), action)
                    {
                        claims.push(claim);
                    }
                }
            }
        }
        claims.push(ClaimPattern::universal());
        claims
    }

    /// Default claim set for a security level.
    ///
    /// `superuser` gets exactly `*::*::*`. Other levels get one claim per
    /// module: the level's default action if the module allows it,
    /// otherwise the highest action the module allows. A level whose
    /// default is `none` gets nothing for modules that do not list `none`.
    pub fn generate_default_claims(&self, level: SecurityLevel) -> Vec<GeneratedClaim> {
        if level == SecurityLevel::Superuser {
            return vec![GeneratedClaim {
                pattern: ClaimPattern::universal(),
                security_level: level,
            }];
        }

        let default_action = level.default_access_level();
        let mut claims = Vec::new();
        for service in &self.services {
            for module in &service.modules {
                let action = if module.allowed_actions.contains(&default_action) {
                    Some(default_action)
                } else if default_action == AccessLevel::None {
                    None
                } else {
                    highest(&module.allowed_actions)
                };
                let Some(action) = action else { continue };
                if let Ok(pattern) =
                    ClaimPattern::new(service.name.clone(), module.name.clone(), action)
                {
                    claims.push(GeneratedClaim {
                        pattern,
                        security_level: level,
                    });
                }
            }
        }
        claims
    }

    /// The control plane's own services.
    pub fn default_blueprint() -> Self {
        use AccessLevel::*;

        let module = |name: &str, description: &str, actions: &[AccessLevel]| ModuleDefinition {
            name: name.to_string(),
            description: description.to_string(),
            allowed_actions: actions.to_vec(),
        };
        let service = |name: &str, description: &str, modules: Vec<ModuleDefinition>| {
            ServiceDefinition {
                name: name.to_string(),
                description: description.to_string(),
                modules,
            }
        };
        let crud = [Write, Update, Create, Delete, Read, View];

        Self::new([
            service(
                "identity",
                "Tenants, users, roles, claims and API keys",
                vec![
                    module(
                        "tenants",
                        "Tenant lifecycle",
                        &[Write, Update, Create, Delete, Suspend, Resume, Read, View],
                    ),
                    module(
                        "users",
                        "User accounts",
                        &[Write, Update, Create, Delete, Lock, Unlock, Reset, Read, View],
                    ),
                    module("roles", "Role definitions", &crud),
                    module("claims", "Claim definitions", &crud),
                    module(
                        "api_keys",
                        "API key issuance",
                        &[Write, Create, Delete, Revoke, Read, View],
                    ),
                ],
            ),
            service(
                "pki",
                "Certificate authority",
                vec![
                    module(
                        "certificates",
                        "Certificate issuance",
                        &[Write, Create, Revoke, Audit, Read, View],
                    ),
                    module("trust", "OS trust store", &[Write, Create, Delete, Read, View]),
                ],
            ),
            service(
                "docker",
                "Container runtime",
                vec![
                    module("containers", "Containers", &[Write, Create, Delete, Read, View]),
                    module("images", "Images", &[Write, Create, Delete, Read, View]),
                ],
            ),
            service(
                "proxy",
                "Reverse proxy",
                vec![module("routes", "Proxy routes", &crud)],
            ),
            service(
                "infrastructure",
                "Infrastructure provisioning",
                vec![module(
                    "stacks",
                    "Provisioned stacks",
                    &[Write, Create, Delete, Approve, Reject, Cancel, Read, View],
                )],
            ),
            service(
                "git",
                "Source repositories",
                vec![module("repositories", "Repositories", &crud)],
            ),
        ])
    }
}

fn highest(actions: &[AccessLevel]) -> Option<AccessLevel> {
    actions
        .iter()
        .copied()
        .reduce(|best, candidate| {
            if candidate.is_higher_than(best) {
                candidate
            } else {
                best
            }
        })
}

static GLOBAL_CATALOG: OnceLock<Arc<SystemCatalog>> = OnceLock::new();

/// Install the process-wide catalog. Fails if one is already installed.
pub fn install_global(catalog: Arc<SystemCatalog>) -> KilnResult<()> {
    GLOBAL_CATALOG
        .set(catalog)
        .map_err(|_| KilnError::Internal("system catalog already installed".into()))
}

/// The process-wide catalog, if installed.
pub fn global() -> KilnResult<Arc<SystemCatalog>> {
    GLOBAL_CATALOG
        .get()
        .cloned()
        .ok_or_else(|| KilnError::Internal("system catalog not installed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_api_catalog() -> SystemCatalog {
        SystemCatalog::new([ServiceDefinition {
            name: "user".into(),
            description: String::new(),
            modules: vec![ModuleDefinition {
                name: "api".into(),
                description: String::new(),
                allowed_actions: vec![AccessLevel::Read, AccessLevel::Write, AccessLevel::Delete],
            }],
        }])
    }

    #[test]
    fn manager_gets_write_on_user_api() {
        let claims = user_api_catalog().generate_default_claims(SecurityLevel::Manager);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].pattern.slug(), "user::api::write");
        assert_eq!(claims[0].security_level, SecurityLevel::Manager);
    }

    #[test]
    fn superuser_gets_only_universal_claim() {
        for catalog in [SystemCatalog::default(), SystemCatalog::default_blueprint()] {
            let claims = catalog.generate_default_claims(SecurityLevel::Superuser);
            assert_eq!(claims.len(), 1);
            assert_eq!(claims[0].pattern.slug(), "*::*::*");
            assert_eq!(claims[0].security_level, SecurityLevel::Superuser);
        }
    }

    #[test]
    fn disallowed_default_falls_back_to_highest_allowed() {
        // admin defaults to `*`, which the module does not list.
        let claims = user_api_catalog().generate_default_claims(SecurityLevel::Admin);
        assert_eq!(claims[0].pattern.slug(), "user::api::write");
        let guest = user_api_catalog().generate_default_claims(SecurityLevel::Guest);
        assert_eq!(guest[0].pattern.slug(), "user::api::write");
    }

    #[test]
    fn none_level_emits_nothing_without_none_action() {
        assert!(
            user_api_catalog()
                .generate_default_claims(SecurityLevel::None)
                .is_empty()
        );
    }

    #[test]
    fn validate_reports_each_failure() {
        let catalog = user_api_catalog();
        let parse = |s: &str| ClaimPattern::parse(s).unwrap();
        assert!(catalog.validate_claim(&parse("user::api::read")).is_ok());
        assert!(catalog.validate_claim(&parse("*::anything::read")).is_ok());
        assert!(catalog.validate_claim(&parse("user::*::approve")).is_ok());
        assert!(matches!(
            catalog.validate_claim(&parse("docker::api::read")),
            Err(KilnError::UnknownService(_))
        ));
        assert!(matches!(
            catalog.validate_claim(&parse("user::web::read")),
            Err(KilnError::UnknownModule { .. })
        ));
        assert!(matches!(
            catalog.validate_claim(&parse("user::api::approve")),
            Err(KilnError::DisallowedAction { .. })
        ));
    }

    #[test]
    fn system_claims_cover_every_action_and_round_trip() {
        let catalog = SystemCatalog::default_blueprint();
        let claims = catalog.generate_system_claims();
        let expected: usize = catalog
            .services()
            .iter()
            .flat_map(|s| &s.modules)
            .map(|m| m.allowed_actions.len())
            .sum();
        assert_eq!(claims.len(), expected + 1);
        assert!(claims.iter().any(ClaimPattern::is_universal));
        for claim in &claims {
            catalog.validate_claim(claim).unwrap();
            assert_eq!(ClaimPattern::parse(&claim.slug()).unwrap().slug(), claim.slug());
        }
    }

    #[test]
    fn add_service_replaces_by_name() {
        let mut catalog = user_api_catalog();
        catalog.add_service(ServiceDefinition {
            name: "user".into(),
            description: "replaced".into(),
            modules: vec![],
        });
        assert_eq!(catalog.services().len(), 1);
        assert_eq!(catalog.service("user").unwrap().description, "replaced");
    }

    #[test]
    fn global_registry_installs_once() {
        let catalog = Arc::new(SystemCatalog::default_blueprint());
        if global().is_err() {
            install_global(Arc::clone(&catalog)).unwrap();
        }
        assert!(global().is_ok());
        assert!(install_global(catalog).is_err());
    }
}
