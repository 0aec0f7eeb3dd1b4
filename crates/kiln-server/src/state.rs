//! Shared services handed to every request.

use std::sync::Arc;
use std::time::Duration;

use kiln_auth::{ApiKeyService, AuthService, Authorizer};
use kiln_bootstrap::{BootstrapConfig, BootstrapEngine, BootstrapEnv, BootstrapFailure, BootstrapReport};
use kiln_core::catalog::SystemCatalog;
use kiln_core::{AppContext, Diagnostics, KilnError, KilnResult};
use kiln_db::{DbManager, SurrealStore};
use kiln_pki::CertificateService;
use surrealdb::engine::any::Any;
use tracing::{info, warn};

use crate::config::ServerConfig;

pub type KilnStore = SurrealStore<Any>;

pub struct AppState {
    pub store: KilnStore,
    pub catalog: Arc<SystemCatalog>,
    pub certificates: CertificateService<KilnStore>,
    pub auth: AuthService<KilnStore>,
    pub api_keys: ApiKeyService<KilnStore>,
    pub authorizer: Authorizer<KilnStore>,
    request_timeout: Duration,
    bootstrap: BootstrapConfig,
}

impl AppState {
    /// Connect to the database, apply schema migrations and wire the
    /// services.
    pub async fn connect(config: &ServerConfig, catalog: Arc<SystemCatalog>) -> KilnResult<Self> {
        let auth_config = config
            .auth
            .to_auth_config()
            .map_err(|e| KilnError::validation(e.to_string()))?;

        let db = DbManager::connect(&config.database).await?.into_client();
        kiln_db::run_migrations(&db).await?;
        let store = match &auth_config.pepper {
            Some(pepper) => SurrealStore::with_pepper(db, pepper.clone()),
            None => SurrealStore::new(db),
        };

        let mut certificates = CertificateService::new(store.clone(), config.certificate.clone());
        if let Some(path) = &config.storage.path {
            info!(path = %path.display(), "Mirroring certificates to disk");
            certificates = certificates.with_storage(path);
        }

        Ok(Self {
            certificates,
            auth: AuthService::new(store.clone(), auth_config.clone()),
            api_keys: ApiKeyService::new(store.clone(), catalog.clone(), auth_config),
            authorizer: Authorizer::new(store.clone()),
            catalog,
            store,
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            bootstrap: config.bootstrap(),
        })
    }

    /// Context for one request.
    pub fn context(&self) -> AppContext {
        AppContext::with_timeout(self.request_timeout)
    }

    /// Seed the global tenant, roles, claims, root certificate and root
    /// user. Whatever a failed run applied is rolled back.
    pub async fn bootstrap(
        &self,
        ctx: &AppContext,
        diagnostics: &mut Diagnostics,
    ) -> Result<BootstrapReport, BootstrapFailure> {
        let engine = BootstrapEngine::new(BootstrapEnv {
            store: self.store.clone(),
            catalog: self.catalog.clone(),
            certificates: self.certificates.clone(),
            config: self.bootstrap.clone(),
        });

        match engine.run(ctx, diagnostics).await {
            Ok(report) => Ok(report),
            Err(failure) => {
                if let Err(err) = engine.rollback(ctx, &failure.applied, diagnostics).await {
                    warn!(error = %err, "Bootstrap rollback incomplete");
                }
                Err(failure)
            }
        }
    }
}
