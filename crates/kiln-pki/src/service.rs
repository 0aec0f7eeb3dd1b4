//! Issuance backed by the identity store.
//!
//! The global root lives in the global tenant under a well-known id. Each
//! tenant gets at most one intermediate, created the first time the
//! tenant issues an end-entity certificate.

use std::path::PathBuf;
use std::sync::Arc;

use kiln_core::models::certificate::{
    Certificate, CertificateConfig, CertificateFilter, CertificateType,
};
use kiln_core::repository::{
    CertificateRepository, PaginatedResult, Pagination, Store, TenantRepository,
};
use kiln_core::well_known::{
    GLOBAL_ROOT_CERTIFICATE_ID, GLOBAL_ROOT_CERTIFICATE_SLUG, GLOBAL_TENANT_ID,
};
use kiln_core::{AppContext, Diagnostics, KilnError, KilnResult};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::certificate::{
    CertificateMaterial, CertificateOps, EndEntityCertificate, IntermediateCertificate,
    RootCertificate, X509Certificate, slugify,
};
use crate::serial::{Serial, SerialRegistry};

const MODULE: &str = "pki";
const SERIAL_ATTEMPTS: usize = 8;

pub const ROOT_COMMON_NAME: &str = "Kiln Root CA";
pub const DEFAULT_ROOT_YEARS: u32 = 10;
pub const DEFAULT_INTERMEDIATE_YEARS: u32 = 5;
pub const DEFAULT_END_ENTITY_YEARS: u32 = 1;

/// Input of [`CertificateService::issue_end_entity`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IssueCertificate {
    pub name: String,
    pub slug: Option<String>,
    #[serde(flatten)]
    pub config: CertificateConfig,
}

/// Certificate issuance and lookup.
#[derive(Clone)]
pub struct CertificateService<S: Store> {
    store: S,
    defaults: CertificateConfig,
    storage: Option<PathBuf>,
    serials: Arc<SerialRegistry>,
}

impl<S: Store> CertificateService<S> {
    /// `defaults` fills blank subject fields, key size, algorithm and
    /// lifetime of everything this service issues.
    pub fn new(store: S, defaults: CertificateConfig) -> Self {
        Self {
            store,
            defaults,
            storage: None,
            serials: Arc::new(SerialRegistry::new()),
        }
    }

    /// Also write every issued certificate under `storage`.
    pub fn with_storage(mut self, storage: impl Into<PathBuf>) -> Self {
        self.storage = Some(storage.into());
        self
    }

    pub fn defaults(&self) -> &CertificateConfig {
        &self.defaults
    }

    fn configure(&self, config: CertificateConfig, fallback_years: u32) -> CertificateConfig {
        let mut config = config.with_defaults(&self.defaults);
        if config.expires_in_years == 0 {
            config.expires_in_years = fallback_years;
        }
        config
    }

    /// A serial neither drawn by this process nor present in the store.
    async fn unique_serial(&self, ctx: &AppContext) -> KilnResult<Serial> {
        for _ in 0..SERIAL_ATTEMPTS {
            let serial = self.serials.draw();
            let hex = serial.to_hex();
            if !ctx.run(self.store.certificates().serial_exists(&hex)).await? {
                return Ok(serial);
            }
            debug!(serial = %hex, "Serial already stored, drawing again");
        }
        Err(KilnError::Internal(format!(
            "no unused serial after {SERIAL_ATTEMPTS} attempts"
        )))
    }

    /// Key generation is CPU bound; run it off the async workers.
    async fn generate<C>(
        &self,
        ctx: &AppContext,
        name: String,
        config: CertificateConfig,
        issuer: Option<X509Certificate>,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<C>
    where
        C: CertificateOps + Send + 'static,
    {
        let serial = self.unique_serial(ctx).await?;
        ctx.check()?;
        let (result, sub) = tokio::task::spawn_blocking(move || {
            let mut sub = Diagnostics::new(format!("generate {}", C::KIND));
            let result = C::generate(&name, config, issuer.as_ref(), &serial, &mut sub);
            sub.complete();
            (result, sub)
        })
        .await
        .map_err(|e| KilnError::Internal(format!("certificate generation task failed: {e}")))?;
        diagnostics.append(sub);
        diagnostics.capture(MODULE, result)
    }

    fn save(&self, certificate: &impl CertificateOps, diagnostics: &mut Diagnostics) {
        let Some(storage) = &self.storage else {
            return;
        };
        match certificate.save_to_file(storage) {
            Ok(files) => diagnostics.add_path_entry_with_metadata(
                "saved-to-file",
                MODULE,
                serde_json::json!({ "path": files.certificate.display().to_string() }),
            ),
            Err(err) => {
                warn!(error = %err, "Failed to write certificate files");
                diagnostics.record(MODULE, &err);
            }
        }
    }

    async fn persist(
        &self,
        ctx: &AppContext,
        material: &CertificateMaterial,
        kind: CertificateType,
        tenant_id: Uuid,
        id: Option<Uuid>,
    ) -> KilnResult<Certificate> {
        let input = material.to_create(kind, tenant_id, id)?;
        ctx.run(self.store.certificates().create(input)).await
    }

    /// The global root, generated on first use.
    pub async fn ensure_root(
        &self,
        ctx: &AppContext,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<Certificate> {
        match ctx.run(self.store.certificates().get_root()).await {
            Ok(root) => return Ok(root),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let mut config = self.configure(CertificateConfig::default(), DEFAULT_ROOT_YEARS);
        if config.common_name.trim().is_empty() {
            config.common_name = ROOT_COMMON_NAME.into();
        }
        let root: RootCertificate = self
            .generate(ctx, ROOT_COMMON_NAME.into(), config, None, diagnostics)
            .await?;
        let mut material = root.into_material();
        material.slug = GLOBAL_ROOT_CERTIFICATE_SLUG.into();

        let stored = match self
            .persist(
                ctx,
                &material,
                CertificateType::Root,
                GLOBAL_TENANT_ID,
                Some(GLOBAL_ROOT_CERTIFICATE_ID),
            )
            .await
        {
            Ok(stored) => stored,
            // Lost a race with another issuer.
            Err(err) if err.is_conflict() => {
                return ctx.run(self.store.certificates().get_root()).await;
            }
            Err(err) => {
                diagnostics.record(MODULE, &err);
                return Err(err);
            }
        };
        self.save(&RootCertificate::from_material(material), diagnostics);
        info!(serial = %stored.serial_number, "Created global root certificate");
        Ok(stored)
    }

    /// The tenant's intermediate, generated on first use.
    pub async fn ensure_intermediate(
        &self,
        ctx: &AppContext,
        tenant_id: Uuid,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<Certificate> {
        if tenant_id == GLOBAL_TENANT_ID {
            return Err(KilnError::validation(
                "the global tenant is served by the root certificate",
            ));
        }
        let existing = ctx
            .run(
                self.store
                    .certificates()
                    .get_by_type(tenant_id, CertificateType::Intermediate),
            )
            .await?;
        if let Some(intermediate) = existing.into_iter().next() {
            return Ok(intermediate);
        }

        let tenant = ctx.run(self.store.tenants().get_by_id(tenant_id)).await?;
        let root = self.ensure_root(ctx, diagnostics).await?;
        let issuer = X509Certificate::from_database(&root)?;

        let mut config = self.configure(
            CertificateConfig {
                common_name: format!("{} Intermediate CA", tenant.name),
                ..Default::default()
            },
            DEFAULT_INTERMEDIATE_YEARS,
        );
        config.root_certificate_id = Some(root.id);

        let name = config.common_name.clone();
        let intermediate: IntermediateCertificate = self
            .generate(ctx, name, config, Some(issuer), diagnostics)
            .await?;
        let mut material = intermediate.into_material();
        material.slug = format!("{}-intermediate-ca", tenant.slug);

        let stored = match self
            .persist(ctx, &material, CertificateType::Intermediate, tenant_id, None)
            .await
        {
            Ok(stored) => stored,
            Err(err) if err.is_conflict() => {
                let existing = ctx
                    .run(
                        self.store
                            .certificates()
                            .get_by_type(tenant_id, CertificateType::Intermediate),
                    )
                    .await?;
                return existing.into_iter().next().ok_or(err);
            }
            Err(err) => {
                diagnostics.record(MODULE, &err);
                return Err(err);
            }
        };
        self.save(&IntermediateCertificate::from_material(material), diagnostics);
        info!(tenant_id = %tenant_id, serial = %stored.serial_number, "Created tenant intermediate certificate");
        Ok(stored)
    }

    /// Issue a server certificate signed by the tenant's intermediate.
    pub async fn issue_end_entity(
        &self,
        ctx: &AppContext,
        tenant_id: Uuid,
        request: IssueCertificate,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<Certificate> {
        let mut config = self.configure(request.config, DEFAULT_END_ENTITY_YEARS);
        if config.common_name.trim().is_empty() {
            match config.fqdns.first() {
                Some(fqdn) => config.common_name = fqdn.clone(),
                None => return Err(KilnError::validation("commonName or fqdns is required")),
            }
        }
        let name = if request.name.trim().is_empty() {
            config.common_name.clone()
        } else {
            request.name.trim().to_string()
        };
        let slug = match request.slug.as_deref().map(slugify) {
            Some(slug) if !slug.is_empty() => slug,
            _ => slugify(&name),
        };
        match ctx
            .run(self.store.certificates().get_by_slug(tenant_id, &slug))
            .await
        {
            Ok(_) => return Err(KilnError::already_exists("certificate", &slug)),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let intermediate = self.ensure_intermediate(ctx, tenant_id, diagnostics).await?;
        config.root_certificate_id = intermediate.config.root_certificate_id;
        config.intermediate_certificate_id = Some(intermediate.id);
        let issuer = X509Certificate::from_database(&intermediate)?;

        let certificate: EndEntityCertificate = self
            .generate(ctx, name, config, Some(issuer), diagnostics)
            .await?;
        let mut material = certificate.into_material();
        material.slug = slug;

        let stored = self
            .persist(ctx, &material, CertificateType::EndEntity, tenant_id, None)
            .await;
        let stored = diagnostics.capture(MODULE, stored)?;
        self.save(&EndEntityCertificate::from_material(material), diagnostics);
        info!(
            tenant_id = %tenant_id,
            certificate_id = %stored.id,
            common_name = %stored.config.common_name,
            "Issued end-entity certificate"
        );
        Ok(stored)
    }

    /// Look up by id, or by slug when `id_or_slug` is not a UUID.
    pub async fn get(
        &self,
        ctx: &AppContext,
        tenant_id: Uuid,
        id_or_slug: &str,
    ) -> KilnResult<Certificate> {
        let certificates = self.store.certificates();
        match Uuid::parse_str(id_or_slug) {
            Ok(id) => ctx.run(certificates.get_by_id(tenant_id, id)).await,
            Err(_) => ctx.run(certificates.get_by_slug(tenant_id, id_or_slug)).await,
        }
    }

    pub async fn list(
        &self,
        ctx: &AppContext,
        filter: CertificateFilter,
        pagination: Pagination,
    ) -> KilnResult<PaginatedResult<Certificate>> {
        ctx.run(self.store.certificates().list(filter, pagination))
            .await
    }
}
