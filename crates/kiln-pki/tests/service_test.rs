//! Integration tests for [`CertificateService`] against in-memory SurrealDB.

use kiln_core::models::certificate::{
    CertificateConfig, CertificateFilter, CertificateType, SignatureAlgorithm,
};
use kiln_core::models::tenant::CreateTenant;
use kiln_core::repository::{Pagination, Store, TenantRepository};
use kiln_core::well_known::{GLOBAL_ROOT_CERTIFICATE_ID, GLOBAL_TENANT_ID};
use kiln_core::{AppContext, Diagnostics};
use kiln_db::SurrealStore;
use kiln_pki::{CertificateService, IssueCertificate, verify_pem_chain};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> (SurrealStore<Db>, CertificateService<SurrealStore<Db>>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    kiln_db::run_migrations(&db).await.unwrap();
    let store = SurrealStore::new(db);
    let defaults = CertificateConfig {
        country: "US".into(),
        organization: "Kiln".into(),
        ..Default::default()
    };
    let service = CertificateService::new(store.clone(), defaults);
    (store, service)
}

async fn create_tenant(store: &SurrealStore<Db>, slug: &str) -> Uuid {
    store
        .tenants()
        .create(CreateTenant {
            id: None,
            slug: slug.into(),
            name: slug.to_uppercase(),
            domain: format!("{slug}.local"),
            contact_email: None,
            require_2fa: false,
            metadata: None,
            created_by: None,
        })
        .await
        .unwrap()
        .id
}

fn request(common_name: &str) -> IssueCertificate {
    IssueCertificate {
        config: CertificateConfig {
            common_name: common_name.into(),
            fqdns: vec![common_name.into()],
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn ensure_root_is_idempotent() {
    let (_store, service) = setup().await;
    let ctx = AppContext::background();
    let mut diag = Diagnostics::new("root");

    let first = service.ensure_root(&ctx, &mut diag).await.unwrap();
    assert_eq!(first.id, GLOBAL_ROOT_CERTIFICATE_ID);
    assert_eq!(first.tenant_id, GLOBAL_TENANT_ID);
    assert_eq!(first.slug, "global-root-ca");
    assert_eq!(first.config.common_name, "Kiln Root CA");
    assert_eq!(first.config.organization, "Kiln");
    assert_eq!(first.config.expires_in_years, 10);

    let second = service.ensure_root(&ctx, &mut diag).await.unwrap();
    assert_eq!(second.serial_number, first.serial_number);
    assert!(!diag.has_errors());
}

#[tokio::test]
async fn first_issue_creates_the_intermediate_on_demand() {
    let (store, service) = setup().await;
    let ctx = AppContext::background();
    let tenant_id = create_tenant(&store, "t1").await;
    let mut diag = Diagnostics::new("issue");

    let leaf = service
        .issue_end_entity(&ctx, tenant_id, request("api.t1.local"), &mut diag)
        .await
        .unwrap();
    assert_eq!(leaf.certificate_type, CertificateType::EndEntity);
    assert_eq!(leaf.slug, "api-t1-local");
    assert_eq!(leaf.config.root_certificate_id, Some(GLOBAL_ROOT_CERTIFICATE_ID));

    let intermediate = service
        .ensure_intermediate(&ctx, tenant_id, &mut diag)
        .await
        .unwrap();
    assert_eq!(leaf.config.intermediate_certificate_id, Some(intermediate.id));
    assert_eq!(intermediate.slug, "t1-intermediate-ca");
    assert_eq!(intermediate.config.common_name, "T1 Intermediate CA");
    assert_eq!(
        intermediate.config.root_certificate_id,
        Some(GLOBAL_ROOT_CERTIFICATE_ID)
    );

    // Everything needed to verify comes from the rows.
    let root = service.ensure_root(&ctx, &mut diag).await.unwrap();
    verify_pem_chain(&leaf.pem_certificate, &root.pem_certificate).unwrap();
    verify_pem_chain(&intermediate.pem_certificate, &root.pem_certificate).unwrap();

    // A second issuance reuses the intermediate.
    service
        .issue_end_entity(&ctx, tenant_id, request("web.t1.local"), &mut diag)
        .await
        .unwrap();
    let intermediates = service
        .list(
            &ctx,
            CertificateFilter {
                tenant_id: Some(tenant_id),
                certificate_type: Some(CertificateType::Intermediate),
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(intermediates.total, 1);
    assert!(!diag.has_errors());
}

#[tokio::test]
async fn issue_validates_and_rejects_duplicates() {
    let (store, service) = setup().await;
    let ctx = AppContext::background();
    let tenant_id = create_tenant(&store, "t2").await;
    let mut diag = Diagnostics::new("issue");

    let err = service
        .issue_end_entity(&ctx, tenant_id, IssueCertificate::default(), &mut diag)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation_failed");

    let mut named = request("db.t2.local");
    named.name = "Database".into();
    named.config.signature_algorithm = SignatureAlgorithm::Sha384;
    let created = service
        .issue_end_entity(&ctx, tenant_id, named.clone(), &mut diag)
        .await
        .unwrap();
    assert_eq!(created.name, "Database");
    assert_eq!(created.slug, "database");

    let err = service
        .issue_end_entity(&ctx, tenant_id, named, &mut diag)
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let by_slug = service.get(&ctx, tenant_id, "database").await.unwrap();
    let by_id = service
        .get(&ctx, tenant_id, &created.id.to_string())
        .await
        .unwrap();
    assert_eq!(by_slug.id, by_id.id);

    // Tenant scoping applies to lookups.
    let other = create_tenant(&store, "t3").await;
    assert!(
        service
            .get(&ctx, other, "database")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn unknown_tenant_and_global_tenant_are_refused() {
    let (_store, service) = setup().await;
    let ctx = AppContext::background();
    let mut diag = Diagnostics::new("issue");

    let err = service
        .issue_end_entity(&ctx, Uuid::new_v4(), request("x.local"), &mut diag)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = service
        .ensure_intermediate(&ctx, GLOBAL_TENANT_ID, &mut diag)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation_failed");
}

#[tokio::test]
async fn storage_receives_issued_files() {
    let (store, service) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let service = service.with_storage(dir.path());
    let ctx = AppContext::background();
    let tenant_id = create_tenant(&store, "t4").await;
    let mut diag = Diagnostics::new("issue");

    service
        .issue_end_entity(&ctx, tenant_id, request("api.t4.local"), &mut diag)
        .await
        .unwrap();

    let certificates = dir.path().join("certificates");
    assert!(certificates.join("root_ca_Kiln_Root_CA.crt").exists());
    assert!(certificates.join("intermediate_ca_T4_Intermediate_CA.key").exists());
    assert!(certificates.join("certificate_api.t4.local.csr").exists());
    assert!(
        diag.path_entries()
            .iter()
            .filter(|entry| entry.id == "saved-to-file")
            .count()
            == 3
    );
}

#[tokio::test]
async fn cancelled_context_stops_issuance() {
    let (store, service) = setup().await;
    let tenant_id = create_tenant(&store, "t5").await;
    let ctx = AppContext::background();
    ctx.cancel();
    let mut diag = Diagnostics::new("issue");

    let err = service
        .issue_end_entity(&ctx, tenant_id, request("api.t5.local"), &mut diag)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "cancelled");
}
