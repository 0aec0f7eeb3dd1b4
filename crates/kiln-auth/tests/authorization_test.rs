//! Authorization against claims resolved from the store.

use std::sync::Arc;

use kiln_auth::api_key::{ApiKeyService, NewApiKey};
use kiln_auth::authorization::{Authorizer, Requirement, ResolvedPrincipal, SecurityRequirement};
use kiln_auth::{AuthConfig, Principal};
use kiln_core::access::{ApiKeySecurityLevel, SecurityLevel};
use kiln_core::catalog::SystemCatalog;
use kiln_core::models::claim::{ClaimPattern, UpsertClaim};
use kiln_core::models::role::CreateRole;
use kiln_core::models::tenant::CreateTenant;
use kiln_core::models::user::{CreateUser, UpdateUser};
use kiln_core::repository::{
    ApiKeyRepository, ClaimRepository, RoleRepository, Store, TenantRepository, UserRepository,
};
use kiln_core::AppContext;
use kiln_db::SurrealStore;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn store() -> SurrealStore<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    kiln_db::run_migrations(&db).await.unwrap();
    SurrealStore::new(db)
}

async fn tenant(store: &SurrealStore<Db>, slug: &str) -> Uuid {
    store
        .tenants()
        .create(CreateTenant {
            id: None,
            slug: slug.into(),
            name: slug.into(),
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

async fn user(store: &SurrealStore<Db>, tenant_id: Uuid, roles: Vec<Uuid>, claims: Vec<Uuid>) -> Uuid {
    store
        .users()
        .create(CreateUser {
            id: None,
            tenant_id,
            username: "bob".into(),
            name: "Bob".into(),
            email: "bob@example.com".into(),
            password: "correct-horse-battery".into(),
            roles,
            claims,
            status: None,
            metadata: None,
            created_by: None,
        })
        .await
        .unwrap()
        .id
}

async fn claim(store: &SurrealStore<Db>, slug: &str, level: SecurityLevel) -> Uuid {
    store
        .claims()
        .upsert(UpsertClaim {
            tenant_id: None,
            pattern: ClaimPattern::parse(slug).unwrap(),
            security_level: level,
        })
        .await
        .unwrap()
        .id
}

async fn role(store: &SurrealStore<Db>, slug: &str, level: SecurityLevel, claims: Vec<Uuid>) -> Uuid {
    store
        .roles()
        .create(CreateRole {
            id: None,
            slug: slug.into(),
            name: slug.into(),
            description: String::new(),
            security_level: level,
            is_super_user: false,
            claims,
        })
        .await
        .unwrap()
        .id
}

fn required(slug: &str) -> Requirement {
    Requirement::new(ClaimPattern::parse(slug).unwrap())
}

#[tokio::test]
async fn role_and_direct_claims_are_merged() {
    let store = store().await;
    let ctx = AppContext::background();
    let t = tenant(&store, "t1").await;

    let write = claim(&store, "pki::certificates::write", SecurityLevel::Manager).await;
    let trust = claim(&store, "pki::trust::read", SecurityLevel::User).await;
    let manager = role(&store, "cert-manager", SecurityLevel::Manager, vec![write]).await;
    let user_id = user(&store, t, vec![manager], vec![trust]).await;

    let authz = Authorizer::new(store.clone());
    let principal = Principal::User {
        tenant_id: t,
        user_id,
    };

    for (slug, allowed) in [
        ("pki::certificates::read", true),
        ("pki::certificates::create", true),
        ("pki::certificates::revoke", true),
        ("pki::certificates::*", false),
        ("pki::trust::view", true),
        ("pki::trust::write", false),
        ("identity::users::read", false),
    ] {
        let decision = authz.authorize(&ctx, principal, &required(slug)).await.unwrap();
        assert_eq!(decision.is_allowed(), allowed, "{slug}");
    }

    let resolved = authz.resolve(&ctx, principal).await.unwrap();
    assert_eq!(resolved.security_level, Some(SecurityLevel::Manager));
    assert!(!resolved.is_superuser());

    let requirement = SecurityRequirement {
        security_level: SecurityLevel::User,
        required_claims: vec![ClaimPattern::parse("pki::certificates::read").unwrap()],
    };
    assert!(
        authz
            .check(&ctx, principal, &requirement, Some(t))
            .await
            .unwrap()
            .is_allowed()
    );
    assert!(
        !authz
            .check(&ctx, principal, &requirement, Some(Uuid::new_v4()))
            .await
            .unwrap()
            .is_allowed()
    );
}

#[tokio::test]
async fn blocked_user_resolves_to_nothing() {
    let store = store().await;
    let ctx = AppContext::background();
    let t = tenant(&store, "t2").await;
    let read = claim(&store, "pki::certificates::read", SecurityLevel::User).await;
    let user_id = user(&store, t, vec![], vec![read]).await;
    let principal = Principal::User {
        tenant_id: t,
        user_id,
    };
    let authz = Authorizer::new(store.clone());

    assert!(
        authz
            .authorize(&ctx, principal, &required("pki::certificates::read"))
            .await
            .unwrap()
            .is_allowed()
    );

    store
        .users()
        .update(
            t,
            user_id,
            UpdateUser {
                blocked: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(
        !authz
            .authorize(&ctx, principal, &required("pki::certificates::read"))
            .await
            .unwrap()
            .is_allowed()
    );
}

#[tokio::test]
async fn unknown_principal_is_denied_not_an_error() {
    let store = store().await;
    let ctx = AppContext::background();
    let authz = Authorizer::new(store);

    let decision = authz
        .authorize(
            &ctx,
            Principal::User {
                tenant_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
            },
            &required("pki::certificates::view"),
        )
        .await
        .unwrap();
    assert!(!decision.is_allowed());
}

#[tokio::test]
async fn superuser_role_crosses_tenants() {
    let store = store().await;
    let ctx = AppContext::background();
    let t = tenant(&store, "t3").await;
    let su = store
        .roles()
        .create(CreateRole {
            id: None,
            slug: "root".into(),
            name: "root".into(),
            description: String::new(),
            security_level: SecurityLevel::Superuser,
            is_super_user: true,
            claims: vec![],
        })
        .await
        .unwrap()
        .id;
    let user_id = user(&store, t, vec![su], vec![]).await;

    let authz = Authorizer::new(store);
    let decision = authz
        .authorize(
            &ctx,
            Principal::User {
                tenant_id: t,
                user_id,
            },
            &required("docker::containers::delete").in_tenant(Uuid::new_v4()),
        )
        .await
        .unwrap();
    assert!(decision.is_allowed());
}

#[tokio::test]
async fn system_principal_is_allowed_everything() {
    let authz = Authorizer::new(store().await);
    let decision = authz
        .authorize(
            &AppContext::background(),
            Principal::System,
            &required("identity::tenants::delete").in_tenant(Uuid::new_v4()),
        )
        .await
        .unwrap();
    assert!(decision.is_allowed());
}

#[tokio::test]
async fn api_key_claims_drive_decisions_until_revoked() {
    let store = store().await;
    let ctx = AppContext::background();
    let t = tenant(&store, "t4").await;
    let keys = ApiKeyService::new(
        store.clone(),
        Arc::new(SystemCatalog::default_blueprint()),
        AuthConfig::default(),
    );

    let created = keys
        .create(
            &ctx,
            t,
            NewApiKey {
                name: "ci".into(),
                security_level: ApiKeySecurityLevel::Read,
                claims: vec!["pki::certificates::create".into()],
                expires_at: None,
            },
            &ResolvedPrincipal::system(),
        )
        .await
        .unwrap();
    let principal = Principal::ApiKey {
        tenant_id: t,
        key_id: created.api_key.id,
    };
    let authz = Authorizer::new(store.clone());

    assert!(
        authz
            .authorize(&ctx, principal, &required("pki::certificates::read"))
            .await
            .unwrap()
            .is_allowed()
    );
    assert!(
        !authz
            .authorize(&ctx, principal, &required("pki::certificates::write"))
            .await
            .unwrap()
            .is_allowed()
    );

    keys.revoke(&ctx, t, created.api_key.id, Principal::System, Some("rotated".into()))
        .await
        .unwrap();
    let stored = store.api_keys().get_by_id(t, created.api_key.id).await.unwrap();
    assert_eq!(stored.revocation_reason.as_deref(), Some("rotated"));
    assert!(
        !authz
            .authorize(&ctx, principal, &required("pki::certificates::read"))
            .await
            .unwrap()
            .is_allowed()
    );
}
