//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Tenant-scoped repositories take a
//! `tenant_id` parameter to enforce data isolation. [`Store`] bundles the
//! repositories and adds transactional grouping of writes.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::KilnResult;
use crate::models::{
    api_key::{ApiKey, CreateApiKey, RevokeApiKey},
    certificate::{Certificate, CertificateFilter, CertificateType, CreateCertificate},
    claim::{Claim, UpsertClaim},
    migration::MigrationRecord,
    role::{CreateRole, Role},
    tenant::{CreateTenant, Tenant, UpdateTenant},
    user::{CreateUser, RefreshToken, UpdateUser, User, UserFilter},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

impl Pagination {
    /// From a 1-based page number and page size.
    pub fn page(page: u64, page_size: u64) -> Self {
        let limit = page_size.clamp(1, 500);
        Self {
            offset: page.saturating_sub(1) * limit,
            limit,
        }
    }

    /// Everything, for internal fan-out such as cascade snapshots.
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: 10_000,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Tenants (global scope)
// ---------------------------------------------------------------------------

pub trait TenantRepository: Send + Sync {
    fn create(&self, input: CreateTenant) -> impl Future<Output = KilnResult<Tenant>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = KilnResult<Tenant>> + Send;
    fn get_by_slug(&self, slug: &str) -> impl Future<Output = KilnResult<Tenant>> + Send;
    fn get_by_domain(&self, domain: &str) -> impl Future<Output = KilnResult<Tenant>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateTenant,
    ) -> impl Future<Output = KilnResult<Tenant>> + Send;
    /// Deletes the tenant with its users, API keys and certificates.
    fn delete(&self, id: Uuid) -> impl Future<Output = KilnResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = KilnResult<PaginatedResult<Tenant>>> + Send;
}

// ---------------------------------------------------------------------------
// Tenant-scoped repositories
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    /// Hashes `input.password` with Argon2id before storage.
    fn create(&self, input: CreateUser) -> impl Future<Output = KilnResult<User>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = KilnResult<User>> + Send;
    fn get_by_username(
        &self,
        tenant_id: Uuid,
        username: &str,
    ) -> impl Future<Output = KilnResult<User>> + Send;
    fn get_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> impl Future<Output = KilnResult<User>> + Send;
    fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = KilnResult<User>> + Send;
    fn update_password(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        new_password: &str,
    ) -> impl Future<Output = KilnResult<()>> + Send;
    fn set_refresh_token(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        token: Option<RefreshToken>,
    ) -> impl Future<Output = KilnResult<()>> + Send;
    fn delete(&self, tenant_id: Uuid, id: Uuid) -> impl Future<Output = KilnResult<()>> + Send;
    /// Direct claims of the user plus the claims of all its roles.
    fn get_user_claims(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = KilnResult<Vec<Claim>>> + Send;
    fn list(
        &self,
        tenant_id: Uuid,
        filter: UserFilter,
        pagination: Pagination,
    ) -> impl Future<Output = KilnResult<PaginatedResult<User>>> + Send;
}

pub trait RoleRepository: Send + Sync {
    fn create(&self, input: CreateRole) -> impl Future<Output = KilnResult<Role>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = KilnResult<Role>> + Send;
    fn get_by_slug(&self, slug: &str) -> impl Future<Output = KilnResult<Role>> + Send;
    fn get_by_ids(&self, ids: &[Uuid]) -> impl Future<Output = KilnResult<Vec<Role>>> + Send;
    fn attach_claim(
        &self,
        role_id: Uuid,
        claim_id: Uuid,
    ) -> impl Future<Output = KilnResult<Role>> + Send;
    fn detach_claim(
        &self,
        role_id: Uuid,
        claim_id: Uuid,
    ) -> impl Future<Output = KilnResult<Role>> + Send;
    fn get_role_claims(&self, role_id: Uuid) -> impl Future<Output = KilnResult<Vec<Claim>>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = KilnResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = KilnResult<PaginatedResult<Role>>> + Send;
}

pub trait ClaimRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = KilnResult<Claim>> + Send;
    fn get_by_slug(
        &self,
        tenant_id: Option<Uuid>,
        slug: &str,
    ) -> impl Future<Output = KilnResult<Claim>> + Send;
    fn get_by_ids(&self, ids: &[Uuid]) -> impl Future<Output = KilnResult<Vec<Claim>>> + Send;
    /// Returns the existing claim when `(tenant_id, slug)` is already stored.
    fn upsert(&self, input: UpsertClaim) -> impl Future<Output = KilnResult<Claim>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = KilnResult<()>> + Send;
    fn list(
        &self,
        tenant_id: Option<Uuid>,
        pagination: Pagination,
    ) -> impl Future<Output = KilnResult<PaginatedResult<Claim>>> + Send;
}

pub trait ApiKeyRepository: Send + Sync {
    fn create(&self, input: CreateApiKey) -> impl Future<Output = KilnResult<ApiKey>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = KilnResult<ApiKey>> + Send;
    fn get_by_hash(&self, key_hash: &str) -> impl Future<Output = KilnResult<ApiKey>> + Send;
    /// Prefixes are not unique; callers compare hashes.
    fn get_by_prefix(
        &self,
        key_prefix: &str,
    ) -> impl Future<Output = KilnResult<Vec<ApiKey>>> + Send;
    fn revoke(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: RevokeApiKey,
    ) -> impl Future<Output = KilnResult<ApiKey>> + Send;
    /// Stamp `last_used_at`.
    fn touch(&self, id: Uuid, at: DateTime<Utc>) -> impl Future<Output = KilnResult<()>> + Send;
    fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = KilnResult<PaginatedResult<ApiKey>>> + Send;
}

pub trait CertificateRepository: Send + Sync {
    fn create(
        &self,
        input: CreateCertificate,
    ) -> impl Future<Output = KilnResult<Certificate>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = KilnResult<Certificate>> + Send;
    fn get_by_slug(
        &self,
        tenant_id: Uuid,
        slug: &str,
    ) -> impl Future<Output = KilnResult<Certificate>> + Send;
    fn get_by_type(
        &self,
        tenant_id: Uuid,
        certificate_type: CertificateType,
    ) -> impl Future<Output = KilnResult<Vec<Certificate>>> + Send;
    /// The global root CA.
    fn get_root(&self) -> impl Future<Output = KilnResult<Certificate>> + Send;
    fn serial_exists(&self, serial_number: &str) -> impl Future<Output = KilnResult<bool>> + Send;
    fn delete(&self, tenant_id: Uuid, id: Uuid) -> impl Future<Output = KilnResult<()>> + Send;
    fn list(
        &self,
        filter: CertificateFilter,
        pagination: Pagination,
    ) -> impl Future<Output = KilnResult<PaginatedResult<Certificate>>> + Send;
}

pub trait MigrationRepository: Send + Sync {
    fn applied_version(
        &self,
        name: &str,
    ) -> impl Future<Output = KilnResult<Option<MigrationRecord>>> + Send;
    fn record(
        &self,
        name: &str,
        version: u32,
    ) -> impl Future<Output = KilnResult<MigrationRecord>> + Send;
    fn remove(&self, name: &str) -> impl Future<Output = KilnResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The identity store: every repository plus transactional grouping.
pub trait Store: Clone + Send + Sync + 'static {
    type Tenants: TenantRepository;
    type Users: UserRepository;
    type Roles: RoleRepository;
    type Claims: ClaimRepository;
    type ApiKeys: ApiKeyRepository;
    type Certificates: CertificateRepository;
    type Migrations: MigrationRepository;

    fn tenants(&self) -> &Self::Tenants;
    fn users(&self) -> &Self::Users;
    fn roles(&self) -> &Self::Roles;
    fn claims(&self) -> &Self::Claims;
    fn api_keys(&self) -> &Self::ApiKeys;
    fn certificates(&self) -> &Self::Certificates;
    fn migrations(&self) -> &Self::Migrations;

    /// Run `f` atomically: if it fails, every write it made through this
    /// store is undone. Nested calls join the outermost transaction.
    fn with_transaction<T, F, Fut>(&self, f: F) -> impl Future<Output = KilnResult<T>> + Send
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = KilnResult<T>> + Send;
}
