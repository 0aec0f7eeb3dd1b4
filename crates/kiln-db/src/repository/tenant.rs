//! SurrealDB implementation of [`TenantRepository`].
//!
//! Deleting a tenant removes its users, API keys, certificates and
//! tenant-scoped claims in one native SurrealDB transaction.

use chrono::{DateTime, Utc};
use kiln_core::error::KilnResult;
use kiln_core::models::tenant::{CreateTenant, Tenant, TenantStatus, UpdateTenant};
use kiln_core::repository::{PaginatedResult, Pagination, TenantRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use super::{CountRow, decode_enum, optional_uuid_string, parse_optional_uuid, parse_uuid};
use super::{api_key, certificate, claim, user};
use crate::error::DbError;
use crate::transaction::{self, Undo};

#[derive(Debug, SurrealValue)]
struct TenantRow {
    record_id: String,
    slug: String,
    name: String,
    domain: String,
    owner_id: Option<String>,
    contact_email: Option<String>,
    status: String,
    require_2fa: bool,
    activated_at: Option<DateTime<Utc>>,
    deactivated_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: Option<String>,
    updated_by: Option<String>,
}

impl TenantRow {
    fn try_into_tenant(self) -> Result<Tenant, DbError> {
        Ok(Tenant {
            id: parse_uuid(&self.record_id, "tenant")?,
            slug: self.slug,
            name: self.name,
            domain: self.domain,
            owner_id: parse_optional_uuid(self.owner_id.as_deref(), "owner")?,
            contact_email: self.contact_email,
            status: decode_enum(&self.status, "tenant status", TenantStatus::parse)?,
            require_2fa: self.require_2fa,
            activated_at: self.activated_at,
            deactivated_at: self.deactivated_at,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
            created_by: parse_optional_uuid(self.created_by.as_deref(), "created_by")?,
            updated_by: parse_optional_uuid(self.updated_by.as_deref(), "updated_by")?,
        })
    }
}

const SELECT_TENANT: &str = "SELECT meta::id(id) AS record_id, * FROM tenant";

/// Write every column of `tenant`. `verb` is `CREATE`, `UPDATE` or `UPSERT`.
pub(crate) async fn write<C: Connection>(
    db: &Surreal<C>,
    verb: &str,
    tenant: &Tenant,
) -> Result<(), DbError> {
    let query = format!(
        "{verb} type::record('tenant', $id) SET \
         slug = $slug, name = $name, domain = $domain, \
         owner_id = $owner_id, contact_email = $contact_email, \
         status = $status, require_2fa = $require_2fa, \
         activated_at = $activated_at, deactivated_at = $deactivated_at, \
         metadata = $metadata, \
         created_at = $created_at, updated_at = $updated_at, \
         created_by = $created_by, updated_by = $updated_by"
    );

    db.query(&query)
        .bind(("id", tenant.id.to_string()))
        .bind(("slug", tenant.slug.clone()))
        .bind(("name", tenant.name.clone()))
        .bind(("domain", tenant.domain.clone()))
        .bind(("owner_id", optional_uuid_string(tenant.owner_id)))
        .bind(("contact_email", tenant.contact_email.clone()))
        .bind(("status", tenant.status.as_str()))
        .bind(("require_2fa", tenant.require_2fa))
        .bind(("activated_at", tenant.activated_at))
        .bind(("deactivated_at", tenant.deactivated_at))
        .bind(("metadata", tenant.metadata.clone()))
        .bind(("created_at", tenant.created_at))
        .bind(("updated_at", tenant.updated_at))
        .bind(("created_by", optional_uuid_string(tenant.created_by)))
        .bind(("updated_by", optional_uuid_string(tenant.updated_by)))
        .await
        .map_err(DbError::from_query)?
        .check()
        .map_err(DbError::from_query)?;

    Ok(())
}

/// SurrealDB implementation of the Tenant repository.
pub struct SurrealTenantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealTenantRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealTenantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find_one(
        &self,
        clause: &str,
        key: &'static str,
        value: String,
    ) -> Result<Tenant, DbError> {
        let mut result = self
            .db
            .query(format!("{SELECT_TENANT} WHERE {clause}"))
            .bind((key, value.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("tenant", format!("{key}={value}")))?;
        row.try_into_tenant()
    }
}

impl<C: Connection> TenantRepository for SurrealTenantRepository<C> {
    async fn create(&self, input: CreateTenant) -> KilnResult<Tenant> {
        let now = Utc::now();
        let tenant = Tenant {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            slug: input.slug,
            name: input.name,
            domain: input.domain,
            owner_id: None,
            contact_email: input.contact_email,
            status: TenantStatus::Active,
            require_2fa: input.require_2fa,
            activated_at: Some(now),
            deactivated_at: None,
            metadata: input
                .metadata
                .unwrap_or(serde_json::Value::Object(Default::default())),
            created_at: now,
            updated_at: now,
            created_by: input.created_by,
            updated_by: input.created_by,
        };

        write(&self.db, "CREATE", &tenant).await?;
        transaction::record(Undo::Delete {
            table: "tenant",
            id: tenant.id.to_string(),
        });

        Ok(tenant)
    }

    async fn get_by_id(&self, id: Uuid) -> KilnResult<Tenant> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_TENANT} WHERE id = type::record('tenant', $id)"
            ))
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("tenant", id))?;
        Ok(row.try_into_tenant()?)
    }

    async fn get_by_slug(&self, slug: &str) -> KilnResult<Tenant> {
        Ok(self.find_one("slug = $slug", "slug", slug.to_string()).await?)
    }

    async fn get_by_domain(&self, domain: &str) -> KilnResult<Tenant> {
        Ok(self
            .find_one("domain = $domain", "domain", domain.to_string())
            .await?)
    }

    async fn update(&self, id: Uuid, input: UpdateTenant) -> KilnResult<Tenant> {
        let previous = self.get_by_id(id).await?;
        let mut tenant = previous.clone();
        let now = Utc::now();

        if let Some(name) = input.name {
            tenant.name = name;
        }
        if let Some(domain) = input.domain {
            tenant.domain = domain;
        }
        if let Some(owner_id) = input.owner_id {
            tenant.owner_id = owner_id;
        }
        if let Some(contact_email) = input.contact_email {
            tenant.contact_email = contact_email;
        }
        if let Some(status) = input.status {
            if status != tenant.status {
                match status {
                    TenantStatus::Active => tenant.activated_at = Some(now),
                    TenantStatus::Inactive | TenantStatus::Suspended => {
                        tenant.deactivated_at = Some(now)
                    }
                }
            }
            tenant.status = status;
        }
        if let Some(require_2fa) = input.require_2fa {
            tenant.require_2fa = require_2fa;
        }
        if let Some(metadata) = input.metadata {
            tenant.metadata = metadata;
        }
        tenant.updated_at = now;
        tenant.updated_by = input.updated_by;

        write(&self.db, "UPDATE", &tenant).await?;
        transaction::record(Undo::Tenant(Box::new(previous)));

        Ok(tenant)
    }

    async fn delete(&self, id: Uuid) -> KilnResult<()> {
        let tenant = self.get_by_id(id).await?;

        if transaction::in_transaction() {
            let users = user::fetch_by_tenant(&self.db, id).await?;
            let keys = api_key::fetch_by_tenant(&self.db, id).await?;
            let certificates = certificate::fetch_by_tenant(&self.db, id).await?;
            let claims = claim::fetch_by_tenant(&self.db, id).await?;
            transaction::record(Undo::Tenant(Box::new(tenant.clone())));
            users
                .into_iter()
                .for_each(|u| transaction::record(Undo::User(Box::new(u))));
            keys.into_iter()
                .for_each(|k| transaction::record(Undo::ApiKey(Box::new(k))));
            certificates
                .into_iter()
                .for_each(|c| transaction::record(Undo::Certificate(Box::new(c))));
            claims
                .into_iter()
                .for_each(|c| transaction::record(Undo::Claim(Box::new(c))));
        }

        self.db
            .query(
                "BEGIN TRANSACTION; \
                 DELETE user WHERE tenant_id = $tenant_id; \
                 DELETE api_key WHERE tenant_id = $tenant_id; \
                 DELETE certificate WHERE tenant_id = $tenant_id; \
                 DELETE claim WHERE tenant_id = $tenant_id; \
                 DELETE type::record('tenant', $tenant_id); \
                 COMMIT TRANSACTION;",
            )
            .bind(("tenant_id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_query)?;

        info!(tenant_id = %id, slug = %tenant.slug, "Deleted tenant and owned records");
        Ok(())
    }

    async fn list(&self, pagination: Pagination) -> KilnResult<PaginatedResult<Tenant>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM tenant GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "{SELECT_TENANT} ORDER BY created_at ASC LIMIT $limit START $offset"
            ))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(TenantRow::try_into_tenant)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
