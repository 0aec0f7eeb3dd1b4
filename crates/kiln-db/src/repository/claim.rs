//! SurrealDB implementation of [`ClaimRepository`].
//!
//! Claims are identified by `(scope, slug)` where the scope is the owning
//! tenant id or `global` for system claims.

use chrono::{DateTime, Utc};
use kiln_core::access::{AccessLevel, SecurityLevel};
use kiln_core::error::KilnResult;
use kiln_core::models::claim::{Claim, UpsertClaim};
use kiln_core::repository::{ClaimRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{CountRow, IdRow, decode_enum, optional_uuid_string, parse_optional_uuid, parse_uuid, uuid_strings};
use crate::error::DbError;
use crate::transaction::{self, Undo};

const GLOBAL_SCOPE: &str = "global";

#[derive(Debug, SurrealValue)]
struct ClaimRow {
    record_id: String,
    tenant_id: Option<String>,
    service: String,
    module: String,
    action: String,
    security_level: String,
    slug: String,
    created_at: DateTime<Utc>,
}

impl ClaimRow {
    fn try_into_claim(self) -> Result<Claim, DbError> {
        Ok(Claim {
            id: parse_uuid(&self.record_id, "claim")?,
            tenant_id: parse_optional_uuid(self.tenant_id.as_deref(), "tenant")?,
            service: self.service,
            module: self.module,
            action: decode_enum(&self.action, "action", |s| s.parse::<AccessLevel>().ok())?,
            security_level: decode_enum(&self.security_level, "security level", |s| {
                s.parse::<SecurityLevel>().ok()
            })?,
            slug: self.slug,
            created_at: self.created_at,
        })
    }
}

const SELECT_CLAIM: &str = "SELECT meta::id(id) AS record_id, * FROM claim";

fn scope_key(tenant_id: Option<Uuid>) -> String {
    tenant_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| GLOBAL_SCOPE.to_string())
}

pub(crate) async fn write<C: Connection>(
    db: &Surreal<C>,
    verb: &str,
    claim: &Claim,
) -> Result<(), DbError> {
    let query = format!(
        "{verb} type::record('claim', $id) SET \
         tenant_id = $tenant_id, scope_key = $scope_key, \
         service = $service, module = $module, action = $action, \
         security_level = $security_level, slug = $slug, \
         created_at = $created_at"
    );

    db.query(&query)
        .bind(("id", claim.id.to_string()))
        .bind(("tenant_id", optional_uuid_string(claim.tenant_id)))
        .bind(("scope_key", scope_key(claim.tenant_id)))
        .bind(("service", claim.service.clone()))
        .bind(("module", claim.module.clone()))
        .bind(("action", claim.action.as_str()))
        .bind(("security_level", claim.security_level.as_str()))
        .bind(("slug", claim.slug.clone()))
        .bind(("created_at", claim.created_at))
        .await
        .map_err(DbError::from_query)?
        .check()
        .map_err(DbError::from_query)?;

    Ok(())
}

/// Claims with the given ids; unknown ids are skipped.
pub(crate) async fn fetch_by_ids<C: Connection>(
    db: &Surreal<C>,
    ids: &[Uuid],
) -> Result<Vec<Claim>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut result = db
        .query(format!(
            "{SELECT_CLAIM} WHERE meta::id(id) IN $ids ORDER BY slug ASC"
        ))
        .bind(("ids", uuid_strings(ids)))
        .await?;
    let rows: Vec<ClaimRow> = result.take(0)?;
    rows.into_iter().map(ClaimRow::try_into_claim).collect()
}

pub(crate) async fn fetch_by_tenant<C: Connection>(
    db: &Surreal<C>,
    tenant_id: Uuid,
) -> Result<Vec<Claim>, DbError> {
    let mut result = db
        .query(format!("{SELECT_CLAIM} WHERE tenant_id = $tenant_id"))
        .bind(("tenant_id", tenant_id.to_string()))
        .await?;
    let rows: Vec<ClaimRow> = result.take(0)?;
    rows.into_iter().map(ClaimRow::try_into_claim).collect()
}

/// SurrealDB implementation of the Claim repository.
pub struct SurrealClaimRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealClaimRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealClaimRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Ids of `table` rows (`role` or `user`) holding claim `id`.
    async fn holders(&self, table: &str, id: Uuid) -> Result<Vec<String>, DbError> {
        let mut result = self
            .db
            .query(format!(
                "SELECT meta::id(id) AS record_id FROM {table} WHERE $id IN claims"
            ))
            .bind(("id", id.to_string()))
            .await?;
        let rows: Vec<IdRow> = result.take(0)?;
        Ok(rows.into_iter().map(|row| row.record_id).collect())
    }

    async fn find_by_slug(
        &self,
        tenant_id: Option<Uuid>,
        slug: &str,
    ) -> Result<Option<Claim>, DbError> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_CLAIM} WHERE scope_key = $scope_key AND slug = $slug"
            ))
            .bind(("scope_key", scope_key(tenant_id)))
            .bind(("slug", slug.to_string()))
            .await?;
        let rows: Vec<ClaimRow> = result.take(0)?;
        rows.into_iter()
            .next()
            .map(ClaimRow::try_into_claim)
            .transpose()
    }
}

impl<C: Connection> ClaimRepository for SurrealClaimRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> KilnResult<Claim> {
        let claims = fetch_by_ids(&self.db, &[id]).await?;
        Ok(claims
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("claim", id))?)
    }

    async fn get_by_slug(&self, tenant_id: Option<Uuid>, slug: &str) -> KilnResult<Claim> {
        Ok(self
            .find_by_slug(tenant_id, slug)
            .await?
            .ok_or_else(|| DbError::not_found("claim", format!("slug={slug}")))?)
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> KilnResult<Vec<Claim>> {
        Ok(fetch_by_ids(&self.db, ids).await?)
    }

    async fn upsert(&self, input: UpsertClaim) -> KilnResult<Claim> {
        let slug = input.pattern.slug();
        if let Some(existing) = self.find_by_slug(input.tenant_id, &slug).await? {
            return Ok(existing);
        }

        let claim = Claim {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            service: input.pattern.service().to_string(),
            module: input.pattern.module().to_string(),
            action: input.pattern.action(),
            security_level: input.security_level,
            slug,
            created_at: Utc::now(),
        };

        match write(&self.db, "CREATE", &claim).await {
            Ok(()) => {
                transaction::record(Undo::Delete {
                    table: "claim",
                    id: claim.id.to_string(),
                });
                Ok(claim)
            }
            // Lost a race against a concurrent upsert of the same slug.
            Err(DbError::Conflict { .. }) => {
                debug!(slug = %claim.slug, "Claim created concurrently, reusing");
                self.get_by_slug(input.tenant_id, &claim.slug).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, id: Uuid) -> KilnResult<()> {
        let claim = self.get_by_id(id).await?;
        let roles = self.holders("role", id).await?;
        let users = self.holders("user", id).await?;

        self.db
            .query(
                "DELETE type::record('claim', $id); \
                 UPDATE role SET claims = array::complement(claims, [$id]) \
                 WHERE $id IN claims; \
                 UPDATE user SET claims = array::complement(claims, [$id]) \
                 WHERE $id IN claims;",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_query)?;

        transaction::record(Undo::Claim(Box::new(claim)));
        transaction::record(Undo::Grant {
            claim_id: id.to_string(),
            roles,
            users,
        });
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: Option<Uuid>,
        pagination: Pagination,
    ) -> KilnResult<PaginatedResult<Claim>> {
        let scope = scope_key(tenant_id);

        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM claim WHERE scope_key = $scope_key GROUP ALL")
            .bind(("scope_key", scope.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "{SELECT_CLAIM} WHERE scope_key = $scope_key \
                 ORDER BY slug ASC LIMIT $limit START $offset"
            ))
            .bind(("scope_key", scope))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ClaimRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(ClaimRow::try_into_claim)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
