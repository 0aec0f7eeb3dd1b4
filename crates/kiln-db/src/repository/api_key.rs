//! SurrealDB implementation of [`ApiKeyRepository`].

use chrono::{DateTime, Utc};
use kiln_core::access::ApiKeySecurityLevel;
use kiln_core::error::KilnResult;
use kiln_core::models::api_key::{ApiKey, CreateApiKey, RevokeApiKey};
use kiln_core::models::claim::ClaimPattern;
use kiln_core::repository::{ApiKeyRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use super::{CountRow, decode_enum, optional_uuid_string, parse_optional_uuid, parse_uuid};
use crate::error::DbError;
use crate::transaction::{self, Undo};

#[derive(Debug, SurrealValue)]
struct ApiKeyRow {
    record_id: String,
    tenant_id: String,
    name: String,
    key_hash: String,
    key_prefix: String,
    security_level: String,
    claims: Vec<String>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<String>,
    revocation_reason: Option<String>,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    created_by: Option<String>,
}

impl ApiKeyRow {
    fn try_into_api_key(self) -> Result<ApiKey, DbError> {
        let claims = self
            .claims
            .iter()
            .map(|slug| ClaimPattern::parse(slug).map_err(|e| DbError::Decode(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ApiKey {
            id: parse_uuid(&self.record_id, "api key")?,
            tenant_id: parse_uuid(&self.tenant_id, "tenant")?,
            name: self.name,
            key_hash: self.key_hash,
            key_prefix: self.key_prefix,
            security_level: decode_enum(&self.security_level, "API key level", |s| {
                s.parse::<ApiKeySecurityLevel>().ok()
            })?,
            claims,
            expires_at: self.expires_at,
            is_active: self.is_active,
            revoked_at: self.revoked_at,
            revoked_by: parse_optional_uuid(self.revoked_by.as_deref(), "revoked_by")?,
            revocation_reason: self.revocation_reason,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            created_by: parse_optional_uuid(self.created_by.as_deref(), "created_by")?,
        })
    }
}

const SELECT_API_KEY: &str = "SELECT meta::id(id) AS record_id, * FROM api_key";

pub(crate) async fn write<C: Connection>(
    db: &Surreal<C>,
    verb: &str,
    key: &ApiKey,
) -> Result<(), DbError> {
    let query = format!(
        "{verb} type::record('api_key', $id) SET \
         tenant_id = $tenant_id, name = $name, \
         key_hash = $key_hash, key_prefix = $key_prefix, \
         security_level = $security_level, claims = $claims, \
         expires_at = $expires_at, is_active = $is_active, \
         revoked_at = $revoked_at, revoked_by = $revoked_by, \
         revocation_reason = $revocation_reason, \
         last_used_at = $last_used_at, \
         created_at = $created_at, created_by = $created_by"
    );

    let claims: Vec<String> = key.claims.iter().map(ClaimPattern::slug).collect();

    db.query(&query)
        .bind(("id", key.id.to_string()))
        .bind(("tenant_id", key.tenant_id.to_string()))
        .bind(("name", key.name.clone()))
        .bind(("key_hash", key.key_hash.clone()))
        .bind(("key_prefix", key.key_prefix.clone()))
        .bind(("security_level", key.security_level.as_str()))
        .bind(("claims", claims))
        .bind(("expires_at", key.expires_at))
        .bind(("is_active", key.is_active))
        .bind(("revoked_at", key.revoked_at))
        .bind(("revoked_by", optional_uuid_string(key.revoked_by)))
        .bind(("revocation_reason", key.revocation_reason.clone()))
        .bind(("last_used_at", key.last_used_at))
        .bind(("created_at", key.created_at))
        .bind(("created_by", optional_uuid_string(key.created_by)))
        .await
        .map_err(DbError::from_query)?
        .check()
        .map_err(DbError::from_query)?;

    Ok(())
}

pub(crate) async fn fetch_by_tenant<C: Connection>(
    db: &Surreal<C>,
    tenant_id: Uuid,
) -> Result<Vec<ApiKey>, DbError> {
    let mut result = db
        .query(format!("{SELECT_API_KEY} WHERE tenant_id = $tenant_id"))
        .bind(("tenant_id", tenant_id.to_string()))
        .await?;
    let rows: Vec<ApiKeyRow> = result.take(0)?;
    rows.into_iter().map(ApiKeyRow::try_into_api_key).collect()
}

/// SurrealDB implementation of the API key repository.
pub struct SurrealApiKeyRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealApiKeyRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealApiKeyRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find(
        &self,
        clause: &str,
        key: &'static str,
        value: String,
    ) -> Result<Vec<ApiKey>, DbError> {
        let mut result = self
            .db
            .query(format!("{SELECT_API_KEY} WHERE {clause}"))
            .bind((key, value))
            .await?;
        let rows: Vec<ApiKeyRow> = result.take(0)?;
        rows.into_iter().map(ApiKeyRow::try_into_api_key).collect()
    }
}

impl<C: Connection> ApiKeyRepository for SurrealApiKeyRepository<C> {
    async fn create(&self, input: CreateApiKey) -> KilnResult<ApiKey> {
        let key = ApiKey {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            name: input.name,
            key_hash: input.key_hash,
            key_prefix: input.key_prefix,
            security_level: input.security_level,
            claims: input.claims,
            expires_at: input.expires_at,
            is_active: true,
            revoked_at: None,
            revoked_by: None,
            revocation_reason: None,
            last_used_at: None,
            created_at: Utc::now(),
            created_by: input.created_by,
        };

        write(&self.db, "CREATE", &key).await?;
        transaction::record(Undo::Delete {
            table: "api_key",
            id: key.id.to_string(),
        });

        Ok(key)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> KilnResult<ApiKey> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_API_KEY} WHERE id = type::record('api_key', $id) \
                 AND tenant_id = $tenant_id"
            ))
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ApiKeyRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("api key", id))?;
        Ok(row.try_into_api_key()?)
    }

    async fn get_by_hash(&self, key_hash: &str) -> KilnResult<ApiKey> {
        Ok(self
            .find("key_hash = $key_hash", "key_hash", key_hash.to_string())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("api key", "hash"))?)
    }

    async fn get_by_prefix(&self, key_prefix: &str) -> KilnResult<Vec<ApiKey>> {
        Ok(self
            .find("key_prefix = $key_prefix", "key_prefix", key_prefix.to_string())
            .await?)
    }

    async fn revoke(&self, tenant_id: Uuid, id: Uuid, input: RevokeApiKey) -> KilnResult<ApiKey> {
        let previous = self.get_by_id(tenant_id, id).await?;
        if previous.revoked_at.is_some() {
            return Ok(previous);
        }

        let mut key = previous.clone();
        key.is_active = false;
        key.revoked_at = Some(Utc::now());
        key.revoked_by = input.revoked_by;
        key.revocation_reason = input.reason;

        write(&self.db, "UPDATE", &key).await?;
        transaction::record(Undo::ApiKey(Box::new(previous)));

        info!(tenant_id = %tenant_id, api_key_id = %id, "API key revoked");
        Ok(key)
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> KilnResult<()> {
        self.db
            .query("UPDATE type::record('api_key', $id) SET last_used_at = $at")
            .bind(("id", id.to_string()))
            .bind(("at", at))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_query)?;
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> KilnResult<PaginatedResult<ApiKey>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM api_key WHERE tenant_id = $tenant_id GROUP ALL")
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "{SELECT_API_KEY} WHERE tenant_id = $tenant_id \
                 ORDER BY created_at ASC LIMIT $limit START $offset"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ApiKeyRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(ApiKeyRow::try_into_api_key)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
