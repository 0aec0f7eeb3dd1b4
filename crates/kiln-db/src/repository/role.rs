//! SurrealDB implementation of [`RoleRepository`].

use chrono::{DateTime, Utc};
use kiln_core::access::SecurityLevel;
use kiln_core::error::KilnResult;
use kiln_core::models::claim::Claim;
use kiln_core::models::role::{CreateRole, Role};
use kiln_core::repository::{PaginatedResult, Pagination, RoleRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, claim, decode_enum, parse_uuid, parse_uuids, uuid_strings};
use crate::error::DbError;
use crate::transaction::{self, Undo};

#[derive(Debug, SurrealValue)]
struct RoleRow {
    record_id: String,
    slug: String,
    name: String,
    description: String,
    security_level: String,
    is_super_user: bool,
    claims: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRow {
    fn try_into_role(self) -> Result<Role, DbError> {
        Ok(Role {
            id: parse_uuid(&self.record_id, "role")?,
            slug: self.slug,
            name: self.name,
            description: self.description,
            security_level: decode_enum(&self.security_level, "security level", |s| {
                s.parse::<SecurityLevel>().ok()
            })?,
            is_super_user: self.is_super_user,
            claims: parse_uuids(&self.claims, "claim")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_ROLE: &str = "SELECT meta::id(id) AS record_id, * FROM role";

pub(crate) async fn write<C: Connection>(
    db: &Surreal<C>,
    verb: &str,
    role: &Role,
) -> Result<(), DbError> {
    let query = format!(
        "{verb} type::record('role', $id) SET \
         slug = $slug, name = $name, description = $description, \
         security_level = $security_level, is_super_user = $is_super_user, \
         claims = $claims, created_at = $created_at, updated_at = $updated_at"
    );

    db.query(&query)
        .bind(("id", role.id.to_string()))
        .bind(("slug", role.slug.clone()))
        .bind(("name", role.name.clone()))
        .bind(("description", role.description.clone()))
        .bind(("security_level", role.security_level.as_str()))
        .bind(("is_super_user", role.is_super_user))
        .bind(("claims", uuid_strings(&role.claims)))
        .bind(("created_at", role.created_at))
        .bind(("updated_at", role.updated_at))
        .await
        .map_err(DbError::from_query)?
        .check()
        .map_err(DbError::from_query)?;

    Ok(())
}

/// Roles with the given ids; unknown ids are skipped.
pub(crate) async fn fetch_by_ids<C: Connection>(
    db: &Surreal<C>,
    ids: &[Uuid],
) -> Result<Vec<Role>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut result = db
        .query(format!(
            "{SELECT_ROLE} WHERE meta::id(id) IN $ids ORDER BY slug ASC"
        ))
        .bind(("ids", uuid_strings(ids)))
        .await?;
    let rows: Vec<RoleRow> = result.take(0)?;
    rows.into_iter().map(RoleRow::try_into_role).collect()
}

/// SurrealDB implementation of the Role repository.
pub struct SurrealRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealRoleRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn modify(&self, id: Uuid, change: impl FnOnce(&mut Role)) -> KilnResult<Role> {
        let previous = self.get_by_id(id).await?;
        let mut role = previous.clone();
        change(&mut role);
        role.updated_at = Utc::now();

        write(&self.db, "UPDATE", &role).await?;
        transaction::record(Undo::Role(Box::new(previous)));
        Ok(role)
    }
}

impl<C: Connection> RoleRepository for SurrealRoleRepository<C> {
    async fn create(&self, input: CreateRole) -> KilnResult<Role> {
        let now = Utc::now();
        let mut claims = Vec::with_capacity(input.claims.len());
        for id in input.claims {
            if !claims.contains(&id) {
                claims.push(id);
            }
        }
        let role = Role {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            slug: input.slug,
            name: input.name,
            description: input.description,
            security_level: input.security_level,
            is_super_user: input.is_super_user,
            claims,
            created_at: now,
            updated_at: now,
        };

        write(&self.db, "CREATE", &role).await?;
        transaction::record(Undo::Delete {
            table: "role",
            id: role.id.to_string(),
        });

        Ok(role)
    }

    async fn get_by_id(&self, id: Uuid) -> KilnResult<Role> {
        let roles = fetch_by_ids(&self.db, &[id]).await?;
        Ok(roles
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("role", id))?)
    }

    async fn get_by_slug(&self, slug: &str) -> KilnResult<Role> {
        let mut result = self
            .db
            .query(format!("{SELECT_ROLE} WHERE slug = $slug"))
            .bind(("slug", slug.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("role", format!("slug={slug}")))?;
        Ok(row.try_into_role()?)
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> KilnResult<Vec<Role>> {
        Ok(fetch_by_ids(&self.db, ids).await?)
    }

    async fn attach_claim(&self, role_id: Uuid, claim_id: Uuid) -> KilnResult<Role> {
        // Surface unknown claims as not-found rather than dangling ids.
        if claim::fetch_by_ids(&self.db, &[claim_id]).await?.is_empty() {
            return Err(DbError::not_found("claim", claim_id).into());
        }
        self.modify(role_id, |role| {
            if !role.claims.contains(&claim_id) {
                role.claims.push(claim_id);
            }
        })
        .await
    }

    async fn detach_claim(&self, role_id: Uuid, claim_id: Uuid) -> KilnResult<Role> {
        self.modify(role_id, |role| role.claims.retain(|id| *id != claim_id))
            .await
    }

    async fn get_role_claims(&self, role_id: Uuid) -> KilnResult<Vec<Claim>> {
        let role = self.get_by_id(role_id).await?;
        Ok(claim::fetch_by_ids(&self.db, &role.claims).await?)
    }

    async fn delete(&self, id: Uuid) -> KilnResult<()> {
        let role = self.get_by_id(id).await?;

        self.db
            .query("DELETE type::record('role', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_query)?;

        transaction::record(Undo::Role(Box::new(role)));
        Ok(())
    }

    async fn list(&self, pagination: Pagination) -> KilnResult<PaginatedResult<Role>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM role GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "{SELECT_ROLE} ORDER BY created_at ASC LIMIT $limit START $offset"
            ))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(RoleRow::try_into_role)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
