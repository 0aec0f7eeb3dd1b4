//! SurrealDB implementation of [`UserRepository`].
//!
//! Password hashing uses Argon2id with OWASP-recommended parameters
//! (memory: 19 MiB, iterations: 2, parallelism: 1). Salt is randomly
//! generated per hash. An optional pepper (server-side secret) can be
//! provided at construction time.

use std::collections::BTreeSet;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use kiln_core::error::KilnResult;
use kiln_core::models::claim::Claim;
use kiln_core::models::user::{
    CreateUser, RefreshToken, TwoFactor, UpdateUser, User, UserFilter, UserStatus,
};
use kiln_core::repository::{PaginatedResult, Pagination, UserRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{
    CountRow, claim, decode_enum, optional_uuid_string, parse_optional_uuid, parse_uuid,
    parse_uuids, role, uuid_strings,
};
use crate::error::DbError;
use crate::transaction::{self, Undo};

#[derive(Debug, SurrealValue)]
struct UserRow {
    record_id: String,
    tenant_id: String,
    username: String,
    name: String,
    email: String,
    password_hash: String,
    roles: Vec<String>,
    claims: Vec<String>,
    status: String,
    blocked: bool,
    two_factor_enabled: bool,
    two_factor_secret: Option<String>,
    two_factor_verified: bool,
    refresh_token_hash: Option<String>,
    refresh_token_expires_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: Option<String>,
    updated_by: Option<String>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, DbError> {
        let refresh_token = match (self.refresh_token_hash, self.refresh_token_expires_at) {
            (Some(value), Some(expires_at)) => Some(RefreshToken { value, expires_at }),
            _ => None,
        };
        Ok(User {
            id: parse_uuid(&self.record_id, "user")?,
            tenant_id: parse_uuid(&self.tenant_id, "tenant")?,
            username: self.username,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            roles: parse_uuids(&self.roles, "role")?,
            claims: parse_uuids(&self.claims, "claim")?,
            status: decode_enum(&self.status, "user status", UserStatus::parse)?,
            blocked: self.blocked,
            two_factor: TwoFactor {
                enabled: self.two_factor_enabled,
                secret: self.two_factor_secret,
                verified: self.two_factor_verified,
            },
            refresh_token,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
            created_by: parse_optional_uuid(self.created_by.as_deref(), "created_by")?,
            updated_by: parse_optional_uuid(self.updated_by.as_deref(), "updated_by")?,
        })
    }
}

const SELECT_USER: &str = "SELECT meta::id(id) AS record_id, * FROM user";

/// Write every column of `user`. `verb` is `CREATE`, `UPDATE` or `UPSERT`.
pub(crate) async fn write<C: Connection>(
    db: &Surreal<C>,
    verb: &str,
    user: &User,
) -> Result<(), DbError> {
    let query = format!(
        "{verb} type::record('user', $id) SET \
         tenant_id = $tenant_id, username = $username, name = $name, \
         email = $email, password_hash = $password_hash, \
         roles = $roles, claims = $claims, \
         status = $status, blocked = $blocked, \
         two_factor_enabled = $two_factor_enabled, \
         two_factor_secret = $two_factor_secret, \
         two_factor_verified = $two_factor_verified, \
         refresh_token_hash = $refresh_token_hash, \
         refresh_token_expires_at = $refresh_token_expires_at, \
         metadata = $metadata, \
         created_at = $created_at, updated_at = $updated_at, \
         created_by = $created_by, updated_by = $updated_by"
    );

    db.query(&query)
        .bind(("id", user.id.to_string()))
        .bind(("tenant_id", user.tenant_id.to_string()))
        .bind(("username", user.username.clone()))
        .bind(("name", user.name.clone()))
        .bind(("email", user.email.clone()))
        .bind(("password_hash", user.password_hash.clone()))
        .bind(("roles", uuid_strings(&user.roles)))
        .bind(("claims", uuid_strings(&user.claims)))
        .bind(("status", user.status.as_str()))
        .bind(("blocked", user.blocked))
        .bind(("two_factor_enabled", user.two_factor.enabled))
        .bind(("two_factor_secret", user.two_factor.secret.clone()))
        .bind(("two_factor_verified", user.two_factor.verified))
        .bind((
            "refresh_token_hash",
            user.refresh_token.as_ref().map(|t| t.value.clone()),
        ))
        .bind((
            "refresh_token_expires_at",
            user.refresh_token.as_ref().map(|t| t.expires_at),
        ))
        .bind(("metadata", user.metadata.clone()))
        .bind(("created_at", user.created_at))
        .bind(("updated_at", user.updated_at))
        .bind(("created_by", optional_uuid_string(user.created_by)))
        .bind(("updated_by", optional_uuid_string(user.updated_by)))
        .await
        .map_err(DbError::from_query)?
        .check()
        .map_err(DbError::from_query)?;

    Ok(())
}

/// All users of a tenant, for cascade snapshots.
pub(crate) async fn fetch_by_tenant<C: Connection>(
    db: &Surreal<C>,
    tenant_id: Uuid,
) -> Result<Vec<User>, DbError> {
    let mut result = db
        .query(format!("{SELECT_USER} WHERE tenant_id = $tenant_id"))
        .bind(("tenant_id", tenant_id.to_string()))
        .await?;
    let rows: Vec<UserRow> = result.take(0)?;
    rows.into_iter().map(UserRow::try_into_user).collect()
}

/// Hash a password with Argon2id using OWASP-recommended parameters.
///
/// If a pepper is provided, it is prepended to the password before
/// hashing. The salt is randomly generated for each call.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, DbError> {
    // OWASP ASVS recommended: m=19456 (19 MiB), t=2, p=1
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| DbError::Query(format!("argon2 params error: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let peppered: String;
    let input = match pepper {
        Some(p) => {
            peppered = format!("{p}{password}");
            peppered.as_bytes()
        }
        None => password.as_bytes(),
    };

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(input, &salt)
        .map_err(|e| DbError::Query(format!("password hash error: {e}")))?;

    Ok(hash.to_string())
}

/// Verify a password against an Argon2id hash.
///
/// Public for use by the auth layer.
pub fn verify_password(password: &str, hash: &str, pepper: Option<&str>) -> Result<bool, DbError> {
    use argon2::PasswordVerifier;

    let peppered: String;
    let input = match pepper {
        Some(p) => {
            peppered = format!("{p}{password}");
            peppered.as_bytes()
        }
        None => password.as_bytes(),
    };

    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| DbError::Decode(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(input, &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(DbError::Query(format!("verify error: {e}"))),
    }
}

/// SurrealDB implementation of the User repository.
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
    /// Optional server-side pepper for password hashing.
    pepper: Option<String>,
}

impl<C: Connection> Clone for SurrealUserRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            pepper: self.pepper.clone(),
        }
    }
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db, pepper: None }
    }

    pub fn with_pepper(db: Surreal<C>, pepper: String) -> Self {
        Self {
            db,
            pepper: Some(pepper),
        }
    }

    async fn find_one(
        &self,
        tenant_id: Uuid,
        field: &'static str,
        value: &str,
    ) -> Result<User, DbError> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_USER} WHERE tenant_id = $tenant_id AND {field} = $value"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("value", value.to_string()))
            .await?;

        let rows: Vec<UserRow> = result.take(0)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("user", format!("{field}={value}")))?;
        row.try_into_user()
    }

    /// Fetch, mutate and write back, journaling the previous state.
    async fn modify(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        change: impl FnOnce(&mut User),
    ) -> KilnResult<User> {
        let previous = self.get_by_id(tenant_id, id).await?;
        let mut user = previous.clone();
        change(&mut user);
        user.updated_at = Utc::now();

        write(&self.db, "UPDATE", &user).await?;
        transaction::record(Undo::User(Box::new(previous)));
        Ok(user)
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> KilnResult<User> {
        let password_hash = hash_password(&input.password, self.pepper.as_deref())?;
        let now = Utc::now();

        let user = User {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            tenant_id: input.tenant_id,
            username: input.username,
            name: input.name,
            email: input.email,
            password_hash,
            roles: dedup(input.roles),
            claims: dedup(input.claims),
            status: input.status.unwrap_or_default(),
            blocked: false,
            two_factor: TwoFactor::default(),
            refresh_token: None,
            metadata: input
                .metadata
                .unwrap_or(serde_json::Value::Object(Default::default())),
            created_at: now,
            updated_at: now,
            created_by: input.created_by,
            updated_by: input.created_by,
        };

        write(&self.db, "CREATE", &user).await?;
        transaction::record(Undo::Delete {
            table: "user",
            id: user.id.to_string(),
        });

        Ok(user)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> KilnResult<User> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_USER} WHERE id = type::record('user', $id) \
                 AND tenant_id = $tenant_id"
            ))
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("user", id))?;
        Ok(row.try_into_user()?)
    }

    async fn get_by_username(&self, tenant_id: Uuid, username: &str) -> KilnResult<User> {
        Ok(self.find_one(tenant_id, "username", username).await?)
    }

    async fn get_by_email(&self, tenant_id: Uuid, email: &str) -> KilnResult<User> {
        Ok(self.find_one(tenant_id, "email", email).await?)
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, input: UpdateUser) -> KilnResult<User> {
        self.modify(tenant_id, id, |user| {
            if let Some(username) = input.username {
                user.username = username;
            }
            if let Some(name) = input.name {
                user.name = name;
            }
            if let Some(email) = input.email {
                user.email = email;
            }
            if let Some(status) = input.status {
                user.status = status;
            }
            if let Some(blocked) = input.blocked {
                user.blocked = blocked;
            }
            if let Some(roles) = input.roles {
                user.roles = dedup(roles);
            }
            if let Some(claims) = input.claims {
                user.claims = dedup(claims);
            }
            if let Some(two_factor) = input.two_factor {
                user.two_factor = two_factor;
            }
            if let Some(metadata) = input.metadata {
                user.metadata = metadata;
            }
            user.updated_by = input.updated_by;
        })
        .await
    }

    async fn update_password(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        new_password: &str,
    ) -> KilnResult<()> {
        let password_hash = hash_password(new_password, self.pepper.as_deref())?;
        self.modify(tenant_id, id, |user| {
            user.password_hash = password_hash;
            // A password change invalidates outstanding refresh tokens.
            user.refresh_token = None;
        })
        .await?;
        Ok(())
    }

    async fn set_refresh_token(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        token: Option<RefreshToken>,
    ) -> KilnResult<()> {
        self.modify(tenant_id, id, |user| user.refresh_token = token)
            .await?;
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> KilnResult<()> {
        let user = self.get_by_id(tenant_id, id).await?;

        self.db
            .query("DELETE type::record('user', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_query)?;

        transaction::record(Undo::User(Box::new(user)));
        Ok(())
    }

    async fn get_user_claims(&self, tenant_id: Uuid, id: Uuid) -> KilnResult<Vec<Claim>> {
        let user = self.get_by_id(tenant_id, id).await?;
        let roles = role::fetch_by_ids(&self.db, &user.roles).await?;

        let claim_ids: Vec<Uuid> = user
            .claims
            .iter()
            .chain(roles.iter().flat_map(|r| r.claims.iter()))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(claim::fetch_by_ids(&self.db, &claim_ids).await?)
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: UserFilter,
        pagination: Pagination,
    ) -> KilnResult<PaginatedResult<User>> {
        let mut conditions = vec!["tenant_id = $tenant_id"];
        if filter.search.is_some() {
            conditions.push(
                "(string::lowercase(username) CONTAINS $search \
                 OR string::lowercase(email) CONTAINS $search)",
            );
        }
        if filter.status.is_some() {
            conditions.push("status = $status");
        }
        if filter.role_id.is_some() {
            conditions.push("$role_id IN roles");
        }
        let where_clause = conditions.join(" AND ");

        let search = filter.search.map(|s| s.to_lowercase());
        let status = filter.status.map(|s| s.as_str());
        let role_id = optional_uuid_string(filter.role_id);

        let mut count_result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM user WHERE {where_clause} GROUP ALL"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("search", search.clone()))
            .bind(("status", status))
            .bind(("role_id", role_id.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "{SELECT_USER} WHERE {where_clause} \
                 ORDER BY created_at ASC LIMIT $limit START $offset"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("search", search))
            .bind(("status", status))
            .bind(("role_id", role_id))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(UserRow::try_into_user)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

/// Drop duplicate ids, keeping first occurrence order.
fn dedup(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
