//! SurrealDB repository implementations.

pub(crate) mod api_key;
pub(crate) mod certificate;
pub(crate) mod claim;
pub(crate) mod migration;
pub(crate) mod role;
pub(crate) mod tenant;
pub(crate) mod user;

pub use api_key::SurrealApiKeyRepository;
pub use certificate::SurrealCertificateRepository;
pub use claim::SurrealClaimRepository;
pub use migration::SurrealMigrationRepository;
pub use role::SurrealRoleRepository;
pub use tenant::SurrealTenantRepository;
pub use user::{SurrealUserRepository, hash_password, verify_password};

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

/// Row struct for id-only selections.
#[derive(Debug, SurrealValue)]
pub(crate) struct IdRow {
    pub(crate) record_id: String,
}

pub(crate) fn parse_uuid(value: &str, field: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("invalid {field} UUID: {e}")))
}

pub(crate) fn parse_optional_uuid(value: Option<&str>, field: &str) -> Result<Option<Uuid>, DbError> {
    value.map(|v| parse_uuid(v, field)).transpose()
}

pub(crate) fn parse_uuids(values: &[String], field: &str) -> Result<Vec<Uuid>, DbError> {
    values.iter().map(|v| parse_uuid(v, field)).collect()
}

pub(crate) fn uuid_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

pub(crate) fn optional_uuid_string(id: Option<Uuid>) -> Option<String> {
    id.map(|id| id.to_string())
}

pub(crate) fn decode_enum<T>(value: &str, field: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T, DbError> {
    parse(value).ok_or_else(|| DbError::Decode(format!("unknown {field}: {value}")))
}
