//! Database-specific error types and conversions.

use kiln_core::error::KilnError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Malformed row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Unique constraint violated on {entity}: {detail}")]
    Conflict { entity: String, detail: String },
}

impl DbError {
    /// Classify a statement error, turning unique-index and duplicate-id
    /// violations into [`DbError::Conflict`].
    pub fn from_query(err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if message.contains("already contains") || message.contains("already exists") {
            return Self::Conflict {
                entity: conflicting_entity(&message),
                detail: message,
            };
        }
        Self::Query(message)
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

/// Pull the table name out of `index `idx_<table>_...`` or
/// `record `<table>:...``.
fn conflicting_entity(message: &str) -> String {
    let quoted = message.split('`').nth(1).unwrap_or_default();
    let table = match quoted.strip_prefix("idx_") {
        Some(index) => index.split('_').next().unwrap_or_default(),
        None => quoted.split(':').next().unwrap_or_default(),
    };
    match table {
        "" => "record".to_string(),
        "apikey" => "api key".to_string(),
        other => other.to_string(),
    }
}

impl From<DbError> for KilnError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => KilnError::NotFound { entity, id },
            DbError::Conflict { entity, detail } => KilnError::AlreadyExists {
                entity,
                key: detail,
            },
            other => KilnError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_is_taken_from_index_name() {
        assert_eq!(
            conflicting_entity(
                "Database index `idx_tenant_slug` already contains 'acme', with record `tenant:x`"
            ),
            "tenant"
        );
        assert_eq!(
            conflicting_entity("Database record `certificate:abc` already exists"),
            "certificate"
        );
        assert_eq!(conflicting_entity("no quotes here"), "record");
    }

    #[test]
    fn conflicts_become_already_exists() {
        let err: KilnError = DbError::Conflict {
            entity: "user".into(),
            detail: "dup".into(),
        }
        .into();
        assert!(err.is_conflict());
        assert_eq!(err.code(), "user_already_exists");
    }
}
