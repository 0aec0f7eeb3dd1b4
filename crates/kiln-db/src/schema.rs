//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct SchemaVersionRow {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "identity_and_pki",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "bootstrap_tracking",
        sql: SCHEMA_V2,
    },
];

// -----------------------------------------------------------------------
// Schema v1: identity and certificate tables
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Tenants (global scope)
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD slug ON TABLE tenant TYPE string;
DEFINE FIELD name ON TABLE tenant TYPE string;
DEFINE FIELD domain ON TABLE tenant TYPE string;
DEFINE FIELD owner_id ON TABLE tenant TYPE option<string>;
DEFINE FIELD contact_email ON TABLE tenant TYPE option<string>;
DEFINE FIELD status ON TABLE tenant TYPE string \
    ASSERT $value IN ['active', 'inactive', 'suspended'];
DEFINE FIELD require_2fa ON TABLE tenant TYPE bool DEFAULT false;
DEFINE FIELD activated_at ON TABLE tenant TYPE option<datetime>;
DEFINE FIELD deactivated_at ON TABLE tenant TYPE option<datetime>;
DEFINE FIELD metadata ON TABLE tenant TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD created_by ON TABLE tenant TYPE option<string>;
DEFINE FIELD updated_by ON TABLE tenant TYPE option<string>;
DEFINE INDEX idx_tenant_slug ON TABLE tenant COLUMNS slug UNIQUE;
DEFINE INDEX idx_tenant_domain ON TABLE tenant COLUMNS domain UNIQUE;

-- =======================================================================
-- Users (tenant-scoped)
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE user TYPE string;
DEFINE FIELD username ON TABLE user TYPE string;
DEFINE FIELD name ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD roles ON TABLE user TYPE array<string> DEFAULT [];
DEFINE FIELD claims ON TABLE user TYPE array<string> DEFAULT [];
DEFINE FIELD status ON TABLE user TYPE string \
    ASSERT $value IN ['active', 'inactive', 'locked', \
    'pending_verification'];
DEFINE FIELD blocked ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD two_factor_enabled ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD two_factor_secret ON TABLE user TYPE option<string>;
DEFINE FIELD two_factor_verified ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD refresh_token_hash ON TABLE user TYPE option<string>;
DEFINE FIELD refresh_token_expires_at ON TABLE user TYPE option<datetime>;
DEFINE FIELD metadata ON TABLE user TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD created_by ON TABLE user TYPE option<string>;
DEFINE FIELD updated_by ON TABLE user TYPE option<string>;
DEFINE INDEX idx_user_tenant_username ON TABLE user \
    COLUMNS tenant_id, username UNIQUE;
DEFINE INDEX idx_user_tenant_email ON TABLE user \
    COLUMNS tenant_id, email UNIQUE;

-- =======================================================================
-- Roles (global)
-- =======================================================================
DEFINE TABLE role SCHEMAFULL;
DEFINE FIELD slug ON TABLE role TYPE string;
DEFINE FIELD name ON TABLE role TYPE string;
DEFINE FIELD description ON TABLE role TYPE string;
DEFINE FIELD security_level ON TABLE role TYPE string \
    ASSERT $value IN ['superuser', 'admin', 'manager', 'user', \
    'auditor', 'guest', 'none'];
DEFINE FIELD is_super_user ON TABLE role TYPE bool DEFAULT false;
DEFINE FIELD claims ON TABLE role TYPE array<string> DEFAULT [];
DEFINE FIELD created_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_role_slug ON TABLE role COLUMNS slug UNIQUE;

-- =======================================================================
-- Claims (global or tenant-scoped)
-- =======================================================================
DEFINE TABLE claim SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE claim TYPE option<string>;
-- tenant id, or 'global' for system claims; keeps the unique index total.
DEFINE FIELD scope_key ON TABLE claim TYPE string;
DEFINE FIELD service ON TABLE claim TYPE string;
DEFINE FIELD module ON TABLE claim TYPE string;
DEFINE FIELD action ON TABLE claim TYPE string;
DEFINE FIELD security_level ON TABLE claim TYPE string;
DEFINE FIELD slug ON TABLE claim TYPE string;
DEFINE FIELD created_at ON TABLE claim TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_claim_scope_slug ON TABLE claim \
    COLUMNS scope_key, slug UNIQUE;

-- =======================================================================
-- API keys (tenant-scoped)
-- =======================================================================
DEFINE TABLE api_key SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE api_key TYPE string;
DEFINE FIELD name ON TABLE api_key TYPE string;
DEFINE FIELD key_hash ON TABLE api_key TYPE string;
DEFINE FIELD key_prefix ON TABLE api_key TYPE string;
DEFINE FIELD security_level ON TABLE api_key TYPE string \
    ASSERT $value IN ['superuser', 'admin', 'write', 'read', 'none'];
DEFINE FIELD claims ON TABLE api_key TYPE array<string> DEFAULT [];
DEFINE FIELD expires_at ON TABLE api_key TYPE option<datetime>;
DEFINE FIELD is_active ON TABLE api_key TYPE bool DEFAULT true;
DEFINE FIELD revoked_at ON TABLE api_key TYPE option<datetime>;
DEFINE FIELD revoked_by ON TABLE api_key TYPE option<string>;
DEFINE FIELD revocation_reason ON TABLE api_key TYPE option<string>;
DEFINE FIELD last_used_at ON TABLE api_key TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE api_key TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD created_by ON TABLE api_key TYPE option<string>;
DEFINE INDEX idx_apikey_hash ON TABLE api_key COLUMNS key_hash UNIQUE;
DEFINE INDEX idx_apikey_prefix ON TABLE api_key COLUMNS key_prefix;

-- =======================================================================
-- Certificates (tenant-scoped, immutable)
-- =======================================================================
DEFINE TABLE certificate SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE certificate TYPE string;
DEFINE FIELD certificate_type ON TABLE certificate TYPE string \
    ASSERT $value IN ['root', 'intermediate', 'end_entity'];
DEFINE FIELD name ON TABLE certificate TYPE string;
DEFINE FIELD slug ON TABLE certificate TYPE string;
DEFINE FIELD config ON TABLE certificate TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD serial_number ON TABLE certificate TYPE string;
DEFINE FIELD pem_certificate ON TABLE certificate TYPE string;
DEFINE FIELD pem_private_key ON TABLE certificate TYPE string;
DEFINE FIELD pem_csr ON TABLE certificate TYPE string;
DEFINE FIELD not_before ON TABLE certificate TYPE datetime;
DEFINE FIELD not_after ON TABLE certificate TYPE datetime;
DEFINE FIELD created_at ON TABLE certificate TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_certificate_tenant_slug ON TABLE certificate \
    COLUMNS tenant_id, slug UNIQUE;
DEFINE INDEX idx_certificate_serial ON TABLE certificate \
    COLUMNS serial_number UNIQUE;
DEFINE INDEX idx_certificate_tenant_type ON TABLE certificate \
    COLUMNS tenant_id, certificate_type;
";

// -----------------------------------------------------------------------
// Schema v2: bootstrap worker bookkeeping
// -----------------------------------------------------------------------

const SCHEMA_V2: &str = "\
DEFINE TABLE bootstrap_migration SCHEMAFULL;
DEFINE FIELD name ON TABLE bootstrap_migration TYPE string;
DEFINE FIELD version ON TABLE bootstrap_migration TYPE int;
DEFINE FIELD applied_at ON TABLE bootstrap_migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_migration_name ON TABLE bootstrap_migration \
    COLUMNS name UNIQUE;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending schema migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<SchemaVersionRow> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying schema migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Latest schema version known to this build.
pub fn latest_schema_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn every_table_is_schemafull() {
        for migration in MIGRATIONS {
            for line in migration.sql.lines().filter(|l| l.starts_with("DEFINE TABLE")) {
                assert!(line.contains("SCHEMAFULL"), "{line}");
            }
        }
    }
}
