//! SurrealDB implementation of [`MigrationRepository`].
//!
//! One row per bootstrap worker, keyed by worker name.

use chrono::{DateTime, Utc};
use kiln_core::error::KilnResult;
use kiln_core::models::migration::MigrationRecord;
use kiln_core::repository::MigrationRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use crate::error::DbError;
use crate::transaction::{self, Undo};

#[derive(Debug, SurrealValue)]
struct MigrationRow {
    name: String,
    version: u32,
    applied_at: DateTime<Utc>,
}

pub(crate) async fn write<C: Connection>(
    db: &Surreal<C>,
    verb: &str,
    record: &MigrationRecord,
) -> Result<(), DbError> {
    db.query(format!(
        "{verb} type::record('bootstrap_migration', $name) SET \
         name = $name, version = $version, applied_at = $applied_at"
    ))
    .bind(("name", record.name.clone()))
    .bind(("version", record.version))
    .bind(("applied_at", record.applied_at))
    .await
    .map_err(DbError::from_query)?
    .check()
    .map_err(DbError::from_query)?;
    Ok(())
}

/// SurrealDB implementation of the bootstrap Migration repository.
pub struct SurrealMigrationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealMigrationRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealMigrationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> MigrationRepository for SurrealMigrationRepository<C> {
    async fn applied_version(&self, name: &str) -> KilnResult<Option<MigrationRecord>> {
        let mut result = self
            .db
            .query("SELECT name, version, applied_at FROM type::record('bootstrap_migration', $name)")
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<MigrationRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().next().map(|row| MigrationRecord {
            name: row.name,
            version: row.version,
            applied_at: row.applied_at,
        }))
    }

    async fn record(&self, name: &str, version: u32) -> KilnResult<MigrationRecord> {
        let previous = self.applied_version(name).await?;
        let record = MigrationRecord {
            name: name.to_string(),
            version,
            applied_at: Utc::now(),
        };

        write(&self.db, "UPSERT", &record).await?;
        transaction::record(match previous {
            Some(previous) => Undo::Migration(previous),
            None => Undo::Delete {
                table: "bootstrap_migration",
                id: name.to_string(),
            },
        });

        Ok(record)
    }

    async fn remove(&self, name: &str) -> KilnResult<()> {
        let previous = self.applied_version(name).await?;

        self.db
            .query("DELETE type::record('bootstrap_migration', $name)")
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_query)?;

        if let Some(previous) = previous {
            transaction::record(Undo::Migration(previous));
        }
        Ok(())
    }
}
