//! Undo journal backing [`Store::with_transaction`].
//!
//! The SurrealDB SDK does not expose interactive transactions, so a
//! transactional section records one compensating action per write in a
//! task-local journal. When the section fails the store replays the
//! journal in reverse.
//!
//! The outcome is all-or-nothing, but not isolated: sections are
//! serialized against each other by the store's transaction lock, while
//! plain readers can observe a section's writes before it finishes.
//! Only writes awaited on the section's own task are journaled; work
//! spawned elsewhere, such as the API key `last_used_at` stamp, is not
//! part of the section. Callers must not drop a write mid-flight inside a
//! section (see `AppContext::shielded`).
//!
//! [`Store::with_transaction`]: kiln_core::repository::Store::with_transaction

use std::sync::{Arc, Mutex};

use kiln_core::models::{
    api_key::ApiKey, certificate::Certificate, claim::Claim, migration::MigrationRecord,
    role::Role, tenant::Tenant, user::User,
};
use surrealdb::{Connection, Surreal};
use tracing::{trace, warn};

use crate::error::DbError;
use crate::repository::{api_key, certificate, claim, migration, role, tenant, user};

/// Compensating action for one write.
#[derive(Debug)]
pub(crate) enum Undo {
    /// Undo a create.
    Delete { table: &'static str, id: String },
    /// Undo an update or delete by writing the previous state back.
    Tenant(Box<Tenant>),
    User(Box<User>),
    Role(Box<Role>),
    Claim(Box<Claim>),
    ApiKey(Box<ApiKey>),
    Certificate(Box<Certificate>),
    Migration(MigrationRecord),
    /// Re-grant a deleted claim to the roles and users that held it.
    Grant {
        claim_id: String,
        roles: Vec<String>,
        users: Vec<String>,
    },
}

impl Undo {
    async fn apply<C: Connection>(self, db: &Surreal<C>) -> Result<(), DbError> {
        match self {
            Undo::Delete { table, id } => {
                db.query("DELETE type::record($table, $id)")
                    .bind(("table", table))
                    .bind(("id", id))
                    .await
                    .map_err(DbError::from_query)?
                    .check()
                    .map_err(DbError::from_query)?;
                Ok(())
            }
            Undo::Tenant(entity) => tenant::write(db, "UPSERT", &entity).await,
            Undo::User(entity) => user::write(db, "UPSERT", &entity).await,
            Undo::Role(entity) => role::write(db, "UPSERT", &entity).await,
            Undo::Claim(entity) => claim::write(db, "UPSERT", &entity).await,
            Undo::ApiKey(entity) => api_key::write(db, "UPSERT", &entity).await,
            Undo::Certificate(entity) => certificate::write(db, "UPSERT", &entity).await,
            Undo::Migration(record) => migration::write(db, "UPSERT", &record).await,
            Undo::Grant {
                claim_id,
                roles,
                users,
            } => {
                db.query(
                    "UPDATE role SET claims = array::union(claims, [$claim]) \
                     WHERE meta::id(id) IN $roles; \
                     UPDATE user SET claims = array::union(claims, [$claim]) \
                     WHERE meta::id(id) IN $users;",
                )
                .bind(("claim", claim_id))
                .bind(("roles", roles))
                .bind(("users", users))
                .await
                .map_err(DbError::from_query)?
                .check()
                .map_err(DbError::from_query)?;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<Undo>>>);

impl Journal {
    fn push(&self, undo: Undo) {
        if let Ok(mut entries) = self.0.lock() {
            entries.push(undo);
        }
    }

    pub(crate) fn take(&self) -> Vec<Undo> {
        self.0
            .lock()
            .map(|mut entries| std::mem::take(&mut *entries))
            .unwrap_or_default()
    }

    /// Replay the journal newest-first. Failures are logged and skipped so
    /// one bad entry does not strand the rest.
    pub(crate) async fn compensate<C: Connection>(&self, db: &Surreal<C>) {
        let entries = self.take();
        let total = entries.len();
        for undo in entries.into_iter().rev() {
            if let Err(err) = undo.apply(db).await {
                warn!(error = %err, "Failed to undo transactional write");
            }
        }
        if total > 0 {
            warn!(writes = total, "Rolled back transaction");
        }
    }
}

tokio::task_local! {
    static JOURNAL: Journal;
}

/// Record `undo` if the current task is inside a transactional section.
pub(crate) fn record(undo: Undo) {
    if JOURNAL.try_with(|journal| journal.push(undo)).is_err() {
        trace!("Write outside a transactional section, not journaled");
    }
}

pub(crate) fn in_transaction() -> bool {
    JOURNAL.try_with(|_| ()).is_ok()
}

/// Run `fut` with `journal` as the current task's journal.
pub(crate) async fn scope<F: Future>(journal: Journal, fut: F) -> F::Output {
    JOURNAL.scope(journal, fut).await
}
