//! [`Store`] implementation bundling every SurrealDB repository.

use std::sync::Arc;

use kiln_core::error::KilnResult;
use kiln_core::repository::Store;
use surrealdb::{Connection, Surreal};
use tokio::sync::Mutex;
use tracing::debug;

use crate::repository::{
    SurrealApiKeyRepository, SurrealCertificateRepository, SurrealClaimRepository,
    SurrealMigrationRepository, SurrealRoleRepository, SurrealTenantRepository,
    SurrealUserRepository,
};
use crate::transaction::{self, Journal};

/// All repositories over one SurrealDB handle.
///
/// Transactional sections are serialized through `tx_lock`; a section that
/// fails has its journaled writes compensated before the error is returned.
pub struct SurrealStore<C: Connection> {
    db: Surreal<C>,
    tenants: SurrealTenantRepository<C>,
    users: SurrealUserRepository<C>,
    roles: SurrealRoleRepository<C>,
    claims: SurrealClaimRepository<C>,
    api_keys: SurrealApiKeyRepository<C>,
    certificates: SurrealCertificateRepository<C>,
    migrations: SurrealMigrationRepository<C>,
    tx_lock: Arc<Mutex<()>>,
}

impl<C: Connection> Clone for SurrealStore<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            tenants: self.tenants.clone(),
            users: self.users.clone(),
            roles: self.roles.clone(),
            claims: self.claims.clone(),
            api_keys: self.api_keys.clone(),
            certificates: self.certificates.clone(),
            migrations: self.migrations.clone(),
            tx_lock: Arc::clone(&self.tx_lock),
        }
    }
}

impl<C: Connection> SurrealStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::build(db.clone(), SurrealUserRepository::new(db))
    }

    /// Like [`SurrealStore::new`] with a server-side password pepper.
    pub fn with_pepper(db: Surreal<C>, pepper: String) -> Self {
        Self::build(db.clone(), SurrealUserRepository::with_pepper(db, pepper))
    }

    fn build(db: Surreal<C>, users: SurrealUserRepository<C>) -> Self {
        Self {
            tenants: SurrealTenantRepository::new(db.clone()),
            users,
            roles: SurrealRoleRepository::new(db.clone()),
            claims: SurrealClaimRepository::new(db.clone()),
            api_keys: SurrealApiKeyRepository::new(db.clone()),
            certificates: SurrealCertificateRepository::new(db.clone()),
            migrations: SurrealMigrationRepository::new(db.clone()),
            db,
            tx_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn client(&self) -> &Surreal<C> {
        &self.db
    }
}

impl<C: Connection> Store for SurrealStore<C> {
    type Tenants = SurrealTenantRepository<C>;
    type Users = SurrealUserRepository<C>;
    type Roles = SurrealRoleRepository<C>;
    type Claims = SurrealClaimRepository<C>;
    type ApiKeys = SurrealApiKeyRepository<C>;
    type Certificates = SurrealCertificateRepository<C>;
    type Migrations = SurrealMigrationRepository<C>;

    fn tenants(&self) -> &Self::Tenants {
        &self.tenants
    }

    fn users(&self) -> &Self::Users {
        &self.users
    }

    fn roles(&self) -> &Self::Roles {
        &self.roles
    }

    fn claims(&self) -> &Self::Claims {
        &self.claims
    }

    fn api_keys(&self) -> &Self::ApiKeys {
        &self.api_keys
    }

    fn certificates(&self) -> &Self::Certificates {
        &self.certificates
    }

    fn migrations(&self) -> &Self::Migrations {
        &self.migrations
    }

    async fn with_transaction<T, F, Fut>(&self, f: F) -> KilnResult<T>
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = KilnResult<T>> + Send,
    {
        // Nested sections join the enclosing journal.
        if transaction::in_transaction() {
            return f().await;
        }

        let _guard = self.tx_lock.lock().await;
        let journal = Journal::default();
        let result = transaction::scope(journal.clone(), f()).await;

        match result {
            Ok(value) => {
                let committed = journal.take().len();
                debug!(writes = committed, "Committed transaction");
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "Transaction failed, compensating");
                journal.compensate(&self.db).await;
                Err(err)
            }
        }
    }
}
