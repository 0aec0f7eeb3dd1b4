//! The five default workers, in the order they must run.

mod claims;
mod roles;
mod root_certificate;
mod tenant;
mod users;

use kiln_core::repository::Store;

pub use claims::DefaultClaimsMigration;
pub use roles::DefaultRolesMigration;
pub use root_certificate::RootCertificateMigration;
pub use tenant::DefaultTenantMigration;
pub use users::DefaultUsersMigration;

use crate::worker::MigrationWorker;

/// Default workers; each depends on the ones before it.
pub fn default_workers<S: Store>() -> Vec<Box<dyn MigrationWorker<S>>> {
    vec![
        Box::new(DefaultTenantMigration),
        Box::new(DefaultRolesMigration),
        Box::new(DefaultClaimsMigration),
        Box::new(RootCertificateMigration),
        Box::new(DefaultUsersMigration),
    ]
}
