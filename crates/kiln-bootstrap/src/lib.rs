//! Kiln Bootstrap: the ordered seeding that turns an empty store into a
//! working control plane.
//!
//! Workers run in a fixed order: global tenant, default roles, system
//! claims, root certificate, root user. Each looks up its own output
//! and skips when it is already there, so a run can be repeated safely.

pub mod config;
pub mod engine;
pub mod worker;
pub mod workers;

pub use config::{BootstrapConfig, RootUserConfig};
pub use engine::{BootstrapEngine, BootstrapFailure, BootstrapReport};
pub use worker::{BootstrapEnv, MigrationWorker, Outcome, SKIPPED_PATH_ENTRY};
