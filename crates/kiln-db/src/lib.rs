//! Kiln Database: SurrealDB connection management, schema migrations and
//! the repository implementations behind [`kiln_core::repository::Store`].
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - The SurrealDB-backed [`SurrealStore`] with compensating transactions
//! - Error types ([`DbError`])

mod connection;
mod error;
pub mod repository;
mod schema;
mod store;
mod transaction;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use repository::{hash_password, verify_password};
pub use schema::{latest_schema_version, run_migrations};
pub use store::SurrealStore;
