//! Kiln Core: domain models, the access algebra, the system catalog,
//! diagnostics and the repository contracts shared by every Kiln crate.

pub mod access;
pub mod catalog;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod repository;
pub mod well_known;

pub use context::AppContext;
pub use diagnostics::Diagnostics;
pub use error::{ErrorKind, KilnError, KilnResult};
