//! Bootstrap migration bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last applied version of a bootstrap worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationRecord {
    pub name: String,
    pub version: u32,
    pub applied_at: DateTime<Utc>,
}
