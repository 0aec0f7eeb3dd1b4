//! Authenticated callers.

use std::fmt;

use kiln_core::well_known::{GLOBAL_TENANT_ID, SYSTEM_PRINCIPAL_ID};
use uuid::Uuid;

/// Who is making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    User { tenant_id: Uuid, user_id: Uuid },
    ApiKey { tenant_id: Uuid, key_id: Uuid },
    /// The control plane itself (bootstrap, background jobs).
    System,
}

impl Principal {
    pub fn tenant_id(&self) -> Uuid {
        match self {
            Self::User { tenant_id, .. } | Self::ApiKey { tenant_id, .. } => *tenant_id,
            Self::System => GLOBAL_TENANT_ID,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::User { user_id, .. } => *user_id,
            Self::ApiKey { key_id, .. } => *key_id,
            Self::System => SYSTEM_PRINCIPAL_ID,
        }
    }

    /// Id recorded in `created_by` / `updated_by`.
    pub fn actor_id(&self) -> Option<Uuid> {
        match self {
            Self::System => None,
            _ => Some(self.id()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::ApiKey { .. } => "api_key",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}
