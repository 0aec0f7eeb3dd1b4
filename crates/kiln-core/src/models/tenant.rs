//! Tenant domain model.
//!
//! Tenants provide full data isolation. Users, API keys and certificates
//! are all owned by a tenant and deleted with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl TenantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    /// URL-safe unique identifier (e.g., `acme`).
    pub slug: String,
    pub name: String,
    /// Unique DNS domain of the tenant.
    pub domain: String,
    /// The user who owns the tenant. Set once the owner exists.
    pub owner_id: Option<Uuid>,
    pub contact_email: Option<String>,
    pub status: TenantStatus,
    /// Whether every user of the tenant must enroll two-factor auth.
    pub require_2fa: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    /// Fixed id for well-known tenants; generated when `None`.
    pub id: Option<Uuid>,
    pub slug: String,
    pub name: String,
    pub domain: String,
    pub contact_email: Option<String>,
    pub require_2fa: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTenant {
    pub name: Option<String>,
    pub domain: Option<String>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub owner_id: Option<Option<Uuid>>,
    pub contact_email: Option<Option<String>>,
    /// Transitions stamp `activated_at` / `deactivated_at`.
    pub status: Option<TenantStatus>,
    pub require_2fa: Option<bool>,
    pub metadata: Option<serde_json::Value>,
    pub updated_by: Option<Uuid>,
}
