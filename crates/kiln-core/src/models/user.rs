//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Locked,
    PendingVerification,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Locked => "locked",
            Self::PendingVerification => "pending_verification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "locked" => Some(Self::Locked),
            "pending_verification" => Some(Self::PendingVerification),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TwoFactor {
    pub enabled: bool,
    /// AES-256-GCM encrypted TOTP secret (base64), once enrolled.
    pub secret: Option<String>,
    /// Set after the first successful code confirmation.
    pub verified: bool,
}

impl TwoFactor {
    /// Whether login must present a TOTP code.
    pub fn is_required(&self) -> bool {
        self.enabled && self.verified && self.secret.is_some()
    }
}

/// Stored refresh token. `value` is the SHA-256 hex of the opaque token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub username: String,
    /// Display name.
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Role ids.
    pub roles: Vec<Uuid>,
    /// Direct claim ids, on top of what the roles grant.
    pub claims: Vec<Uuid>,
    pub status: UserStatus,
    pub blocked: bool,
    #[serde(skip_serializing)]
    pub two_factor: TwoFactor,
    #[serde(skip_serializing)]
    pub refresh_token: Option<RefreshToken>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
}

impl User {
    /// Blocked or non-active users hold no effective permissions.
    pub fn is_enabled(&self) -> bool {
        self.status == UserStatus::Active && !self.blocked
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Fixed id for well-known users; generated when `None`.
    pub id: Option<Uuid>,
    pub tenant_id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
    pub roles: Vec<Uuid>,
    pub claims: Vec<Uuid>,
    pub status: Option<UserStatus>,
    pub metadata: Option<serde_json::Value>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub status: Option<UserStatus>,
    pub blocked: Option<bool>,
    pub roles: Option<Vec<Uuid>>,
    pub claims: Option<Vec<Uuid>>,
    pub two_factor: Option<TwoFactor>,
    pub metadata: Option<serde_json::Value>,
    pub updated_by: Option<Uuid>,
}

/// Optional narrowing of a user listing.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring of username or email.
    pub search: Option<String>,
    pub status: Option<UserStatus>,
    pub role_id: Option<Uuid>,
}
