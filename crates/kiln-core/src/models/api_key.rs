//! API key domain model.
//!
//! Only the SHA-256 hash and a short prefix of the plaintext key are ever
//! stored. The plaintext is handed to the caller once, at creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::ApiKeySecurityLevel;
use crate::models::claim::ClaimPattern;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// SHA-256 (hex) of the plaintext key.
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// Leading characters of the plaintext, used for lookup.
    pub key_prefix: String,
    pub security_level: ApiKeySecurityLevel,
    pub claims: Vec<ClaimPattern>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<Uuid>,
    pub revocation_reason: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

impl ApiKey {
    /// Active, not revoked and not expired at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.revoked_at.is_none()
            && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiKey {
    pub tenant_id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub security_level: ApiKeySecurityLevel,
    pub claims: Vec<ClaimPattern>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RevokeApiKey {
    pub revoked_by: Option<Uuid>,
    pub reason: Option<String>,
}
