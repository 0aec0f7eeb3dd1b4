//! API key issuance and validation.
//!
//! Plaintext keys look like `kiln_<40 url-safe chars>`. The store keeps the
//! SHA-256 hash and the leading `api_key_prefix_length` characters; lookups
//! go by prefix and then compare hashes in constant time.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use kiln_core::access::ApiKeySecurityLevel;
use kiln_core::catalog::SystemCatalog;
use kiln_core::models::api_key::{ApiKey, CreateApiKey, RevokeApiKey};
use kiln_core::models::claim::ClaimPattern;
use kiln_core::repository::{
    ApiKeyRepository, PaginatedResult, Pagination, Store, TenantRepository,
};
use kiln_core::{AppContext, KilnError, KilnResult};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

use crate::authorization::ResolvedPrincipal;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::principal::Principal;

pub const API_KEY_PREFIX: &str = "kiln_";
const MIN_PREFIX_LENGTH: usize = 4;

/// `kiln_` followed by 30 random bytes as unpadded base64url.
pub fn generate_api_key() -> String {
    let bytes: [u8; 30] = rand::random();
    format!("{API_KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

pub fn hash_api_key(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// Leading `length` characters of the plaintext, never fewer than four.
pub fn key_prefix(plaintext: &str, length: usize) -> String {
    plaintext
        .chars()
        .take(length.max(MIN_PREFIX_LENGTH))
        .collect()
}

/// Request body for key creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApiKey {
    pub name: String,
    #[serde(default)]
    pub security_level: ApiKeySecurityLevel,
    /// Canonical slugs. Empty means "defaults for the security level".
    #[serde(default)]
    pub claims: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A stored key together with its plaintext, which is never shown again.
#[derive(Debug, Clone)]
pub struct CreatedApiKey {
    pub api_key: ApiKey,
    pub plaintext: String,
}

#[derive(Clone)]
pub struct ApiKeyService<S: Store> {
    store: S,
    catalog: Arc<SystemCatalog>,
    config: AuthConfig,
}

impl<S: Store> ApiKeyService<S> {
    pub fn new(store: S, catalog: Arc<SystemCatalog>, config: AuthConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    fn claims_for(&self, input: &NewApiKey) -> KilnResult<Vec<ClaimPattern>> {
        if input.claims.is_empty() {
            let level = input.security_level.security_level();
            return Ok(self
                .catalog
                .generate_default_claims(level)
                .into_iter()
                .map(|generated| generated.pattern)
                .collect());
        }
        input
            .claims
            .iter()
            .map(|slug| {
                let pattern = ClaimPattern::parse(slug)?;
                self.catalog.validate_claim(&pattern)?;
                Ok(pattern)
            })
            .collect()
    }

    /// Mint a key in `tenant_id` on behalf of `issuer`.
    ///
    /// The key can never exceed its issuer: its level must be one the
    /// issuer meets, and each of its claims must be covered by a claim the
    /// issuer holds in that tenant.
    pub async fn create(
        &self,
        ctx: &AppContext,
        tenant_id: Uuid,
        input: NewApiKey,
        issuer: &ResolvedPrincipal,
    ) -> KilnResult<CreatedApiKey> {
        if input.name.trim().is_empty() {
            return Err(KilnError::validation("API key name must not be empty"));
        }
        if input.expires_at.is_some_and(|at| at <= Utc::now()) {
            return Err(KilnError::validation("expiresAt must be in the future"));
        }
        let claims = self.claims_for(&input)?;
        if !issuer.can_delegate_level(input.security_level.security_level()) {
            return Err(KilnError::AuthorizationDenied {
                reason: format!("{} may not mint {} keys", issuer.principal, input.security_level),
            });
        }
        if let Some(claim) = claims.iter().find(|claim| !issuer.can_delegate(claim, tenant_id)) {
            return Err(KilnError::AuthorizationDenied {
                reason: format!("{} may not delegate {claim}", issuer.principal),
            });
        }
        ctx.run(self.store.tenants().get_by_id(tenant_id)).await?;

        let plaintext = generate_api_key();
        let api_key = ctx
            .run(self.store.api_keys().create(CreateApiKey {
                tenant_id,
                name: input.name,
                key_hash: hash_api_key(&plaintext),
                key_prefix: key_prefix(&plaintext, self.config.api_key_prefix_length),
                security_level: input.security_level,
                claims,
                expires_at: input.expires_at,
                created_by: issuer.principal.actor_id(),
            }))
            .await?;

        info!(
            tenant_id = %tenant_id,
            api_key_id = %api_key.id,
            security_level = %api_key.security_level,
            created_by = %issuer.principal,
            "API key created"
        );
        Ok(CreatedApiKey { api_key, plaintext })
    }

    /// Resolve a plaintext key to its stored record.
    ///
    /// On success `last_used_at` is stamped on a detached task; a failed
    /// stamp is only logged.
    pub async fn validate(&self, ctx: &AppContext, plaintext: &str) -> KilnResult<ApiKey> {
        if !plaintext.starts_with(API_KEY_PREFIX) {
            return Err(AuthError::ApiKeyInvalid.into());
        }
        let prefix = key_prefix(plaintext, self.config.api_key_prefix_length);
        let hash = hash_api_key(plaintext);

        let candidates = ctx.run(self.store.api_keys().get_by_prefix(&prefix)).await?;
        let api_key = candidates
            .into_iter()
            .find(|candidate| bool::from(candidate.key_hash.as_bytes().ct_eq(hash.as_bytes())))
            .ok_or(AuthError::ApiKeyInvalid)?;

        let now = Utc::now();
        if !api_key.is_usable(now) {
            return Err(AuthError::ApiKeyUnusable.into());
        }

        let store = self.store.clone();
        let id = api_key.id;
        tokio::spawn(async move {
            if let Err(err) = store.api_keys().touch(id, now).await {
                warn!(api_key_id = %id, error = %err, "Failed to record API key use");
            }
        });

        Ok(api_key)
    }

    pub async fn revoke(
        &self,
        ctx: &AppContext,
        tenant_id: Uuid,
        id: Uuid,
        revoked_by: Principal,
        reason: Option<String>,
    ) -> KilnResult<ApiKey> {
        ctx.run(self.store.api_keys().revoke(
            tenant_id,
            id,
            RevokeApiKey {
                revoked_by: revoked_by.actor_id(),
                reason,
            },
        ))
        .await
    }

    pub async fn list(
        &self,
        ctx: &AppContext,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> KilnResult<PaginatedResult<ApiKey>> {
        ctx.run(self.store.api_keys().list(tenant_id, pagination)).await
    }
}
