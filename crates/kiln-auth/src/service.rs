//! Authentication service: password login, refresh rotation, logout and
//! bearer validation.

use chrono::{Duration, Utc};
use kiln_core::models::user::{RefreshToken, UpdateUser, User, UserStatus};
use kiln_core::repository::{Store, UserRepository};
use kiln_core::{AppContext, KilnResult};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::principal::Principal;
use crate::{password, token, totp};

/// Input for the login flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInput {
    pub tenant_id: Uuid,
    pub username_or_email: String,
    pub password: String,
    #[serde(default)]
    pub totp_code: Option<String>,
}

/// A fresh token pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Signed JWT access token.
    pub access_token: String,
    /// Opaque refresh token; only its hash is stored.
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub token_type: &'static str,
}

/// Secrets to show the user once when enrolling two-factor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorEnrollment {
    pub secret: String,
    pub otpauth_uri: String,
}

#[derive(Clone)]
pub struct AuthService<S: Store> {
    store: S,
    config: AuthConfig,
}

fn ensure_active(user: &User) -> Result<(), AuthError> {
    if user.blocked {
        return Err(AuthError::AccountBlocked);
    }
    match user.status {
        UserStatus::Active => Ok(()),
        UserStatus::Locked => Err(AuthError::AccountLocked),
        UserStatus::Inactive => Err(AuthError::AccountInactive),
        UserStatus::PendingVerification => Err(AuthError::AccountPendingVerification),
    }
}

impl<S: Store> AuthService<S> {
    pub fn new(store: S, config: AuthConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    async fn find_login_user(&self, ctx: &AppContext, input: &LoginInput) -> KilnResult<User> {
        let users = self.store.users();
        match ctx
            .run(users.get_by_username(input.tenant_id, &input.username_or_email))
            .await
        {
            Ok(user) => Ok(user),
            Err(err) if err.is_not_found() => ctx
                .run(users.get_by_email(input.tenant_id, &input.username_or_email))
                .await
                .map_err(|err| {
                    if err.is_not_found() {
                        AuthError::InvalidCredentials.into()
                    } else {
                        err
                    }
                }),
            Err(err) => Err(err),
        }
    }

    fn check_second_factor(&self, user: &User, code: Option<&str>) -> Result<(), AuthError> {
        if !user.two_factor.is_required() {
            return Ok(());
        }
        let key = self
            .config
            .two_factor_encryption_key
            .as_ref()
            .ok_or(AuthError::TwoFactorUnavailable)?;
        let sealed = user
            .two_factor
            .secret
            .as_deref()
            .ok_or(AuthError::TwoFactorUnavailable)?;
        let code = code.ok_or(AuthError::TwoFactorRequired)?;

        if totp::verify_code(key, sealed, code, &self.config.totp_issuer, &user.email)? {
            Ok(())
        } else {
            Err(AuthError::TwoFactorInvalidCode)
        }
    }

    async fn issue_tokens(&self, ctx: &AppContext, user: &User) -> KilnResult<TokenPair> {
        let access_token = token::issue_access_token(user.id, user.tenant_id, &self.config)?;
        let refresh_token = token::generate_refresh_token(user.id);
        let stored = RefreshToken {
            value: token::hash_refresh_token(&refresh_token),
            expires_at: Utc::now()
                + Duration::seconds(self.config.refresh_token_lifetime_secs as i64),
        };
        ctx.run(
            self.store
                .users()
                .set_refresh_token(user.tenant_id, user.id, Some(stored)),
        )
        .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.config.access_token_lifetime_secs,
            token_type: "Bearer",
        })
    }

    /// Authenticate with username or email and password.
    ///
    /// Unknown users and wrong passwords are indistinguishable to the caller.
    pub async fn login(&self, ctx: &AppContext, input: LoginInput) -> KilnResult<TokenPair> {
        let user = self.find_login_user(ctx, &input).await?;

        let valid =
            password::verify_password(&input.password, &user.password_hash, self.config.pepper.as_deref())?;
        if !valid {
            warn!(tenant_id = %input.tenant_id, user_id = %user.id, "Login rejected: bad password");
            return Err(AuthError::InvalidCredentials.into());
        }
        ensure_active(&user)?;
        self.check_second_factor(&user, input.totp_code.as_deref())?;

        let pair = self.issue_tokens(ctx, &user).await?;
        info!(tenant_id = %user.tenant_id, user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair. The old token stops working.
    pub async fn refresh(
        &self,
        ctx: &AppContext,
        tenant_id: Uuid,
        raw_refresh_token: &str,
    ) -> KilnResult<TokenPair> {
        let user_id = token::refresh_token_owner(raw_refresh_token)?;
        let user = ctx
            .run(self.store.users().get_by_id(tenant_id, user_id))
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    AuthError::TokenInvalid("unknown refresh token".into()).into()
                } else {
                    err
                }
            })?;

        let stored = user
            .refresh_token
            .as_ref()
            .ok_or_else(|| AuthError::TokenInvalid("refresh token already used".into()))?;
        let presented = token::hash_refresh_token(raw_refresh_token);
        if !bool::from(stored.value.as_bytes().ct_eq(presented.as_bytes())) {
            return Err(AuthError::TokenInvalid("refresh token already used".into()).into());
        }
        if stored.expires_at <= Utc::now() {
            ctx.run(self.store.users().set_refresh_token(tenant_id, user_id, None))
                .await?;
            return Err(AuthError::TokenExpired.into());
        }
        ensure_active(&user)?;

        self.issue_tokens(ctx, &user).await
    }

    pub async fn logout(&self, ctx: &AppContext, tenant_id: Uuid, user_id: Uuid) -> KilnResult<()> {
        ctx.run(self.store.users().set_refresh_token(tenant_id, user_id, None))
            .await?;
        info!(tenant_id = %tenant_id, user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Stateless check of a bearer access token.
    pub fn validate_bearer(&self, raw: &str) -> Result<Principal, AuthError> {
        let claims = token::decode_access_token(raw, &self.config)?;
        Ok(Principal::User {
            tenant_id: claims.tenant_id()?,
            user_id: claims.user_id()?,
        })
    }

    /// Start two-factor enrollment. The secret stays inactive until
    /// [`confirm_two_factor`](Self::confirm_two_factor) succeeds.
    pub async fn enroll_two_factor(
        &self,
        ctx: &AppContext,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> KilnResult<TwoFactorEnrollment> {
        let key = self
            .config
            .two_factor_encryption_key
            .as_ref()
            .ok_or(AuthError::TwoFactorUnavailable)?;
        let user = ctx.run(self.store.users().get_by_id(tenant_id, user_id)).await?;
        let enrollment = totp::enroll(key, &self.config.totp_issuer, &user.email)?;

        let mut two_factor = user.two_factor;
        two_factor.enabled = true;
        two_factor.verified = false;
        two_factor.secret = Some(enrollment.sealed_secret);
        ctx.run(self.store.users().update(
            tenant_id,
            user_id,
            UpdateUser {
                two_factor: Some(two_factor),
                ..Default::default()
            },
        ))
        .await?;

        Ok(TwoFactorEnrollment {
            secret: enrollment.secret_base32,
            otpauth_uri: enrollment.otpauth_uri,
        })
    }

    /// Confirm an enrollment with a first valid code.
    pub async fn confirm_two_factor(
        &self,
        ctx: &AppContext,
        tenant_id: Uuid,
        user_id: Uuid,
        code: &str,
    ) -> KilnResult<()> {
        let key = self
            .config
            .two_factor_encryption_key
            .as_ref()
            .ok_or(AuthError::TwoFactorUnavailable)?;
        let user = ctx.run(self.store.users().get_by_id(tenant_id, user_id)).await?;
        let sealed = user
            .two_factor
            .secret
            .as_deref()
            .ok_or(AuthError::TwoFactorUnavailable)?;
        if !totp::verify_code(key, sealed, code, &self.config.totp_issuer, &user.email)? {
            return Err(AuthError::TwoFactorInvalidCode.into());
        }

        let mut two_factor = user.two_factor.clone();
        two_factor.verified = true;
        ctx.run(self.store.users().update(
            tenant_id,
            user_id,
            UpdateUser {
                two_factor: Some(two_factor),
                ..Default::default()
            },
        ))
        .await?;
        info!(tenant_id = %tenant_id, user_id = %user_id, "Two-factor enabled");
        Ok(())
    }
}
