//! Authentication error types.

use kiln_core::error::KilnError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is locked")]
    AccountLocked,

    #[error("account is inactive")]
    AccountInactive,

    #[error("account is blocked")]
    AccountBlocked,

    #[error("account is pending verification")]
    AccountPendingVerification,

    #[error("two-factor code required")]
    TwoFactorRequired,

    #[error("invalid two-factor code")]
    TwoFactorInvalidCode,

    #[error("two-factor authentication is not configured")]
    TwoFactorUnavailable,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("invalid API key")]
    ApiKeyInvalid,

    #[error("API key is revoked or expired")]
    ApiKeyUnusable,

    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for KilnError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::PasswordTooShort(_) => KilnError::validation(err.to_string()),
            AuthError::TwoFactorUnavailable => KilnError::Internal(err.to_string()),
            AuthError::Crypto(msg) => KilnError::Crypto(msg),
            AuthError::InvalidCredentials
            | AuthError::AccountLocked
            | AuthError::AccountInactive
            | AuthError::AccountBlocked
            | AuthError::AccountPendingVerification
            | AuthError::TwoFactorRequired
            | AuthError::TwoFactorInvalidCode
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_)
            | AuthError::ApiKeyInvalid
            | AuthError::ApiKeyUnusable => KilnError::AuthenticationFailed {
                reason: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use kiln_core::ErrorKind;

    use super::*;

    #[test]
    fn credentials_failures_are_authentication_errors() {
        let err: KilnError = AuthError::TwoFactorRequired.into();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.code(), "unauthenticated");
    }

    #[test]
    fn policy_failures_are_validation_errors() {
        let err: KilnError = AuthError::PasswordTooShort(12).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
