//! Settings consumed by [`AuthService`](crate::AuthService) and
//! [`ApiKeyService`](crate::ApiKeyService). The server builds this from its
//! `[auth]` section; every field below is read by one of the two services.

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Ed25519 signing key (PEM) for access tokens.
    pub jwt_private_key_pem: String,
    /// Ed25519 verification key (PEM).
    pub jwt_public_key_pem: String,
    pub access_token_lifetime_secs: u64,
    /// Lifetime of a session and of the refresh token bound to it.
    pub refresh_token_lifetime_secs: u64,
    /// Written to and required in the `iss` claim.
    pub jwt_issuer: String,
    /// Server-side secret mixed into every Argon2id password hash.
    pub pepper: Option<String>,
    /// Shortest password accepted when a user is created.
    pub min_password_length: usize,
    /// Seals TOTP secrets at rest. Without it two-factor enrollment is refused.
    pub two_factor_encryption_key: Option<[u8; 32]>,
    /// Label authenticator apps show next to the account.
    pub totp_issuer: String,
    /// Plaintext characters of an API key kept for lookup.
    pub api_key_prefix_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            access_token_lifetime_secs: 15 * 60,
            refresh_token_lifetime_secs: 30 * 24 * 60 * 60,
            jwt_issuer: "kiln".into(),
            pepper: None,
            min_password_length: 12,
            two_factor_encryption_key: None,
            totp_issuer: "Kiln".into(),
            api_key_prefix_length: 12,
        }
    }
}
