//! TOTP (RFC 6238) codes and AES-256-GCM sealing of the shared secret.
//!
//! A user's `two_factor.secret` holds `base64(nonce || ciphertext || tag)`;
//! the plaintext secret never reaches the store.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;

const NONCE_LEN: usize = 12;
const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECS: u64 = 30;

pub fn seal_secret(key: &[u8; 32], plaintext: &[u8]) -> Result<String, AuthError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM encrypt: {e}")))?;

    let mut sealed = nonce.to_vec();
    sealed.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(sealed))
}

pub fn open_secret(key: &[u8; 32], sealed: &str) -> Result<Vec<u8>, AuthError> {
    let sealed = STANDARD
        .decode(sealed)
        .map_err(|e| AuthError::Crypto(format!("base64 decode: {e}")))?;
    if sealed.len() <= NONCE_LEN {
        return Err(AuthError::Crypto("sealed secret too short".into()));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM decrypt: {e}")))
}

fn totp(secret: Vec<u8>, issuer: &str, account: &str) -> Result<TOTP, AuthError> {
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECS,
        secret,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::Crypto(format!("TOTP init: {e}")))
}

/// A new enrollment.
#[derive(Debug, Clone)]
pub struct Enrollment {
    /// Base32 secret for manual entry.
    pub secret_base32: String,
    pub otpauth_uri: String,
    /// The secret sealed with the configured key, ready to store.
    pub sealed_secret: String,
}

pub fn enroll(key: &[u8; 32], issuer: &str, account: &str) -> Result<Enrollment, AuthError> {
    let secret = Secret::generate_secret();
    let raw = secret
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret bytes: {e}")))?;
    let sealed_secret = seal_secret(key, &raw)?;
    let otpauth_uri = totp(raw, issuer, account)?.get_url();

    Ok(Enrollment {
        secret_base32: secret.to_encoded().to_string(),
        otpauth_uri,
        sealed_secret,
    })
}

/// Check `code` against a sealed secret, allowing one step of skew.
pub fn verify_code(
    key: &[u8; 32],
    sealed_secret: &str,
    code: &str,
    issuer: &str,
    account: &str,
) -> Result<bool, AuthError> {
    let raw = open_secret(key, sealed_secret)?;
    totp(raw, issuer, account)?
        .check_current(code)
        .map_err(|e| AuthError::Crypto(format!("TOTP check: {e}")))
}

/// The code currently valid for a sealed secret.
pub fn current_code(
    key: &[u8; 32],
    sealed_secret: &str,
    issuer: &str,
    account: &str,
) -> Result<String, AuthError> {
    let raw = open_secret(key, sealed_secret)?;
    totp(raw, issuer, account)?
        .generate_current()
        .map_err(|e| AuthError::Crypto(format!("TOTP generate: {e}")))
}
