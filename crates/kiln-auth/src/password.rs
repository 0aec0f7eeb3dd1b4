//! Password verification and policy.

use argon2::{Argon2, PasswordVerifier};

use crate::error::AuthError;

/// Verify a plaintext password against an Argon2id PHC-format hash.
///
/// `pepper` is prepended to the password and must match the pepper the
/// store hashed with. A malformed stored hash is a [`AuthError::Crypto`].
pub fn verify_password(
    password: &str,
    hash: &str,
    pepper: Option<&str>,
) -> Result<bool, AuthError> {
    let peppered: String;
    let input = match pepper {
        Some(p) => {
            peppered = format!("{p}{password}");
            peppered.as_bytes()
        }
        None => password.as_bytes(),
    };

    let parsed = argon2::PasswordHash::new(hash)
        .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(input, &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
    }
}

/// Reject passwords shorter than `min_length` characters.
pub fn check_policy(password: &str, min_length: usize) -> Result<(), AuthError> {
    if password.chars().count() < min_length {
        return Err(AuthError::PasswordTooShort(min_length));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use argon2::PasswordHasher;
    use argon2::password_hash::SaltString;
    use argon2::password_hash::rand_core::OsRng;

    use super::*;

    fn hash(password: &str, pepper: Option<&str>) -> String {
        let input = format!("{}{password}", pepper.unwrap_or_default());
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(input.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    #[test]
    fn correct_password_matches() {
        let stored = hash("hunter2", None);
        assert!(verify_password("hunter2", &stored, None).unwrap());
        assert!(!verify_password("hunter3", &stored, None).unwrap());
    }

    #[test]
    fn pepper_must_match() {
        let stored = hash("hunter2", Some("pepper!"));
        assert!(verify_password("hunter2", &stored, Some("pepper!")).unwrap());
        assert!(!verify_password("hunter2", &stored, None).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(matches!(
            verify_password("pw", "not-a-hash", None),
            Err(AuthError::Crypto(_))
        ));
    }

    #[test]
    fn policy_counts_characters() {
        assert!(check_policy("ünïcödé-pässwörd", 12).is_ok());
        assert!(matches!(
            check_policy("short", 12),
            Err(AuthError::PasswordTooShort(12))
        ));
    }
}
