//! RSA key material and its bridge into rcgen.
//!
//! rcgen signs through [`rcgen::RemoteKeyPair`], so every key size the
//! `rsa` crate can generate (up to 8192 bits) is usable for issuance.

use std::fmt;

use kiln_core::models::certificate::{KeySize, SignatureAlgorithm};
use kiln_core::{KilnError, KilnResult};
use rand_core::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha384, Sha512};

pub const PRIVATE_KEY_TAG: &str = "RSA PRIVATE KEY";

#[derive(Clone)]
pub struct RsaKey {
    private: RsaPrivateKey,
    public_der: Vec<u8>,
}

impl RsaKey {
    /// Generate a fresh key. CPU bound; async callers run it on the
    /// blocking pool.
    pub fn generate(size: KeySize) -> KilnResult<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, size.bits())
            .map_err(|e| KilnError::Crypto(format!("RSA key generation failed: {e}")))?;
        Self::from_private(private)
    }

    fn from_private(private: RsaPrivateKey) -> KilnResult<Self> {
        let public_der = private
            .to_public_key()
            .to_pkcs1_der()
            .map_err(|e| KilnError::Crypto(format!("failed to encode public key: {e}")))?
            .as_bytes()
            .to_vec();
        Ok(Self {
            private,
            public_der,
        })
    }

    /// Decode the DER body of an `RSA PRIVATE KEY` block.
    pub fn from_pkcs1_der(der: &[u8]) -> KilnResult<Self> {
        let private = RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| KilnError::Crypto(format!("invalid PKCS#1 private key: {e}")))?;
        Self::from_private(private)
    }

    pub fn to_pkcs1_pem(&self) -> KilnResult<String> {
        let pem = self
            .private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| KilnError::Crypto(format!("failed to encode private key: {e}")))?;
        Ok(pem.to_string())
    }

    /// PKCS#1 `RSAPublicKey` DER.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_der
    }

    pub fn bits(&self) -> usize {
        self.private.size() * 8
    }

    /// SHA-1 over the PKCS#1 public key.
    pub fn subject_key_id(&self) -> Vec<u8> {
        Sha1::digest(&self.public_der).to_vec()
    }

    /// An rcgen key pair that signs with this key.
    pub fn key_pair(&self, algorithm: SignatureAlgorithm) -> KilnResult<rcgen::KeyPair> {
        rcgen::KeyPair::from_remote(Box::new(RsaSigner {
            key: self.clone(),
            algorithm,
        }))
        .map_err(|e| KilnError::Crypto(format!("failed to wrap signing key: {e}")))
    }
}

impl fmt::Debug for RsaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKey")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

struct RsaSigner {
    key: RsaKey,
    algorithm: SignatureAlgorithm,
}

impl rcgen::RemoteKeyPair for RsaSigner {
    fn public_key(&self) -> &[u8] {
        self.key.public_key_der()
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, rcgen::Error> {
        let private = self.key.private.clone();
        let signature = match self.algorithm {
            SignatureAlgorithm::Sha256 => SigningKey::<Sha256>::new(private)
                .try_sign(msg)
                .map(|s| s.to_vec()),
            SignatureAlgorithm::Sha384 => SigningKey::<Sha384>::new(private)
                .try_sign(msg)
                .map(|s| s.to_vec()),
            SignatureAlgorithm::Sha512 => SigningKey::<Sha512>::new(private)
                .try_sign(msg)
                .map(|s| s.to_vec()),
        };
        signature.map_err(|_| rcgen::Error::RemoteKeyError)
    }

    fn algorithm(&self) -> &'static rcgen::SignatureAlgorithm {
        match self.algorithm {
            SignatureAlgorithm::Sha256 => &rcgen::PKCS_RSA_SHA256,
            SignatureAlgorithm::Sha384 => &rcgen::PKCS_RSA_SHA384,
            SignatureAlgorithm::Sha512 => &rcgen::PKCS_RSA_SHA512,
        }
    }
}
