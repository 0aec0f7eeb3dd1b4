//! Certificate domain models.
//!
//! Kiln runs a three-tier PKI: one global root CA signs a per-tenant
//! intermediate CA, which in turn signs the tenant's end-entity
//! certificates. Certificates are immutable once stored; rotation creates
//! a new row.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::KilnError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CertificateType {
    Root,
    Intermediate,
    EndEntity,
}

impl CertificateType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Intermediate => "intermediate",
            Self::EndEntity => "end_entity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "root" => Some(Self::Root),
            "intermediate" => Some(Self::Intermediate),
            "end_entity" => Some(Self::EndEntity),
            _ => None,
        }
    }

    /// Prefix of the on-disk file names.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Root => "root_ca",
            Self::Intermediate => "intermediate_ca",
            Self::EndEntity => "certificate",
        }
    }

    pub fn is_ca(self) -> bool {
        !matches!(self, Self::EndEntity)
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RSA modulus size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum KeySize {
    #[default]
    Rsa2048,
    Rsa4096,
    Rsa8192,
}

impl KeySize {
    pub fn bits(self) -> usize {
        match self {
            Self::Rsa2048 => 2048,
            Self::Rsa4096 => 4096,
            Self::Rsa8192 => 8192,
        }
    }
}

impl TryFrom<u32> for KeySize {
    type Error = KilnError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2048 => Ok(Self::Rsa2048),
            4096 => Ok(Self::Rsa4096),
            8192 => Ok(Self::Rsa8192),
            other => Err(KilnError::validation(format!(
                "unsupported key size {other}, expected 2048, 4096 or 8192"
            ))),
        }
    }
}

impl From<KeySize> for u32 {
    fn from(value: KeySize) -> Self {
        value.bits() as u32
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    #[default]
    #[serde(rename = "SHA256")]
    Sha256,
    #[serde(rename = "SHA384")]
    Sha384,
    #[serde(rename = "SHA512")]
    Sha512,
}

impl SignatureAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
            Self::Sha384 => "SHA384",
            Self::Sha512 => "SHA512",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA256" => Some(Self::Sha256),
            "SHA384" => Some(Self::Sha384),
            "SHA512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// Subject, SANs and key parameters of a certificate.
///
/// Multi-word keys also accept their lowercase spelling, which is what
/// environment overrides arrive as.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CertificateConfig {
    pub country: String,
    pub state: String,
    pub city: String,
    pub organization: String,
    #[serde(alias = "organizationalunit")]
    pub organizational_unit: String,
    #[serde(alias = "commonname")]
    pub common_name: String,
    #[serde(alias = "adminemail")]
    pub admin_email: Option<String>,
    pub fqdns: Vec<String>,
    /// Unparseable entries are dropped at issuance.
    pub ips: Vec<String>,
    #[serde(alias = "expiresinyears")]
    pub expires_in_years: u32,
    #[serde(alias = "keysize")]
    pub key_size: KeySize,
    #[serde(alias = "signaturealgorithm")]
    pub signature_algorithm: SignatureAlgorithm,
    /// Never persisted.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub root_certificate_id: Option<Uuid>,
    pub intermediate_certificate_id: Option<Uuid>,
}

impl CertificateConfig {
    /// Fill empty subject fields from `defaults`.
    pub fn with_defaults(mut self, defaults: &CertificateConfig) -> Self {
        let fill = |field: &mut String, default: &String| {
            if field.trim().is_empty() {
                field.clone_from(default);
            }
        };
        fill(&mut self.country, &defaults.country);
        fill(&mut self.state, &defaults.state);
        fill(&mut self.city, &defaults.city);
        fill(&mut self.organization, &defaults.organization);
        fill(&mut self.organizational_unit, &defaults.organizational_unit);
        if self.admin_email.is_none() {
            self.admin_email.clone_from(&defaults.admin_email);
        }
        if self.expires_in_years == 0 {
            self.expires_in_years = defaults.expires_in_years;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub certificate_type: CertificateType,
    pub name: String,
    pub slug: String,
    pub config: CertificateConfig,
    /// Hex serial, unique across all certificates.
    pub serial_number: String,
    /// Full chain, leaf first.
    pub pem_certificate: String,
    /// PKCS#1 `RSA PRIVATE KEY`.
    #[serde(skip_serializing)]
    pub pem_private_key: String,
    pub pem_csr: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCertificate {
    pub id: Option<Uuid>,
    pub tenant_id: Uuid,
    pub certificate_type: CertificateType,
    pub name: String,
    pub slug: String,
    pub config: CertificateConfig,
    pub serial_number: String,
    pub pem_certificate: String,
    pub pem_private_key: String,
    pub pem_csr: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CertificateFilter {
    pub tenant_id: Option<Uuid>,
    pub certificate_type: Option<CertificateType>,
}
