//! The certificate engine: one implementation shared by the three tiers.

use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use kiln_core::models::certificate::{
    Certificate, CertificateConfig, CertificateType, CreateCertificate, SignatureAlgorithm,
};
use kiln_core::{AppContext, Diagnostics, KilnError, KilnResult};
use pem::{EncodeConfig, LineEnding, Pem};
use tracing::info;
use uuid::Uuid;
use x509_parser::certificate::X509Certificate as ParsedCertificate;
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;
use x509_parser::x509::AttributeTypeAndValue;

use crate::key::{PRIVATE_KEY_TAG, RsaKey};
use crate::serial::Serial;
use crate::storage::{self, CertificateFiles};
use crate::template;
use crate::trust::{TrustBackend, TrustStore};

pub const CERTIFICATE_TAG: &str = "CERTIFICATE";
pub const CSR_TAG: &str = "CERTIFICATE REQUEST";

const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
const OID_SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";
const OID_SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";

fn encode_pem(tag: &str, der: &[u8]) -> String {
    pem::encode_config(
        &Pem::new(tag, der.to_vec()),
        EncodeConfig::new().set_line_ending(LineEnding::LF),
    )
}

pub(crate) fn parse_der(der: &[u8]) -> KilnResult<ParsedCertificate<'_>> {
    parse_x509_certificate(der)
        .map(|(_, cert)| cert)
        .map_err(|e| KilnError::Certificate(format!("malformed certificate: {e}")))
}

/// Lowercase ASCII with runs of anything else collapsed to `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Facts read back from an issued certificate.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
    /// Subject fields, SANs and signature algorithm as encoded.
    pub config: CertificateConfig,
}

fn timestamp(seconds: i64) -> KilnResult<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| KilnError::Certificate(format!("validity timestamp {seconds} out of range")))
}

fn first_attribute<'a, 'b: 'a>(
    mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> String {
    values
        .next()
        .and_then(|attribute| attribute.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn inspect(der: &[u8]) -> KilnResult<CertificateInfo> {
    let cert = parse_der(der)?;
    let subject = cert.subject();

    let mut config = CertificateConfig {
        country: first_attribute(subject.iter_country()),
        state: first_attribute(subject.iter_state_or_province()),
        city: first_attribute(subject.iter_locality()),
        organization: first_attribute(subject.iter_organization()),
        organizational_unit: first_attribute(subject.iter_organizational_unit()),
        common_name: first_attribute(subject.iter_common_name()),
        admin_email: Some(first_attribute(subject.iter_email())).filter(|e| !e.is_empty()),
        ..Default::default()
    };

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => config.fqdns.push((*dns).to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Ok(v4) = <[u8; 4]>::try_from(*bytes) {
                        config.ips.push(Ipv4Addr::from(v4).to_string());
                    } else if let Ok(v6) = <[u8; 16]>::try_from(*bytes) {
                        config.ips.push(Ipv6Addr::from(v6).to_string());
                    }
                }
                _ => {}
            }
        }
    }

    config.signature_algorithm = match cert.signature_algorithm.algorithm.to_id_string().as_str() {
        OID_SHA384_WITH_RSA => SignatureAlgorithm::Sha384,
        OID_SHA512_WITH_RSA => SignatureAlgorithm::Sha512,
        OID_SHA256_WITH_RSA => SignatureAlgorithm::Sha256,
        other => {
            return Err(KilnError::Certificate(format!(
                "unsupported signature algorithm {other}"
            )));
        }
    };

    let validity = cert.validity();
    let not_before = timestamp(validity.not_before.timestamp())?;
    let not_after = timestamp(validity.not_after.timestamp())?;
    let years = not_after.signed_duration_since(not_before).num_days() / 365;
    config.expires_in_years = u32::try_from(years).unwrap_or(0);

    Ok(CertificateInfo {
        serial_number: Serial::from_bytes(cert.raw_serial()).to_hex(),
        not_before,
        not_after,
        is_ca: cert.is_ca(),
        config,
    })
}

/// Certificate, chain, key and CSR of one certificate, plus the naming
/// and config it was issued under.
#[derive(Debug, Clone)]
pub struct CertificateMaterial {
    pub name: String,
    pub slug: String,
    pub config: CertificateConfig,
    certificate: Option<Vec<u8>>,
    /// Parents, nearest first.
    chain: Vec<Vec<u8>>,
    private_key: Option<RsaKey>,
    csr: Option<Vec<u8>>,
}

impl CertificateMaterial {
    pub fn certificate_der(&self) -> Option<&[u8]> {
        self.certificate.as_deref()
    }

    pub fn chain_der(&self) -> &[Vec<u8>] {
        &self.chain
    }

    pub fn private_key(&self) -> Option<&RsaKey> {
        self.private_key.as_ref()
    }

    pub fn csr_der(&self) -> Option<&[u8]> {
        self.csr.as_deref()
    }

    fn require_certificate(&self) -> KilnResult<&[u8]> {
        self.certificate_der().ok_or_else(|| {
            KilnError::Certificate(format!("{} has no certificate", self.display_name()))
        })
    }

    fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.config.common_name
        } else {
            &self.name
        }
    }

    pub fn info(&self) -> KilnResult<CertificateInfo> {
        inspect(self.require_certificate()?)
    }

    /// `<name>` with spaces as underscores, falling back to the common name.
    pub fn base_name(&self) -> String {
        storage::base_name(&self.name, &self.config.common_name)
    }

    /// The certificate followed by its chain, leaf first.
    pub fn certificate_pem(&self) -> String {
        self.certificate
            .iter()
            .chain(self.chain.iter())
            .map(|der| encode_pem(CERTIFICATE_TAG, der))
            .collect()
    }

    pub fn private_key_pem(&self) -> KilnResult<String> {
        match &self.private_key {
            Some(key) => key.to_pkcs1_pem(),
            None => Ok(String::new()),
        }
    }

    pub fn csr_pem(&self) -> String {
        self.csr
            .as_deref()
            .map(|der| encode_pem(CSR_TAG, der))
            .unwrap_or_default()
    }

    /// The row to persist for this material.
    pub fn to_create(
        &self,
        kind: CertificateType,
        tenant_id: Uuid,
        id: Option<Uuid>,
    ) -> KilnResult<CreateCertificate> {
        let info = self.info()?;
        Ok(CreateCertificate {
            id,
            tenant_id,
            certificate_type: kind,
            name: self.name.clone(),
            slug: self.slug.clone(),
            config: self.config.clone(),
            serial_number: info.serial_number,
            pem_certificate: self.certificate_pem(),
            pem_private_key: self.private_key_pem()?,
            pem_csr: self.csr_pem(),
            not_before: info.not_before,
            not_after: info.not_after,
        })
    }
}

fn non_blank(input: Option<&str>) -> Option<&str> {
    input.filter(|s| !s.trim().is_empty())
}

/// Parse PEM input. Each side is optional; a non-blank side must contain
/// a block of the expected type. Certificate and key are not matched
/// against each other.
pub fn parse_material(
    pem_certificate: Option<&str>,
    pem_private_key: Option<&str>,
) -> KilnResult<CertificateMaterial> {
    let mut certificates = Vec::new();
    if let Some(input) = non_blank(pem_certificate) {
        let blocks = pem::parse_many(input)
            .map_err(|e| KilnError::Certificate(format!("invalid certificate PEM: {e}")))?;
        for block in blocks.iter().filter(|b| b.tag() == CERTIFICATE_TAG) {
            parse_der(block.contents())?;
            certificates.push(block.contents().to_vec());
        }
        if certificates.is_empty() {
            return Err(KilnError::Certificate(format!(
                "no {CERTIFICATE_TAG} block found"
            )));
        }
    }

    let private_key = match non_blank(pem_private_key) {
        Some(input) => {
            let blocks = pem::parse_many(input)
                .map_err(|e| KilnError::Certificate(format!("invalid private key PEM: {e}")))?;
            let block = blocks
                .iter()
                .find(|b| b.tag() == PRIVATE_KEY_TAG)
                .ok_or_else(|| {
                    KilnError::Certificate(format!("no {PRIVATE_KEY_TAG} block found"))
                })?;
            Some(RsaKey::from_pkcs1_der(block.contents())?)
        }
        None => None,
    };

    let mut certificates = certificates.into_iter();
    let certificate = certificates.next();
    let config = match &certificate {
        Some(der) => inspect(der)?.config,
        None => CertificateConfig::default(),
    };
    let name = config.common_name.clone();

    Ok(CertificateMaterial {
        slug: slugify(&name),
        name,
        config,
        certificate,
        chain: certificates.collect(),
        private_key,
        csr: None,
    })
}

fn parse_csr(input: &str) -> KilnResult<Option<Vec<u8>>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    let blocks = pem::parse_many(input)
        .map_err(|e| KilnError::Certificate(format!("invalid CSR PEM: {e}")))?;
    Ok(blocks
        .into_iter()
        .find(|b| b.tag() == CSR_TAG)
        .map(|b| b.contents().to_vec()))
}

fn raw_subject(der: &[u8]) -> KilnResult<Vec<u8>> {
    Ok(parse_der(der)?.subject().as_raw().to_vec())
}

fn rcgen_error(context: &str) -> impl Fn(rcgen::Error) -> KilnError + '_ {
    move |e| KilnError::Certificate(format!("{context}: {e}"))
}

/// The tier a certificate of `kind` must be signed by.
pub fn issuer_kind(kind: CertificateType) -> Option<CertificateType> {
    match kind {
        CertificateType::Root => None,
        CertificateType::Intermediate => Some(CertificateType::Root),
        CertificateType::EndEntity => Some(CertificateType::Intermediate),
    }
}

/// Generate a key and issue a certificate of `kind` over it, signed by
/// `issuer` (or self-signed for the root). The CSR is produced after
/// issuance from the issued subject and the same key.
fn issue(
    kind: CertificateType,
    name: &str,
    config: CertificateConfig,
    issuer: Option<&X509Certificate>,
    serial: &Serial,
    diagnostics: &mut Diagnostics,
) -> KilnResult<CertificateMaterial> {
    if config.common_name.trim().is_empty() {
        return Err(KilnError::validation("commonName is required"));
    }
    if config.expires_in_years == 0 {
        return Err(KilnError::validation("expiresInYears must be at least 1"));
    }
    match (issuer_kind(kind), issuer.map(X509Certificate::certificate_type)) {
        (None, None) => {}
        (Some(expected), Some(actual)) if expected == actual => {}
        (expected, actual) => {
            return Err(KilnError::validation(format!(
                "a {kind} certificate must be signed by {}, got {}",
                expected.map_or("itself".to_string(), |k| k.to_string()),
                actual.map_or("none".to_string(), |k| k.to_string()),
            )));
        }
    }

    let key = RsaKey::generate(config.key_size)?;
    let validity = template::validity(Utc::now(), config.expires_in_years)?;
    let params = template::params(kind, &config, serial, &key, validity, diagnostics)?;
    let subject_key = key.key_pair(config.signature_algorithm)?;

    let (certificate, chain) = match issuer.map(X509Certificate::material) {
        None => {
            let cert = params
                .self_signed(&subject_key)
                .map_err(rcgen_error("self-signing failed"))?;
            (cert.der().to_vec(), Vec::new())
        }
        Some(parent) => {
            let parent_der = parent.require_certificate()?;
            let parent_key = parent.private_key().ok_or_else(|| {
                KilnError::Certificate(format!(
                    "issuer {} has no private key",
                    parent.display_name()
                ))
            })?;
            let parent_info = inspect(parent_der)?;
            if !parent_info.is_ca {
                return Err(KilnError::Certificate(format!(
                    "issuer {} is not a CA",
                    parent.display_name()
                )));
            }
            if parent_info.not_after <= Utc::now() {
                return Err(KilnError::Certificate(format!(
                    "issuer {} expired at {}",
                    parent.display_name(),
                    parent_info.not_after
                )));
            }

            let signer = parent_key.key_pair(config.signature_algorithm)?;
            let issuer_cert = template::issuer_params(&raw_subject(parent_der)?, parent_key)?
                .self_signed(&signer)
                .map_err(rcgen_error("failed to load issuer"))?;
            let cert = params
                .signed_by(&subject_key, &issuer_cert, &signer)
                .map_err(rcgen_error("signing failed"))?;

            let mut chain = vec![parent_der.to_vec()];
            chain.extend(parent.chain.iter().cloned());
            (cert.der().to_vec(), chain)
        }
    };

    let csr = template::request_params(&raw_subject(&certificate)?)?
        .serialize_request(&subject_key)
        .map_err(rcgen_error("failed to build CSR"))?;

    info!(
        kind = %kind,
        common_name = %config.common_name,
        serial = %serial.to_hex(),
        key_bits = key.bits(),
        "Issued certificate"
    );

    let name = if name.trim().is_empty() {
        config.common_name.clone()
    } else {
        name.trim().to_string()
    };
    Ok(CertificateMaterial {
        slug: slugify(&name),
        name,
        config,
        certificate: Some(certificate),
        chain,
        private_key: Some(key),
        csr: Some(csr.der().to_vec()),
    })
}

/// Operations shared by every certificate tier.
pub trait CertificateOps: Sized {
    const KIND: CertificateType;
    /// OS trust store the certificate belongs in.
    const TRUST_STORE: TrustStore;

    fn from_material(material: CertificateMaterial) -> Self;
    fn material(&self) -> &CertificateMaterial;
    fn into_material(self) -> CertificateMaterial;

    fn generate(
        name: &str,
        config: CertificateConfig,
        issuer: Option<&X509Certificate>,
        serial: &Serial,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<Self> {
        issue(Self::KIND, name, config, issuer, serial, diagnostics).map(Self::from_material)
    }

    fn parse(pem_certificate: Option<&str>, pem_private_key: Option<&str>) -> KilnResult<Self> {
        parse_material(pem_certificate, pem_private_key).map(Self::from_material)
    }

    /// Read `<prefix>_<base_name>.{crt,key,csr}` under `storage`.
    fn load_from_file(storage: &Path, base_name: &str) -> KilnResult<Self> {
        let files = CertificateFiles::locate(storage, Self::KIND, base_name);
        let certificate = storage::read_optional(&files.certificate)?.ok_or_else(|| {
            KilnError::not_found("certificate file", files.certificate.display())
        })?;
        let key = storage::read_optional(&files.private_key)?;
        let mut material = parse_material(Some(&certificate), key.as_deref())?;
        if let Some(csr) = storage::read_optional(&files.csr)? {
            material.csr = parse_csr(&csr)?;
        }
        material.name = base_name.replace('_', " ");
        material.slug = slugify(&material.name);
        Ok(Self::from_material(material))
    }

    fn save_to_file(&self, storage: &Path) -> KilnResult<CertificateFiles> {
        let material = self.material();
        let files = CertificateFiles::locate(storage, Self::KIND, &material.base_name());
        files.write(
            &material.certificate_pem(),
            &material.private_key_pem()?,
            &material.csr_pem(),
        )?;
        Ok(files)
    }

    /// Parse the stored PEM, then take name, slug and config from the row.
    fn from_database(entity: &Certificate) -> KilnResult<Self> {
        if entity.certificate_type != Self::KIND {
            return Err(KilnError::validation(format!(
                "certificate {} is a {} certificate, not {}",
                entity.slug,
                entity.certificate_type,
                Self::KIND
            )));
        }
        let mut material = parse_material(
            Some(&entity.pem_certificate),
            Some(&entity.pem_private_key),
        )?;
        material.csr = parse_csr(&entity.pem_csr)?;
        material.name.clone_from(&entity.name);
        material.slug.clone_from(&entity.slug);
        material.config = entity.config.clone();
        Ok(Self::from_material(material))
    }

    /// Save to `storage` and add the certificate to its trust store.
    fn install<'a, B: TrustBackend>(
        &'a self,
        ctx: &'a AppContext,
        backend: &'a B,
        storage: &'a Path,
        diagnostics: &'a mut Diagnostics,
    ) -> impl Future<Output = KilnResult<PathBuf>> + Send + 'a
    where
        Self: Sync,
    {
        async move {
            let files = self.save_to_file(storage)?;
            backend
                .install(ctx, &files.certificate, Self::TRUST_STORE, diagnostics)
                .await?;
            Ok(files.certificate)
        }
    }
}

macro_rules! certificate_tier {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $store:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(CertificateMaterial);

        impl CertificateOps for $name {
            const KIND: CertificateType = $kind;
            const TRUST_STORE: TrustStore = $store;

            fn from_material(material: CertificateMaterial) -> Self {
                Self(material)
            }

            fn material(&self) -> &CertificateMaterial {
                &self.0
            }

            fn into_material(self) -> CertificateMaterial {
                self.0
            }
        }
    };
}

certificate_tier!(
    /// Self-signed global root CA.
    RootCertificate,
    CertificateType::Root,
    TrustStore::Root
);
certificate_tier!(
    /// Per-tenant CA signed by the root.
    IntermediateCertificate,
    CertificateType::Intermediate,
    TrustStore::Ca
);
certificate_tier!(
    /// Server certificate signed by a tenant intermediate.
    EndEntityCertificate,
    CertificateType::EndEntity,
    TrustStore::WebHosting
);

/// A certificate of any tier.
#[derive(Debug, Clone)]
pub enum X509Certificate {
    Root(RootCertificate),
    Intermediate(IntermediateCertificate),
    EndEntity(EndEntityCertificate),
}

impl X509Certificate {
    pub fn from_database(entity: &Certificate) -> KilnResult<Self> {
        Ok(match entity.certificate_type {
            CertificateType::Root => Self::Root(RootCertificate::from_database(entity)?),
            CertificateType::Intermediate => {
                Self::Intermediate(IntermediateCertificate::from_database(entity)?)
            }
            CertificateType::EndEntity => {
                Self::EndEntity(EndEntityCertificate::from_database(entity)?)
            }
        })
    }

    pub fn certificate_type(&self) -> CertificateType {
        match self {
            Self::Root(_) => CertificateType::Root,
            Self::Intermediate(_) => CertificateType::Intermediate,
            Self::EndEntity(_) => CertificateType::EndEntity,
        }
    }

    pub fn material(&self) -> &CertificateMaterial {
        match self {
            Self::Root(cert) => cert.material(),
            Self::Intermediate(cert) => cert.material(),
            Self::EndEntity(cert) => cert.material(),
        }
    }

    pub fn save_to_file(&self, storage: &Path) -> KilnResult<CertificateFiles> {
        match self {
            Self::Root(cert) => cert.save_to_file(storage),
            Self::Intermediate(cert) => cert.save_to_file(storage),
            Self::EndEntity(cert) => cert.save_to_file(storage),
        }
    }

    pub async fn install<B: TrustBackend>(
        &self,
        ctx: &AppContext,
        backend: &B,
        storage: &Path,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<PathBuf> {
        match self {
            Self::Root(cert) => cert.install(ctx, backend, storage, diagnostics).await,
            Self::Intermediate(cert) => cert.install(ctx, backend, storage, diagnostics).await,
            Self::EndEntity(cert) => cert.install(ctx, backend, storage, diagnostics).await,
        }
    }
}

impl From<RootCertificate> for X509Certificate {
    fn from(cert: RootCertificate) -> Self {
        Self::Root(cert)
    }
}

impl From<IntermediateCertificate> for X509Certificate {
    fn from(cert: IntermediateCertificate) -> Self {
        Self::Intermediate(cert)
    }
}

impl From<EndEntityCertificate> for X509Certificate {
    fn from(cert: EndEntityCertificate) -> Self {
        Self::EndEntity(cert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  T1 Int  CA "), "t1-int-ca");
        assert_eq!(slugify("api.t1.local"), "api-t1-local");
        assert_eq!(slugify("--x--"), "x");
    }

    #[test]
    fn issuer_tiers() {
        assert_eq!(issuer_kind(CertificateType::Root), None);
        assert_eq!(
            issuer_kind(CertificateType::EndEntity),
            Some(CertificateType::Intermediate)
        );
    }

    #[test]
    fn blank_inputs_parse_to_empty_material() {
        let material = parse_material(Some("  "), None).unwrap();
        assert!(material.certificate_der().is_none());
        assert!(material.private_key().is_none());
        assert_eq!(material.certificate_pem(), "");
    }
}
