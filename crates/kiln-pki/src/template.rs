//! Certificate templates: per-tier extensions, subject names, validity.

use std::net::IpAddr;

use chrono::{DateTime, Duration, Months, Utc};
use kiln_core::models::certificate::{CertificateConfig, CertificateType};
use kiln_core::{Diagnostics, KilnError, KilnResult};
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyIdMethod, KeyUsagePurpose, PrintableString,
    SanType,
};
use x509_parser::der_parser::asn1_rs::Tag;
use x509_parser::prelude::FromDer;
use x509_parser::x509::X509Name;

use crate::der;
use crate::key::RsaKey;
use crate::serial::Serial;

const MODULE: &str = "pki";

/// Backdating applied to `NotBefore` to absorb clock skew.
const NOT_BEFORE_SKEW: Duration = Duration::seconds(10);

/// Extensions that differ between the three tiers.
pub(crate) struct Profile {
    pub is_ca: IsCa,
    pub key_usages: Vec<KeyUsagePurpose>,
    pub extended_key_usages: Vec<ExtendedKeyUsagePurpose>,
    pub policies: &'static [&'static [u64]],
}

pub(crate) fn profile(kind: CertificateType) -> Profile {
    match kind {
        CertificateType::Root => Profile {
            is_ca: IsCa::Ca(BasicConstraints::Constrained(2)),
            key_usages: vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign],
            extended_key_usages: vec![
                ExtendedKeyUsagePurpose::ClientAuth,
                ExtendedKeyUsagePurpose::CodeSigning,
                ExtendedKeyUsagePurpose::EmailProtection,
                ExtendedKeyUsagePurpose::Other(der::OID_IPSEC_END_SYSTEM.to_vec()),
                ExtendedKeyUsagePurpose::Other(der::OID_IPSEC_TUNNEL.to_vec()),
                ExtendedKeyUsagePurpose::Other(der::OID_IPSEC_USER.to_vec()),
                ExtendedKeyUsagePurpose::OcspSigning,
                ExtendedKeyUsagePurpose::ServerAuth,
                ExtendedKeyUsagePurpose::TimeStamping,
            ],
            policies: &[
                der::POLICY_5,
                der::POLICY_6,
                der::ROOT_POLICY_3,
                der::ROOT_POLICY_4,
            ],
        },
        CertificateType::Intermediate => Profile {
            is_ca: IsCa::Ca(BasicConstraints::Constrained(1)),
            key_usages: vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyCertSign,
                KeyUsagePurpose::CrlSign,
            ],
            extended_key_usages: vec![
                ExtendedKeyUsagePurpose::ServerAuth,
                ExtendedKeyUsagePurpose::ClientAuth,
            ],
            policies: &[der::POLICY_4, der::POLICY_5, der::POLICY_6],
        },
        CertificateType::EndEntity => Profile {
            is_ca: IsCa::ExplicitNoCa,
            key_usages: vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ],
            extended_key_usages: vec![ExtendedKeyUsagePurpose::ServerAuth],
            policies: &[der::POLICY_4, der::POLICY_5],
        },
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Validity {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

pub(crate) fn validity(now: DateTime<Utc>, years: u32) -> KilnResult<Validity> {
    let not_after = now
        .checked_add_months(Months::new(years.saturating_mul(12)))
        .ok_or_else(|| KilnError::validation(format!("expiresInYears {years} is out of range")))?;
    Ok(Validity {
        not_before: now - NOT_BEFORE_SKEW,
        not_after,
    })
}

fn to_offset(at: DateTime<Utc>) -> KilnResult<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| KilnError::Certificate(format!("timestamp {at} not representable: {e}")))
}

fn printable(field: &str, value: &str) -> KilnResult<DnValue> {
    PrintableString::try_from(value)
        .map(DnValue::PrintableString)
        .map_err(|_| KilnError::validation(format!("{field} '{value}' is not a printable string")))
}

fn ia5(field: &str, value: &str) -> KilnResult<DnValue> {
    Ia5String::try_from(value)
        .map(DnValue::Ia5String)
        .map_err(|_| KilnError::validation(format!("{field} '{value}' is not an IA5 string")))
}

/// Subject DN from config. Blank fields are left out.
pub(crate) fn subject_name(config: &CertificateConfig) -> KilnResult<DistinguishedName> {
    let mut name = DistinguishedName::new();
    let country = config.country.trim();
    if !country.is_empty() {
        name.push(DnType::CountryName, printable("country", country)?);
    }
    let text_fields = [
        (DnType::StateOrProvinceName, &config.state),
        (DnType::LocalityName, &config.city),
        (DnType::OrganizationName, &config.organization),
        (DnType::OrganizationalUnitName, &config.organizational_unit),
        (DnType::CommonName, &config.common_name),
    ];
    for (dn_type, value) in text_fields {
        let value = value.trim();
        if !value.is_empty() {
            name.push(dn_type, DnValue::Utf8String(value.to_string()));
        }
    }
    if let Some(email) = config
        .admin_email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
    {
        name.push(
            DnType::CustomDnType(der::OID_EMAIL_ADDRESS.to_vec()),
            ia5("adminEmail", email)?,
        );
    }
    Ok(name)
}

fn dn_type_for(oid: &[u64]) -> DnType {
    match oid {
        [2, 5, 4, 3] => DnType::CommonName,
        [2, 5, 4, 6] => DnType::CountryName,
        [2, 5, 4, 7] => DnType::LocalityName,
        [2, 5, 4, 8] => DnType::StateOrProvinceName,
        [2, 5, 4, 10] => DnType::OrganizationName,
        [2, 5, 4, 11] => DnType::OrganizationalUnitName,
        other => DnType::CustomDnType(other.to_vec()),
    }
}

/// Rebuild a DN from its DER encoding, keeping each attribute's string
/// type so the re-encoded name is byte-identical.
pub(crate) fn name_from_der(raw_name: &[u8]) -> KilnResult<DistinguishedName> {
    let (_, parsed) = X509Name::from_der(raw_name)
        .map_err(|e| KilnError::Certificate(format!("malformed distinguished name: {e}")))?;

    let mut name = DistinguishedName::new();
    for attribute in parsed.iter_attributes() {
        let oid: Vec<u64> = attribute
            .attr_type()
            .iter()
            .ok_or_else(|| KilnError::Certificate("oversized OID in distinguished name".into()))?
            .collect();
        let value = attribute
            .as_str()
            .map_err(|e| KilnError::Certificate(format!("unreadable name attribute: {e}")))?;
        let dn_value = match attribute.attr_value().tag() {
            Tag::PrintableString => printable("name attribute", value)?,
            Tag::Ia5String => ia5("name attribute", value)?,
            _ => DnValue::Utf8String(value.to_string()),
        };
        name.push(dn_type_for(&oid), dn_value);
    }
    Ok(name)
}

/// SANs from `fqdns` and `ips`. Entries that cannot be encoded are
/// dropped and noted in `diagnostics`.
pub(crate) fn subject_alt_names(
    config: &CertificateConfig,
    diagnostics: &mut Diagnostics,
) -> Vec<SanType> {
    let mut sans = Vec::new();
    for fqdn in config.fqdns.iter().map(|f| f.trim()).filter(|f| !f.is_empty()) {
        match Ia5String::try_from(fqdn) {
            Ok(name) => sans.push(SanType::DnsName(name)),
            Err(_) => diagnostics.add_path_entry_with_metadata(
                "dropped-invalid-fqdn",
                MODULE,
                serde_json::json!({ "fqdn": fqdn }),
            ),
        }
    }
    for ip in config.ips.iter().map(|i| i.trim()).filter(|i| !i.is_empty()) {
        match ip.parse::<IpAddr>() {
            Ok(addr) => sans.push(SanType::IpAddress(addr)),
            Err(_) => diagnostics.add_path_entry_with_metadata(
                "dropped-invalid-ip",
                MODULE,
                serde_json::json!({ "ip": ip }),
            ),
        }
    }
    sans
}

/// Assemble the parameters for a certificate of `kind` over `subject_key`.
pub(crate) fn params(
    kind: CertificateType,
    config: &CertificateConfig,
    serial: &Serial,
    subject_key: &RsaKey,
    validity: Validity,
    diagnostics: &mut Diagnostics,
) -> KilnResult<CertificateParams> {
    let profile = profile(kind);

    let mut params = CertificateParams::default();
    params.distinguished_name = subject_name(config)?;
    params.subject_alt_names = subject_alt_names(config, diagnostics);
    params.serial_number = Some(serial.to_rcgen());
    params.not_before = to_offset(validity.not_before)?;
    params.not_after = to_offset(validity.not_after)?;
    params.is_ca = profile.is_ca;
    params.key_usages = profile.key_usages;
    params.extended_key_usages = profile.extended_key_usages;
    params.custom_extensions = vec![CustomExtension::from_oid_content(
        der::OID_CERTIFICATE_POLICIES,
        der::certificate_policies(profile.policies),
    )];
    params.key_identifier_method = KeyIdMethod::PreSpecified(subject_key.subject_key_id());
    params.use_authority_key_identifier_extension = true;
    Ok(params)
}

/// Parameters that re-create an already issued CA certificate well enough
/// to act as the issuer for rcgen: same subject, same key identifier.
pub(crate) fn issuer_params(raw_subject: &[u8], issuer_key: &RsaKey) -> KilnResult<CertificateParams> {
    let mut params = CertificateParams::default();
    params.distinguished_name = name_from_der(raw_subject)?;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    params.key_identifier_method = KeyIdMethod::PreSpecified(issuer_key.subject_key_id());
    Ok(params)
}

/// Parameters of a CSR carrying the issued certificate's subject.
pub(crate) fn request_params(raw_subject: &[u8]) -> KilnResult<CertificateParams> {
    let mut params = CertificateParams::default();
    params.distinguished_name = name_from_der(raw_subject)?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn validity_backdates_and_adds_calendar_years() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
        let window = validity(now, 1).unwrap();
        assert_eq!(window.not_before, now - Duration::seconds(10));
        assert_eq!(
            window.not_after,
            Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn invalid_ips_are_dropped_and_recorded() {
        let config = CertificateConfig {
            fqdns: vec!["api.t1.local".into(), " ".into()],
            ips: vec!["10.0.0.1".into(), "not-an-ip".into(), "::1".into()],
            ..Default::default()
        };
        let mut diag = Diagnostics::new("sans");
        let sans = subject_alt_names(&config, &mut diag);

        assert_eq!(sans.len(), 3);
        assert!(!diag.has_errors());
        let dropped = diag.path_entries();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].id, "dropped-invalid-ip");
        assert_eq!(dropped[0].metadata["ip"], "not-an-ip");
    }

    #[test]
    fn non_printable_country_is_rejected() {
        let config = CertificateConfig {
            country: "D@".into(),
            common_name: "x".into(),
            ..Default::default()
        };
        let err = subject_name(&config).unwrap_err();
        assert_eq!(err.code(), "validation_failed");
    }

    #[test]
    fn tiers_differ_in_path_length() {
        assert!(matches!(
            profile(CertificateType::Root).is_ca,
            IsCa::Ca(BasicConstraints::Constrained(2))
        ));
        assert!(matches!(
            profile(CertificateType::Intermediate).is_ca,
            IsCa::Ca(BasicConstraints::Constrained(1))
        ));
        assert!(matches!(
            profile(CertificateType::EndEntity).is_ca,
            IsCa::ExplicitNoCa
        ));
    }
}
