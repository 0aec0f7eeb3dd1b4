//! Integration tests for the certificate engine: issuance across the three
//! tiers, PEM round trips, file storage and chain verification.

use kiln_core::Diagnostics;
use kiln_core::models::certificate::{
    Certificate, CertificateConfig, CertificateType, KeySize, SignatureAlgorithm,
};
use kiln_pki::chain::certificates_from_pem;
use kiln_pki::{
    CertificateOps, EndEntityCertificate, IntermediateCertificate, RootCertificate, Serial,
    X509Certificate, verify_chain, verify_pem_chain,
};
use uuid::Uuid;
use x509_parser::extensions::ParsedExtension;
use x509_parser::parse_x509_certificate;
use x509_parser::prelude::FromDer;

fn root_config() -> CertificateConfig {
    CertificateConfig {
        country: "US".into(),
        organization: "Kiln".into(),
        common_name: "Root".into(),
        admin_email: Some("pki@kiln.local".into()),
        expires_in_years: 10,
        key_size: KeySize::Rsa2048,
        signature_algorithm: SignatureAlgorithm::Sha512,
        ..Default::default()
    }
}

fn intermediate_config() -> CertificateConfig {
    CertificateConfig {
        country: "US".into(),
        organization: "T1".into(),
        common_name: "T1 Int".into(),
        expires_in_years: 5,
        key_size: KeySize::Rsa2048,
        signature_algorithm: SignatureAlgorithm::Sha512,
        ..Default::default()
    }
}

fn leaf_config() -> CertificateConfig {
    CertificateConfig {
        common_name: "api.t1.local".into(),
        expires_in_years: 1,
        key_size: KeySize::Rsa2048,
        signature_algorithm: SignatureAlgorithm::Sha256,
        fqdns: vec!["api.t1.local".into()],
        ips: vec!["10.1.0.7".into(), "bogus".into()],
        ..Default::default()
    }
}

struct Hierarchy {
    root: RootCertificate,
    intermediate: IntermediateCertificate,
    leaf: EndEntityCertificate,
    diagnostics: Diagnostics,
}

fn issue_hierarchy() -> Hierarchy {
    let mut diagnostics = Diagnostics::new("hierarchy");
    let root =
        RootCertificate::generate("Root", root_config(), None, &Serial::random(), &mut diagnostics)
            .unwrap();
    let root_any = X509Certificate::from(root.clone());
    let intermediate = IntermediateCertificate::generate(
        "T1 Int",
        intermediate_config(),
        Some(&root_any),
        &Serial::random(),
        &mut diagnostics,
    )
    .unwrap();
    let intermediate_any = X509Certificate::from(intermediate.clone());
    let leaf = EndEntityCertificate::generate(
        "api.t1.local",
        leaf_config(),
        Some(&intermediate_any),
        &Serial::random(),
        &mut diagnostics,
    )
    .unwrap();
    Hierarchy {
        root,
        intermediate,
        leaf,
        diagnostics,
    }
}

fn as_row(kind: CertificateType, material: &kiln_pki::CertificateMaterial) -> Certificate {
    let input = material.to_create(kind, Uuid::new_v4(), None).unwrap();
    Certificate {
        id: Uuid::new_v4(),
        tenant_id: input.tenant_id,
        certificate_type: input.certificate_type,
        name: input.name,
        slug: input.slug,
        config: input.config,
        serial_number: input.serial_number,
        pem_certificate: input.pem_certificate,
        pem_private_key: input.pem_private_key,
        pem_csr: input.pem_csr,
        not_before: input.not_before,
        not_after: input.not_after,
        created_at: chrono::Utc::now(),
    }
}

#[test]
fn three_tier_chain_verifies_from_stored_pem() {
    let h = issue_hierarchy();

    let leaf_row = as_row(CertificateType::EndEntity, h.leaf.material());
    let root_row = as_row(CertificateType::Root, h.root.material());

    let chain = certificates_from_pem(&leaf_row.pem_certificate).unwrap();
    assert_eq!(chain.len(), 3);

    let anchors = certificates_from_pem(&root_row.pem_certificate).unwrap();
    verify_chain(&chain[0], &chain[1..2], &anchors).unwrap();
    verify_pem_chain(&leaf_row.pem_certificate, &root_row.pem_certificate).unwrap();

    // The leaf's stored key and CSR come back from the row.
    let reloaded = EndEntityCertificate::from_database(&leaf_row).unwrap();
    assert!(reloaded.material().private_key().is_some());
    assert!(reloaded.material().csr_der().is_some());
    assert_eq!(reloaded.material().chain_der().len(), 2);
    assert_eq!(reloaded.material().slug, leaf_row.slug);
}

#[test]
fn chain_does_not_verify_against_a_foreign_root() {
    let h = issue_hierarchy();
    let mut diag = Diagnostics::new("other");
    let other = RootCertificate::generate("Root", root_config(), None, &Serial::random(), &mut diag)
        .unwrap();

    let leaf = h.leaf.material();
    let err = verify_chain(
        leaf.certificate_der().unwrap(),
        &[h.intermediate.material().certificate_der().unwrap().to_vec()],
        &[other.material().certificate_der().unwrap().to_vec()],
    )
    .unwrap_err();
    assert_eq!(err.code(), "certificate_error");

    // Without the intermediate there is no path either.
    assert!(
        verify_chain(
            leaf.certificate_der().unwrap(),
            &[],
            &[h.root.material().certificate_der().unwrap().to_vec()],
        )
        .is_err()
    );
}

#[test]
fn extensions_follow_the_tier() {
    let h = issue_hierarchy();

    let (_, root) = parse_x509_certificate(h.root.material().certificate_der().unwrap()).unwrap();
    let root_bc = root.basic_constraints().unwrap().unwrap().value;
    assert!(root_bc.ca);
    assert_eq!(root_bc.path_len_constraint, Some(2));
    assert_eq!(root.subject().as_raw(), root.issuer().as_raw());

    let (_, int) =
        parse_x509_certificate(h.intermediate.material().certificate_der().unwrap()).unwrap();
    assert_eq!(
        int.basic_constraints().unwrap().unwrap().value.path_len_constraint,
        Some(1)
    );
    assert_eq!(int.issuer().as_raw(), root.subject().as_raw());

    let (_, leaf) = parse_x509_certificate(h.leaf.material().certificate_der().unwrap()).unwrap();
    assert!(!leaf.is_ca());
    let eku = leaf.extended_key_usage().unwrap().unwrap().value;
    assert!(eku.server_auth);
    assert!(!eku.client_auth);
    let ku = leaf.key_usage().unwrap().unwrap().value;
    assert!(ku.digital_signature());
    assert!(ku.key_encipherment());
    assert!(!ku.key_cert_sign());

    let policies = leaf
        .extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            ParsedExtension::CertificatePolicies(policies) => Some(
                policies
                    .iter()
                    .map(|p| p.policy_id.to_id_string())
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        })
        .unwrap();
    assert_eq!(policies, vec!["1.3.6.1.4.1.11129.2.5.3", "2.23.140.1.2.1"]);

    // The leaf's authority key id is the intermediate's subject key id.
    let aki = leaf
        .extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            ParsedExtension::AuthorityKeyIdentifier(aki) => aki.key_identifier.clone(),
            _ => None,
        })
        .unwrap();
    let ski = h.intermediate.material().private_key().unwrap().subject_key_id();
    assert_eq!(aki.0, ski.as_slice());
}

#[test]
fn subject_and_sans_read_back() {
    let h = issue_hierarchy();

    let root = h.root.material().info().unwrap();
    assert_eq!(root.config.common_name, "Root");
    assert_eq!(root.config.country, "US");
    assert_eq!(root.config.admin_email.as_deref(), Some("pki@kiln.local"));
    assert_eq!(root.config.signature_algorithm, SignatureAlgorithm::Sha512);
    assert!(root.is_ca);

    let leaf = h.leaf.material().info().unwrap();
    assert_eq!(leaf.config.fqdns, vec!["api.t1.local"]);
    assert_eq!(leaf.config.ips, vec!["10.1.0.7"]);
    assert_eq!(leaf.config.signature_algorithm, SignatureAlgorithm::Sha256);
    assert!(leaf.not_after > leaf.not_before);
    assert!(!leaf.serial_number.starts_with("00"));

    // The bogus IP was dropped and noted, not treated as an error.
    assert!(!h.diagnostics.has_errors());
    assert!(
        h.diagnostics
            .path_entries()
            .iter()
            .any(|entry| entry.id == "dropped-invalid-ip" && entry.metadata["ip"] == "bogus")
    );
}

#[test]
fn csr_carries_the_issued_subject() {
    let h = issue_hierarchy();
    let material = h.leaf.material();

    let csr_pem = material.csr_pem();
    assert!(csr_pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));

    let (_, csr) = x509_parser::certification_request::X509CertificationRequest::from_der(
        material.csr_der().unwrap(),
    )
    .unwrap();
    let (_, cert) = parse_x509_certificate(material.certificate_der().unwrap()).unwrap();
    assert_eq!(
        csr.certification_request_info.subject.as_raw(),
        cert.subject().as_raw()
    );
    csr.verify_signature().unwrap();
}

#[test]
fn wrong_issuer_tier_is_rejected() {
    let h = issue_hierarchy();
    let mut diag = Diagnostics::new("bad");

    let leaf_any = X509Certificate::from(h.leaf.clone());
    let err = EndEntityCertificate::generate(
        "x",
        leaf_config(),
        Some(&leaf_any),
        &Serial::random(),
        &mut diag,
    )
    .unwrap_err();
    assert_eq!(err.code(), "validation_failed");

    let err = IntermediateCertificate::generate(
        "x",
        intermediate_config(),
        None,
        &Serial::random(),
        &mut diag,
    )
    .unwrap_err();
    assert_eq!(err.code(), "validation_failed");

    let err = RootCertificate::generate(
        "x",
        CertificateConfig {
            common_name: "  ".into(),
            ..root_config()
        },
        None,
        &Serial::random(),
        &mut diag,
    )
    .unwrap_err();
    assert_eq!(err.code(), "validation_failed");
}

#[test]
fn parse_rejects_blocks_of_the_wrong_type() {
    let h = issue_hierarchy();
    let material = h.root.material();
    let key_pem = material.private_key_pem().unwrap();
    let cert_pem = material.certificate_pem();

    assert!(RootCertificate::parse(Some(&key_pem), None).is_err());
    assert!(RootCertificate::parse(None, Some(&cert_pem)).is_err());
    assert!(RootCertificate::parse(Some("garbage"), None).is_err());

    // Either side alone is fine.
    let only_cert = RootCertificate::parse(Some(&cert_pem), None).unwrap();
    assert!(only_cert.material().private_key().is_none());
    assert_eq!(only_cert.material().name, "Root");
    let only_key = RootCertificate::parse(None, Some(&key_pem)).unwrap();
    assert!(only_key.material().certificate_der().is_none());
}

#[test]
fn from_database_checks_the_tier() {
    let h = issue_hierarchy();
    let row = as_row(CertificateType::Intermediate, h.intermediate.material());

    assert!(RootCertificate::from_database(&row).is_err());
    let any = X509Certificate::from_database(&row).unwrap();
    assert_eq!(any.certificate_type(), CertificateType::Intermediate);
    assert_eq!(any.material().config, row.config);
}

#[test]
fn files_round_trip_with_owner_only_permissions() {
    let h = issue_hierarchy();
    let dir = tempfile::tempdir().unwrap();

    let files = h.intermediate.save_to_file(dir.path()).unwrap();
    assert!(files.certificate.ends_with("certificates/intermediate_ca_T1_Int.crt"));
    assert!(files.private_key.exists());
    assert!(files.csr.exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for path in [&files.certificate, &files.private_key, &files.csr] {
            let mode = std::fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{}", path.display());
        }
    }

    let loaded = IntermediateCertificate::load_from_file(dir.path(), "T1_Int").unwrap();
    assert_eq!(loaded.material().name, "T1 Int");
    assert_eq!(
        loaded.material().certificate_der(),
        h.intermediate.material().certificate_der()
    );
    assert_eq!(loaded.material().chain_der().len(), 1);
    assert!(loaded.material().csr_der().is_some());

    let missing = IntermediateCertificate::load_from_file(dir.path(), "absent").unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn install_saves_then_calls_the_backend() {
    let h = issue_hierarchy();
    let dir = tempfile::tempdir().unwrap();
    let mut diag = Diagnostics::new("install");

    let path = h
        .root
        .install(
            &kiln_core::AppContext::background(),
            &kiln_pki::NoopTrust,
            dir.path(),
            &mut diag,
        )
        .await
        .unwrap();
    assert!(path.exists());
    assert_eq!(diag.first_error().unwrap().code, "not_implemented");
}
