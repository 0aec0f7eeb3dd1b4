//! Kiln PKI: a three-tier X.509 certificate authority.
//!
//! A global self-signed root signs one intermediate per tenant, which in
//! turn signs the tenant's end-entity certificates. This crate provides:
//! - The certificate engine ([`CertificateOps`], [`X509Certificate`])
//! - Chain verification ([`verify_chain`])
//! - On-disk storage and OS trust-store installation ([`TrustBackend`])
//! - [`CertificateService`], which persists issuance through the store

pub mod certificate;
pub mod chain;
mod der;
pub mod key;
pub mod serial;
pub mod service;
pub mod storage;
mod template;
pub mod trust;

pub use certificate::{
    CertificateInfo, CertificateMaterial, CertificateOps, EndEntityCertificate,
    IntermediateCertificate, RootCertificate, X509Certificate,
};
pub use chain::{verify_chain, verify_pem_chain};
pub use key::RsaKey;
pub use serial::{Serial, SerialRegistry};
pub use service::{CertificateService, IssueCertificate};
pub use storage::CertificateFiles;
pub use trust::{DefaultTrustBackend, NoopTrust, TrustBackend, TrustStore, WindowsCertutil};
