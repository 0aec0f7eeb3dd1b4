//! Path validation from a leaf up to a trust anchor.

use kiln_core::{KilnError, KilnResult};
use x509_parser::certificate::X509Certificate as ParsedCertificate;

use crate::certificate::{CERTIFICATE_TAG, parse_der};

/// Longest path accepted, anchor excluded.
const MAX_DEPTH: usize = 8;

fn subject_of(cert: &ParsedCertificate<'_>) -> String {
    cert.subject().to_string()
}

fn check_validity(cert: &ParsedCertificate<'_>) -> KilnResult<()> {
    if cert.validity().is_valid() {
        Ok(())
    } else {
        Err(KilnError::Certificate(format!(
            "{} is outside its validity window",
            subject_of(cert)
        )))
    }
}

/// Whether `parent` issued `child`: names link and the signature checks out.
fn issued_by(child: &ParsedCertificate<'_>, parent: &ParsedCertificate<'_>) -> bool {
    child.issuer().as_raw() == parent.subject().as_raw()
        && child
            .verify_signature(Some(parent.public_key()))
            .is_ok()
}

fn check_ca(cert: &ParsedCertificate<'_>) -> KilnResult<()> {
    if cert.is_ca() {
        Ok(())
    } else {
        Err(KilnError::Certificate(format!(
            "{} signs certificates but is not a CA",
            subject_of(cert)
        )))
    }
}

/// Verify `leaf` chains to one of `anchors` through `intermediates`.
///
/// Every link must match issuer to subject and carry a valid signature;
/// every certificate on the path must be inside its validity window and
/// every signer must be a CA.
pub fn verify_chain(leaf: &[u8], intermediates: &[Vec<u8>], anchors: &[Vec<u8>]) -> KilnResult<()> {
    let leaf = parse_der(leaf)?;
    let intermediates = intermediates
        .iter()
        .map(|der| parse_der(der))
        .collect::<KilnResult<Vec<_>>>()?;
    let anchors = anchors
        .iter()
        .map(|der| parse_der(der))
        .collect::<KilnResult<Vec<_>>>()?;
    if anchors.is_empty() {
        return Err(KilnError::validation("at least one trust anchor is required"));
    }

    check_validity(&leaf)?;
    let mut used = vec![false; intermediates.len()];
    let mut current = &leaf;
    for _ in 0..=MAX_DEPTH {
        if let Some(anchor) = anchors.iter().find(|anchor| issued_by(current, anchor)) {
            check_ca(anchor)?;
            return check_validity(anchor);
        }

        let next = intermediates
            .iter()
            .enumerate()
            .find(|(i, parent)| !used[*i] && issued_by(current, parent));
        let Some((index, parent)) = next else {
            return Err(KilnError::Certificate(format!(
                "no trusted issuer found for {}",
                subject_of(current)
            )));
        };
        check_ca(parent)?;
        check_validity(parent)?;
        used[index] = true;
        current = parent;
    }
    Err(KilnError::Certificate(format!(
        "certificate path longer than {MAX_DEPTH}"
    )))
}

/// Split a leaf-first PEM chain and verify it against PEM anchors.
pub fn verify_pem_chain(chain_pem: &str, anchors_pem: &str) -> KilnResult<()> {
    let chain = certificates_from_pem(chain_pem)?;
    let anchors = certificates_from_pem(anchors_pem)?;
    let Some((leaf, intermediates)) = chain.split_first() else {
        return Err(KilnError::validation("certificate chain is empty"));
    };
    verify_chain(leaf, intermediates, &anchors)
}

/// Every `CERTIFICATE` block in `input`, in order.
pub fn certificates_from_pem(input: &str) -> KilnResult<Vec<Vec<u8>>> {
    let blocks = pem::parse_many(input)
        .map_err(|e| KilnError::Certificate(format!("invalid certificate PEM: {e}")))?;
    Ok(blocks
        .into_iter()
        .filter(|block| block.tag() == CERTIFICATE_TAG)
        .map(|block| block.contents().to_vec())
        .collect())
}
