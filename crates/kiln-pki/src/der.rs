//! Just enough DER to express the extensions rcgen has no model for.

use yasna::models::ObjectIdentifier;

pub const OID_EMAIL_ADDRESS: &[u64] = &[1, 2, 840, 113549, 1, 9, 1];
pub const OID_CERTIFICATE_POLICIES: &[u64] = &[2, 5, 29, 32];

pub const OID_IPSEC_END_SYSTEM: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 5];
pub const OID_IPSEC_TUNNEL: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 6];
pub const OID_IPSEC_USER: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 7];

pub const POLICY_4: &[u64] = &[1, 3, 6, 1, 4, 1, 11129, 2, 5, 3];
pub const POLICY_5: &[u64] = &[2, 23, 140, 1, 2, 1];
pub const POLICY_6: &[u64] = &[2, 23, 140, 1, 2, 2];
pub const ROOT_POLICY_3: &[u64] = &[1, 3, 6, 1, 4, 1, 11129, 2, 5, 3, 2];
pub const ROOT_POLICY_4: &[u64] = &[1, 3, 6, 1, 4, 1, 11129, 2, 5, 3, 3];

/// `certificatePolicies ::= SEQUENCE OF PolicyInformation`, qualifiers omitted.
pub fn certificate_policies(policies: &[&[u64]]) -> Vec<u8> {
    yasna::construct_der(|writer| {
        writer.write_sequence_of(|writer| {
            for policy in policies {
                writer.next().write_sequence(|writer| {
                    writer.next().write_oid(&ObjectIdentifier::from_slice(policy));
                });
            }
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_nest_one_sequence_per_policy() {
        let der = certificate_policies(&[POLICY_5, POLICY_6]);
        assert_eq!(der[0], 0x30);
        assert_eq!(der[1] as usize, der.len() - 2);
        assert_eq!(&der[2..4], &[0x30, 0x08]);
        assert_eq!(&der[4..10], &[0x06, 0x06, 0x67, 0x81, 0x0c, 0x01]);
    }

    #[test]
    fn multi_byte_components_use_base128() {
        let der = certificate_policies(&[POLICY_4]);
        assert_eq!(
            &der[4..],
            &[0x06, 0x0a, 0x2b, 0x06, 0x01, 0x04, 0x01, 0xd6, 0x79, 0x02, 0x05, 0x03]
        );
    }
}
