//! # Identity Certificates
//!
//! A certificate is a well-known party vouching for a confidential key:
//! "this anonymous key is mine". The party signs a digest of its own name, its
//! legal key, the anonymous key and the issue time with its legal key.
//!
//! Counterparties that receive a certificate can name the owner of an
//! anonymous key without trusting the sender, since the signature only
//! verifies under the claimed party's key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::party::{AnonymousParty, Party};
use crate::crypto::{sha256_parts, Keypair, PublicKey, SecureHash, Signature};

const CERTIFICATE_DOMAIN: &[u8] = b"iou-ledger/identity-certificate/v1";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CertificateError {
    #[error("certificate for {party} was not signed by the party's legal key")]
    BadSignature { party: String },

    #[error("signing key does not match the certified party {party}")]
    WrongSigner { party: String },
}

/// Binding between a well-known party and one of its confidential keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCertificate {
    pub party: Party,
    pub anonymous_key: PublicKey,
    pub issued_at: DateTime<Utc>,
    pub signature: Signature,
}

impl IdentityCertificate {
    /// Certify `anonymous_key` as belonging to `party`. `legal_key` must be
    /// the party's legal identity keypair.
    pub fn issue(
        party: &Party,
        legal_key: &Keypair,
        anonymous_key: PublicKey,
    ) -> Result<Self, CertificateError> {
        if legal_key.public_key() != party.owning_key {
            return Err(CertificateError::WrongSigner {
                party: party.name.clone(),
            });
        }
        let issued_at = Utc::now();
        let digest = Self::digest(party, &anonymous_key, &issued_at);
        Ok(Self {
            party: party.clone(),
            anonymous_key,
            issued_at,
            signature: legal_key.sign(digest.as_bytes()),
        })
    }

    /// Check the party's signature over the binding.
    pub fn verify(&self) -> Result<(), CertificateError> {
        let digest = Self::digest(&self.party, &self.anonymous_key, &self.issued_at);
        if self
            .party
            .owning_key
            .verify(digest.as_bytes(), &self.signature)
        {
            Ok(())
        } else {
            Err(CertificateError::BadSignature {
                party: self.party.name.clone(),
            })
        }
    }

    pub fn anonymous_party(&self) -> AnonymousParty {
        AnonymousParty::new(self.anonymous_key.clone())
    }

    fn digest(party: &Party, anonymous_key: &PublicKey, issued_at: &DateTime<Utc>) -> SecureHash {
        sha256_parts(&[
            CERTIFICATE_DOMAIN,
            party.name.as_bytes(),
            party.owning_key.as_bytes(),
            anonymous_key.as_bytes(),
            &issued_at.timestamp_millis().to_le_bytes(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> (Party, Keypair) {
        let kp = Keypair::generate();
        (Party::new("Alice", kp.public_key()), kp)
    }

    #[test]
    fn issued_certificate_verifies() {
        let (party, legal) = alice();
        let anon = Keypair::generate().public_key();
        let cert = IdentityCertificate::issue(&party, &legal, anon.clone()).unwrap();
        assert!(cert.verify().is_ok());
        assert_eq!(cert.anonymous_party().owning_key, anon);
    }

    #[test]
    fn tampered_anonymous_key_fails() {
        let (party, legal) = alice();
        let mut cert =
            IdentityCertificate::issue(&party, &legal, Keypair::generate().public_key()).unwrap();
        cert.anonymous_key = Keypair::generate().public_key();
        assert_eq!(
            cert.verify(),
            Err(CertificateError::BadSignature {
                party: "Alice".into()
            })
        );
    }

    #[test]
    fn claiming_someone_elses_name_fails() {
        let (party, legal) = alice();
        let mut cert =
            IdentityCertificate::issue(&party, &legal, Keypair::generate().public_key()).unwrap();
        cert.party = Party::new("Alice", Keypair::generate().public_key());
        assert!(cert.verify().is_err());
    }

    #[test]
    fn wrong_signer_rejected_at_issue() {
        let (party, _) = alice();
        let other = Keypair::generate();
        let result = IdentityCertificate::issue(&party, &other, other.public_key());
        match result {
            Err(CertificateError::WrongSigner { .. }) => {}
            other => panic!("expected WrongSigner, got {:?}", other),
        }
    }
}
