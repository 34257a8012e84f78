//! Identity service: who is behind a key.
//!
//! Well-known parties are registered when nodes join the network. Confidential
//! keys become nameable only through verified [`IdentityCertificate`]s, which
//! arrive during identity sync or are created locally.

use dashmap::DashMap;

use iou_protocol::identity::CertificateError;
use iou_protocol::{AbstractParty, AnonymousParty, IdentityCertificate, Party, PublicKey};

#[derive(Debug, Default)]
pub struct IdentityService {
    by_key: DashMap<PublicKey, Party>,
    by_name: DashMap<String, Party>,
    certificates: DashMap<PublicKey, IdentityCertificate>,
}

impl IdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_party(&self, party: &Party) {
        self.by_key.insert(party.owning_key.clone(), party.clone());
        self.by_name.insert(party.name.clone(), party.clone());
    }

    pub fn party_from_name(&self, name: &str) -> Option<Party> {
        self.by_name.get(name).map(|p| p.value().clone())
    }

    pub fn parties(&self) -> Vec<Party> {
        let mut parties: Vec<Party> = self.by_name.iter().map(|p| p.value().clone()).collect();
        parties.sort_by(|a, b| a.name.cmp(&b.name));
        parties
    }

    /// Legal key or certified confidential key to its well-known party.
    pub fn well_known_party_from_key(&self, key: &PublicKey) -> Option<Party> {
        if let Some(party) = self.by_key.get(key) {
            return Some(party.value().clone());
        }
        self.certificates.get(key).map(|c| c.party.clone())
    }

    pub fn well_known_party_from_anonymous(&self, party: &AnonymousParty) -> Option<Party> {
        self.well_known_party_from_key(&party.owning_key)
    }

    pub fn well_known_party(&self, party: &AbstractParty) -> Option<Party> {
        match party {
            AbstractParty::WellKnown(p) => Some(p.clone()),
            AbstractParty::Anonymous(a) => self.well_known_party_from_anonymous(a),
        }
    }

    pub fn knows_key(&self, key: &PublicKey) -> bool {
        self.by_key.contains_key(key) || self.certificates.contains_key(key)
    }

    /// Verify and store a certificate. Registering the same binding twice is a
    /// no-op.
    pub fn register_certificate(&self, cert: IdentityCertificate) -> Result<(), CertificateError> {
        cert.verify()?;
        tracing::debug!(
            party = %cert.party,
            key = %cert.anonymous_key.short(),
            "registered confidential identity"
        );
        self.certificates.insert(cert.anonymous_key.clone(), cert);
        Ok(())
    }

    pub fn certificate_for(&self, key: &PublicKey) -> Option<IdentityCertificate> {
        self.certificates.get(key).map(|c| c.value().clone())
    }
}
