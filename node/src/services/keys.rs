//! Key management.
//!
//! Holds a node's legal identity keypair and the confidential keypairs it
//! creates for change outputs. Private keys never leave this service; callers
//! ask for signatures by public key.

use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

use iou_protocol::identity::CertificateError;
use iou_protocol::{
    IdentityCertificate, Keypair, Party, PublicKey, SecureHash, SignedTransaction,
    TransactionSignature, WireTransaction,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyServiceError {
    #[error("no private key held for {0}")]
    UnknownKey(PublicKey),

    #[error(transparent)]
    Certificate(#[from] CertificateError),
}

#[derive(Debug)]
pub struct KeyManagementService {
    identity: Party,
    legal: Keypair,
    confidential: RwLock<HashMap<PublicKey, Keypair>>,
}

impl KeyManagementService {
    /// `legal` must be the keypair behind `identity.owning_key`.
    pub fn new(identity: Party, legal: Keypair) -> Self {
        Self {
            identity,
            legal,
            confidential: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a legal keypair and the party it backs.
    pub fn generate(name: impl Into<String>) -> Self {
        let legal = Keypair::generate();
        let identity = Party::new(name, legal.public_key());
        Self::new(identity, legal)
    }

    pub fn identity(&self) -> &Party {
        &self.identity
    }

    pub fn legal_key(&self) -> PublicKey {
        self.legal.public_key()
    }

    /// Create a confidential key and certify it under the legal identity.
    pub fn fresh_confidential_identity(&self) -> Result<IdentityCertificate, KeyServiceError> {
        let keypair = Keypair::generate();
        let cert = IdentityCertificate::issue(&self.identity, &self.legal, keypair.public_key())?;
        self.confidential.write().insert(keypair.public_key(), keypair);
        tracing::trace!(key = %cert.anonymous_key.short(), "confidential identity created");
        Ok(cert)
    }

    /// A fresh certificate for a confidential key this node holds.
    pub fn certify(&self, key: &PublicKey) -> Result<IdentityCertificate, KeyServiceError> {
        if !self.confidential.read().contains_key(key) {
            return Err(KeyServiceError::UnknownKey(key.clone()));
        }
        Ok(IdentityCertificate::issue(&self.identity, &self.legal, key.clone())?)
    }

    /// Whether this node can sign with `key`.
    pub fn owns(&self, key: &PublicKey) -> bool {
        *key == self.identity.owning_key || self.confidential.read().contains_key(key)
    }

    /// The subset of `keys` this node holds.
    pub fn filter_owned<'a>(&self, keys: impl IntoIterator<Item = &'a PublicKey>) -> Vec<PublicKey> {
        keys.into_iter().filter(|k| self.owns(k)).cloned().collect()
    }

    pub fn sign(&self, tx_id: &SecureHash, key: &PublicKey) -> Result<TransactionSignature, KeyServiceError> {
        if *key == self.identity.owning_key {
            return Ok(TransactionSignature::create(tx_id, &self.legal));
        }
        self.confidential
            .read()
            .get(key)
            .map(|kp| TransactionSignature::create(tx_id, kp))
            .ok_or_else(|| KeyServiceError::UnknownKey(key.clone()))
    }

    /// Start a signed transaction carrying signatures by every key in `keys`.
    pub fn sign_transaction(
        &self,
        wtx: WireTransaction,
        keys: &[PublicKey],
    ) -> Result<SignedTransaction, KeyServiceError> {
        let tx_id = wtx.id();
        let sigs = keys
            .iter()
            .map(|k| self.sign(&tx_id, k))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SignedTransaction::new(wtx, sigs))
    }

    /// Signatures by every required key this node holds.
    pub fn signatures_for(
        &self,
        stx: &SignedTransaction,
    ) -> Result<Vec<TransactionSignature>, KeyServiceError> {
        let tx_id = stx.id();
        self.filter_owned(stx.required_signing_keys().iter())
            .iter()
            .map(|k| self.sign(&tx_id, k))
            .collect()
    }
}
