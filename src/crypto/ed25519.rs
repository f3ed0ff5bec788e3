/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [`Signer`] and [`Verifier`] backed by Ed25519 keys from [`ed25519_dalek`].

use ed25519_dalek::Verifier as _;

use crate::types::{
    block::Block,
    certificates::{PartialCert, QuorumCert, Signature, TimeoutCert, TimeoutMsg},
    crypto_primitives::{Keypair, SigningKey},
    data_types::{CryptoHash, ReplicaID, ViewNumber},
    replica_set::ReplicaSet,
};

use super::{CertificateError, Signer, Verifier};

/// Signs as replica `me` with an Ed25519 signing key, and verifies against the verifying keys stored
/// in a [`ReplicaSet`].
#[derive(Clone)]
pub struct Ed25519Crypto {
    me: ReplicaID,
    keypair: Keypair,
    replica_set: ReplicaSet,
}

impl Ed25519Crypto {
    pub fn new(me: ReplicaID, signing_key: SigningKey, replica_set: ReplicaSet) -> Self {
        Self {
            me,
            keypair: Keypair::new(signing_key),
            replica_set,
        }
    }

    /// Get the ID this instance signs as.
    pub fn id(&self) -> ReplicaID {
        self.me
    }

    /// Check whether the verifying key registered for `me` in the replica set matches the signing key.
    pub fn is_member(&self) -> bool {
        self.replica_set.verifying_key(&self.me) == Some(&self.keypair.public())
    }

    /// Sort `signatures` by signer and check that they come from a quorum of distinct members.
    fn aggregate(
        &self,
        mut signatures: Vec<Signature>,
    ) -> Result<Vec<Signature>, CertificateError> {
        signatures.sort_by_key(|signature| signature.signer);
        for pair in signatures.windows(2) {
            if pair[0].signer == pair[1].signer {
                return Err(CertificateError::DuplicateSigner {
                    signer: pair[0].signer,
                });
            }
        }
        if let Some(signature) = signatures
            .iter()
            .find(|signature| !self.replica_set.contains(&signature.signer))
        {
            return Err(CertificateError::UnknownSigner {
                signer: signature.signer,
            });
        }

        let needed = self.replica_set.quorum_size();
        if signatures.len() < needed {
            return Err(CertificateError::NotEnoughSignatures {
                got: signatures.len(),
                needed,
            });
        }

        Ok(signatures)
    }

    /// Check that `signatures` are a quorum of valid signatures over `hash` from distinct members, in
    /// ascending order of signer.
    fn verify_quorum(&self, signatures: &[Signature], hash: &CryptoHash) -> bool {
        signatures.len() >= self.replica_set.quorum_size()
            && signatures
                .windows(2)
                .all(|pair| pair[0].signer < pair[1].signer)
            && signatures
                .iter()
                .all(|signature| self.verify(signature, hash))
    }
}

impl Signer for Ed25519Crypto {
    fn sign(&self, hash: &CryptoHash) -> Signature {
        Signature {
            signer: self.me,
            bytes: self.keypair.sign(hash),
        }
    }

    fn create_partial_cert(&self, block: &Block) -> PartialCert {
        PartialCert {
            signature: self.sign(&block.hash),
            block: block.hash,
        }
    }

    fn create_quorum_cert(
        &self,
        block: &Block,
        certs: &[PartialCert],
    ) -> Result<QuorumCert, CertificateError> {
        if let Some(cert) = certs.iter().find(|cert| cert.block != block.hash) {
            return Err(CertificateError::MismatchedBlock {
                expected: block.hash,
                found: cert.block,
            });
        }

        let signatures = self.aggregate(certs.iter().map(|cert| cert.signature).collect())?;
        Ok(QuorumCert {
            block: block.hash,
            signatures,
        })
    }

    fn create_timeout_cert(
        &self,
        view: ViewNumber,
        timeouts: &[TimeoutMsg],
    ) -> Result<TimeoutCert, CertificateError> {
        if let Some(timeout) = timeouts.iter().find(|timeout| timeout.view != view) {
            return Err(CertificateError::MismatchedView {
                expected: view,
                found: timeout.view,
            });
        }

        let signatures =
            self.aggregate(timeouts.iter().map(|timeout| timeout.signature).collect())?;
        Ok(TimeoutCert { view, signatures })
    }
}

impl Verifier for Ed25519Crypto {
    fn verify(&self, signature: &Signature, hash: &CryptoHash) -> bool {
        match self.replica_set.verifying_key(&signature.signer) {
            Some(verifying_key) => {
                let signature = ed25519_dalek::Signature::from_bytes(&signature.bytes.bytes());
                verifying_key.verify(&hash.bytes(), &signature).is_ok()
            }
            None => false,
        }
    }

    fn verify_quorum_cert(&self, qc: &QuorumCert) -> bool {
        qc.is_genesis() || self.verify_quorum(&qc.signatures, &qc.block)
    }

    fn verify_timeout_cert(&self, tc: &TimeoutCert) -> bool {
        self.verify_quorum(&tc.signatures, &tc.view.to_hash())
    }
}
