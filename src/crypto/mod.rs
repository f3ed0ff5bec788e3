/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The certificate algebra: how single signatures aggregate into proofs.
//!
//! The algebra is specified by two traits. A [`Signer`] turns local decisions into signed objects and
//! combines validated votes or timeouts into certificates. A [`Verifier`] checks objects received from
//! other replicas. Both are deliberately narrow so that the consensus core does not depend on any one
//! signature scheme; [`ed25519::Ed25519Crypto`] is the implementation this crate ships.
//!
//! ## Failure semantics
//!
//! Verification never fails loudly: every `verify_*` method returns `false` for anything malformed,
//! and callers treat the object as if it had never arrived.
//!
//! Construction, on the other hand, reports a [`CertificateError`]. Callers are expected to only pass
//! in votes and timeouts that they have already verified, so an error here means a caller broke that
//! contract. A certificate is never synthesized from insufficient input.

use std::fmt::{self, Display, Formatter};

use crate::types::{
    block::Block,
    certificates::{PartialCert, QuorumCert, Signature, TimeoutCert, TimeoutMsg},
    data_types::{CryptoHash, ReplicaID, ViewNumber},
};

pub mod ed25519;

/// Produces signatures and certificates on behalf of the local replica.
pub trait Signer {
    /// Sign `hash` as the local replica.
    fn sign(&self, hash: &CryptoHash) -> Signature;

    /// Vote for `block` by signing its hash.
    fn create_partial_cert(&self, block: &Block) -> PartialCert;

    /// Combine a quorum of partial certs for `block` into a [`QuorumCert`].
    fn create_quorum_cert(
        &self,
        block: &Block,
        certs: &[PartialCert],
    ) -> Result<QuorumCert, CertificateError>;

    /// Combine a quorum of timeout messages for `view` into a [`TimeoutCert`].
    fn create_timeout_cert(
        &self,
        view: ViewNumber,
        timeouts: &[TimeoutMsg],
    ) -> Result<TimeoutCert, CertificateError>;
}

/// Checks signatures and certificates produced by (possibly Byzantine) replicas.
pub trait Verifier {
    /// Check that `signature` is a valid signature by its claimed signer over `hash`.
    fn verify(&self, signature: &Signature, hash: &CryptoHash) -> bool;

    fn verify_partial_cert(&self, cert: &PartialCert) -> bool {
        self.verify(&cert.signature, &cert.block)
    }

    /// Check that `qc` carries a quorum of valid signatures from distinct members over `qc.block`.
    /// The [genesis QC](QuorumCert::genesis) is always valid.
    fn verify_quorum_cert(&self, qc: &QuorumCert) -> bool;

    /// Check that `tc` carries a quorum of valid signatures from distinct members over
    /// [`tc.view.to_hash()`](ViewNumber::to_hash).
    fn verify_timeout_cert(&self, tc: &TimeoutCert) -> bool;

    /// Check that `timeout` was signed by its sender over the view it claims to abandon.
    fn verify_timeout_msg(&self, timeout: &TimeoutMsg) -> bool {
        timeout.signature.signer == timeout.sender
            && self.verify(&timeout.signature, &timeout.view.to_hash())
    }
}

/// Everything the consensus core needs from a signature scheme.
pub trait Crypto: Signer + Verifier + Send {}

impl<T: Signer + Verifier + Send> Crypto for T {}

/// Enumerates the ways a call to [`Signer::create_quorum_cert`] or [`Signer::create_timeout_cert`]
/// can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    /// Fewer distinct signatures than a quorum were provided.
    NotEnoughSignatures { got: usize, needed: usize },

    /// A partial cert was for a different block than the one being certified.
    MismatchedBlock {
        expected: CryptoHash,
        found: CryptoHash,
    },

    /// A timeout message was for a different view than the one being certified.
    MismatchedView {
        expected: ViewNumber,
        found: ViewNumber,
    },

    /// The same replica signed more than one of the inputs.
    DuplicateSigner { signer: ReplicaID },

    /// One of the inputs was signed by a replica outside of the replica set.
    UnknownSigner { signer: ReplicaID },
}

impl Display for CertificateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CertificateError::NotEnoughSignatures { got, needed } => {
                write!(f, "got {} signatures, but a quorum needs {}", got, needed)
            }
            CertificateError::MismatchedBlock { expected, found } => {
                write!(f, "expected a vote for block {}, found one for {}", expected, found)
            }
            CertificateError::MismatchedView { expected, found } => {
                write!(f, "expected a timeout for view {}, found one for {}", expected, found)
            }
            CertificateError::DuplicateSigner { signer } => {
                write!(f, "replica {} signed more than once", signer)
            }
            CertificateError::UnknownSigner { signer } => {
                write!(f, "replica {} is not a member of the replica set", signer)
            }
        }
    }
}

impl std::error::Error for CertificateError {}
