/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Shapes of the signed objects that replicas exchange: single signatures, votes ([`PartialCert`]),
//! and the certificates they aggregate into ([`QuorumCert`], [`TimeoutCert`]).
//!
//! These types only carry data. Producing and checking them is the job of the certificate algebra in
//! [`crypto`](crate::crypto).

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    block::Block,
    data_types::{CryptoHash, ReplicaID, SignatureBytes, ViewNumber},
};

/// A signature over some 32-byte subject, tagged with the ID of the replica that claims to have
/// produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Signature {
    pub signer: ReplicaID,
    pub bytes: SignatureBytes,
}

/// A single replica's vote for a block: its signature over the block's hash.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PartialCert {
    pub signature: Signature,
    pub block: CryptoHash,
}

impl PartialCert {
    /// Get the ID of the replica that cast this vote.
    pub fn signer(&self) -> ReplicaID {
        self.signature.signer
    }
}

/// Proof that a quorum of replicas voted for the block identified by `block`.
///
/// `signatures` are sorted in ascending order of signer and contain no signer twice.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct QuorumCert {
    pub block: CryptoHash,
    pub signatures: Vec<Signature>,
}

impl QuorumCert {
    /// Get the QC that certifies the [genesis block](Block::genesis). It carries no signatures and is
    /// trusted by every replica.
    pub fn genesis() -> QuorumCert {
        QuorumCert {
            block: Block::genesis().hash,
            signatures: Vec::new(),
        }
    }

    /// Check whether this is the [genesis QC](Self::genesis).
    pub fn is_genesis(&self) -> bool {
        self.signatures.is_empty() && self.block == Block::genesis().hash
    }

    /// The placeholder embedded in the genesis block itself, which has no parent to certify.
    pub(crate) fn null() -> QuorumCert {
        QuorumCert {
            block: CryptoHash::zero(),
            signatures: Vec::new(),
        }
    }
}

/// Sent by a replica when its timer for `view` fires before the view made progress.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TimeoutMsg {
    pub sender: ReplicaID,
    pub view: ViewNumber,
    /// Signature over [`view.to_hash()`](ViewNumber::to_hash).
    pub signature: Signature,
    /// The highest QC known to `sender` when it gave up on `view`.
    pub high_qc: QuorumCert,
}

/// Proof that a quorum of replicas gave up on `view`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TimeoutCert {
    pub view: ViewNumber,
    pub signatures: Vec<Signature>,
}

/// The highest QC and/or TC known to a replica, used to justify a view change.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SyncInfo {
    pub qc: Option<QuorumCert>,
    pub tc: Option<TimeoutCert>,
}

impl SyncInfo {
    /// Create a `SyncInfo` carrying only a QC.
    pub fn with_qc(qc: QuorumCert) -> SyncInfo {
        SyncInfo {
            qc: Some(qc),
            tc: None,
        }
    }

    /// Create a `SyncInfo` carrying only a TC.
    pub fn with_tc(tc: TimeoutCert) -> SyncInfo {
        SyncInfo {
            qc: None,
            tc: Some(tc),
        }
    }

    /// Check whether this `SyncInfo` carries neither a QC nor a TC.
    pub fn is_empty(&self) -> bool {
        self.qc.is_none() && self.tc.is_none()
    }
}
