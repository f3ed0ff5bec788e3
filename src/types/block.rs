/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type and its associated methods.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    certificates::QuorumCert,
    crypto_primitives::{CryptoHasher, Digest},
    data_types::{Command, CryptoHash, ReplicaID, ViewNumber},
};

/// A single link in the chain of blocks.
///
/// Blocks refer to each other only by hash: `parent` names the block this one extends, and
/// `justify.block` names the (possibly more distant) ancestor certified by the QC the proposer
/// carried into this block. The two coincide unless the proposer filled a gap of views with
/// dummy blocks.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub hash: CryptoHash,
    pub parent: CryptoHash,
    pub command: Command,
    pub view: ViewNumber,
    pub justify: QuorumCert,
    pub proposer: ReplicaID,
}

impl Block {
    pub fn new(
        parent: CryptoHash,
        command: Command,
        view: ViewNumber,
        justify: QuorumCert,
        proposer: ReplicaID,
    ) -> Block {
        Block {
            hash: Block::hash(&parent, &command, view, &justify, proposer),
            parent,
            command,
            view,
            justify,
            proposer,
        }
    }

    /// The hard-coded root of every chain. All replicas trust it without a QC.
    pub fn genesis() -> Block {
        Block::new(
            CryptoHash::zero(),
            Command::empty(),
            ViewNumber::init(),
            QuorumCert::null(),
            ReplicaID::new(0),
        )
    }

    /// Compute the SHA256 hash of the block's contents.
    ///
    /// Variable-length fields are prefixed with their little-endian `u32` length so that distinct
    /// contents never feed the hasher the same byte stream.
    pub fn hash(
        parent: &CryptoHash,
        command: &Command,
        view: ViewNumber,
        justify: &QuorumCert,
        proposer: ReplicaID,
    ) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(parent.bytes());
        hasher.update((command.len() as u32).to_le_bytes());
        hasher.update(command.bytes());
        hasher.update(view.int().to_le_bytes());
        hasher.update(justify.block.bytes());
        hasher.update((justify.signatures.len() as u32).to_le_bytes());
        for signature in &justify.signatures {
            hasher.update(signature.signer.int().to_le_bytes());
            hasher.update(signature.bytes.bytes());
        }
        hasher.update(proposer.int().to_le_bytes());
        CryptoHash::new(hasher.finalize().into())
    }

    /// Check whether `hash` really is the hash of the block's contents.
    pub fn is_correct(&self) -> bool {
        self.hash
            == Block::hash(
                &self.parent,
                &self.command,
                self.view,
                &self.justify,
                self.proposer,
            )
    }

    /// Check whether this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.view == ViewNumber::init() && self.hash == Block::genesis().hash
    }
}
