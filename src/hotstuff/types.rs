/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of types specific to the [HotStuff](crate::hotstuff::implementation::HotStuff) protocol.

use std::collections::{hash_map::Entry, HashMap};

use crate::types::{
    block::Block,
    certificates::PartialCert,
    data_types::{CryptoHash, ReplicaID, ViewNumber},
};

/// Collects the votes for the blocks this replica proposes, until a quorum is reached.
///
/// Votes are grouped by the hash of the block they are for. Each signer counts at most once per
/// block, and a group is handed out exactly once: the vote that completes the quorum.
pub(crate) struct VoteCollector {
    quorum_size: usize,
    votes: HashMap<CryptoHash, HashMap<ReplicaID, PartialCert>>,
}

impl VoteCollector {
    pub(crate) fn new(quorum_size: usize) -> Self {
        Self {
            quorum_size,
            votes: HashMap::new(),
        }
    }

    /// Add `vote` to the group for its block. Returns the group, in no particular order, if `vote`
    /// completes a quorum.
    ///
    /// # Preconditions
    /// `vote` carries a valid signature.
    pub(crate) fn collect(&mut self, vote: PartialCert) -> Option<Vec<PartialCert>> {
        let group = self.votes.entry(vote.block).or_default();
        let already_complete = group.len() >= self.quorum_size;
        match group.entry(vote.signer()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(entry) => {
                entry.insert(vote);
            }
        }

        if !already_complete && group.len() == self.quorum_size {
            Some(group.values().cloned().collect())
        } else {
            None
        }
    }

    /// Forget every vote collected so far.
    pub(crate) fn clear(&mut self) {
        self.votes.clear()
    }
}

/// Proposals that could not be processed because a block they build on has not arrived yet, keyed by
/// the hash of the missing block.
#[derive(Default)]
pub(crate) struct PendingProposals {
    by_missing: HashMap<CryptoHash, Vec<(ReplicaID, Block)>>,
}

impl PendingProposals {
    /// Park `block` until the block identified by `missing` arrives. Returns whether this is the first
    /// proposal waiting on `missing`, i.e., whether `missing` still has to be requested.
    pub(crate) fn park(&mut self, missing: CryptoHash, origin: ReplicaID, block: Block) -> bool {
        let first = !self.by_missing.contains_key(&missing);
        let waiting = self.by_missing.entry(missing).or_default();
        if !waiting.iter().any(|(_, parked)| parked.hash == block.hash) {
            waiting.push((origin, block));
        }
        first
    }

    /// Remove and return the proposals that were waiting on `arrived`.
    pub(crate) fn take(&mut self, arrived: &CryptoHash) -> Vec<(ReplicaID, Block)> {
        self.by_missing.remove(arrived).unwrap_or_default()
    }

    /// Drop the proposals for views lower than `view`: they can no longer be voted for.
    pub(crate) fn retain_from(&mut self, view: ViewNumber) {
        self.by_missing.retain(|_, waiting| {
            waiting.retain(|(_, block)| block.view >= view);
            !waiting.is_empty()
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.by_missing.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        certificates::{QuorumCert, Signature},
        data_types::{Command, SignatureBytes},
    };

    fn vote(signer: u32, block: CryptoHash) -> PartialCert {
        PartialCert {
            signature: Signature {
                signer: ReplicaID::new(signer),
                bytes: SignatureBytes::new([0u8; 64]),
            },
            block,
        }
    }

    fn block(view: u64) -> Block {
        Block::new(
            Block::genesis().hash,
            Command::from("x"),
            ViewNumber::new(view),
            QuorumCert::genesis(),
            ReplicaID::new(0),
        )
    }

    #[test]
    fn vote_collector_hands_out_quorum_once() {
        let hash = block(1).hash;
        let mut collector = VoteCollector::new(3);
        assert!(collector.collect(vote(0, hash)).is_none());
        assert!(collector.collect(vote(0, hash)).is_none());
        assert!(collector.collect(vote(1, hash)).is_none());

        let quorum = collector.collect(vote(2, hash)).expect("third distinct vote completes the quorum");
        assert_eq!(quorum.len(), 3);

        assert!(collector.collect(vote(3, hash)).is_none());
    }

    #[test]
    fn vote_collector_keeps_blocks_apart() {
        let (a, b) = (block(1).hash, block(2).hash);
        let mut collector = VoteCollector::new(2);
        assert!(collector.collect(vote(0, a)).is_none());
        assert!(collector.collect(vote(1, b)).is_none());
        assert!(collector.collect(vote(1, a)).is_some());

        collector.clear();
        assert!(collector.collect(vote(0, b)).is_none());
    }

    #[test]
    fn pending_proposals_are_released_and_expired() {
        let mut pending = PendingProposals::default();
        let missing = block(1).hash;
        assert!(pending.park(missing, ReplicaID::new(1), block(3)));
        assert!(!pending.park(missing, ReplicaID::new(1), block(3)));
        assert!(!pending.park(missing, ReplicaID::new(2), block(4)));
        assert_eq!(pending.len(), 2);

        pending.retain_from(ViewNumber::new(4));
        assert_eq!(pending.len(), 1);

        let released = pending.take(&missing);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].1.view, ViewNumber::new(4));
        assert!(pending.take(&missing).is_empty());
    }
}
