/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Predicates over the chain of blocks that decide whether a replica may vote for a block, and which
//! block, if any, a new block allows the replica to commit.
//!
//! All functions here are pure reads of the [`BlockStore`]. Blocks that are not stored are reported as
//! such instead of being assumed, so that callers can fetch them and retry.

use crate::{
    block_store::BlockStore,
    types::{
        block::Block,
        certificates::QuorumCert,
        data_types::{CryptoHash, ViewNumber},
    },
};

/// How a proposed block relates to the block certified by its own `justify`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Ancestry {
    /// The certified block is reachable from the proposed block through stored parent links, views
    /// strictly decrease along the way, and every block in between is a gap filler.
    Extends,
    /// The walk reached a block that is not stored.
    Missing(CryptoHash),
    /// The proposed block does not extend the block it claims to justify, or a block in between carries
    /// a command or a different justify.
    Broken,
}

/// Check whether `block` only fills a view gap below a block justified by `justify`: it carries no
/// command, and certifies the same block.
///
/// Commands in blocks between a proposal and the block its QC certifies are never seen by the
/// [`Acceptor`](crate::app::Acceptor), so only empty blocks may sit there.
pub(crate) fn is_gap_filler(block: &Block, justify: &QuorumCert) -> bool {
    block.command.is_empty() && block.justify.block == justify.block
}

/// Walk the parent links of `block` down to `block.justify.block`.
pub(crate) fn ancestry<B: BlockStore>(block: &Block, block_store: &B) -> Ancestry {
    let target = match block_store.get(&block.justify.block) {
        Some(target) => target,
        None => return Ancestry::Missing(block.justify.block),
    };
    if target.view >= block.view {
        return Ancestry::Broken;
    }

    let mut cursor = block.parent;
    let mut child_view = block.view;
    loop {
        if cursor == target.hash {
            return Ancestry::Extends;
        }
        let ancestor = match block_store.get(&cursor) {
            Some(ancestor) => ancestor,
            None => return Ancestry::Missing(cursor),
        };
        if ancestor.view >= child_view
            || ancestor.view <= target.view
            || !is_gap_filler(&ancestor, &block.justify)
        {
            return Ancestry::Broken;
        }
        child_view = ancestor.view;
        cursor = ancestor.parent;
    }
}

/// Check whether `leaf` is the block certified by `high_qc`, or reaches it through stored
/// [gap fillers](is_gap_filler) justified by `high_qc`.
pub(crate) fn extends_with_gap_fillers<B: BlockStore>(
    leaf: &CryptoHash,
    high_qc: &QuorumCert,
    block_store: &B,
) -> bool {
    let mut cursor = *leaf;
    loop {
        if cursor == high_qc.block {
            return true;
        }
        match block_store.get(&cursor) {
            Some(block) if is_gap_filler(&block, high_qc) => cursor = block.parent,
            _ => return false,
        }
    }
}

/// Get the view of the block certified by `qc`, if that block is stored.
pub(crate) fn qc_view<B: BlockStore>(qc: &QuorumCert, block_store: &B) -> Option<ViewNumber> {
    block_store.get(&qc.block).map(|block| block.view)
}

/// The locking rule: a replica only votes for a block whose justify certifies a block at least as
/// recent as the one certified by its locked QC.
///
/// # Preconditions
/// `ancestry(block, block_store) == Ancestry::Extends`.
pub(crate) fn safe_to_vote<B: BlockStore>(
    block: &Block,
    locked_qc: &QuorumCert,
    block_store: &B,
) -> bool {
    match (
        qc_view(&block.justify, block_store),
        qc_view(locked_qc, block_store),
    ) {
        (Some(justify_view), Some(locked_view)) => justify_view >= locked_view,
        _ => false,
    }
}

/// The three-chain commit rule.
///
/// Let `b1` be the block certified by `block.justify` and `b` the block certified by `b1.justify`. If
/// `block`, `b1`, and `b` are direct parent-child links in consecutive views, returns `b`, which can
/// now be committed along with all of its uncommitted ancestors.
pub(crate) fn block_to_commit<B: BlockStore>(block: &Block, block_store: &B) -> Option<Block> {
    let b1 = block_store.get(&block.justify.block)?;
    let b = block_store.get(&b1.justify.block)?;

    let direct = block.parent == b1.hash && b1.parent == b.hash;
    let consecutive = block.view == b1.view + 1 && b1.view == b.view + 1;
    if direct && consecutive {
        Some(b)
    } else {
        None
    }
}
