/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable, content-addressed storage of blocks.
//!
//! ## Retention
//!
//! A block must remain retrievable until at least one of its children has been committed, so that
//! the chain walks made by the [commit rule](crate::hotstuff::invariants) never fail. The store does
//! not decide commitment by itself: the consensus engine calls [`prune`](BlockStore::prune) after every
//! commit, naming the block it just committed.
//!
//! [`InMemoryBlockStore`] is the implementation this crate ships. Users who want blocks to outlive
//! the process can implement [`BlockStore`] on top of their own database.

use crate::types::{block::Block, data_types::CryptoHash};

mod in_memory;
pub use in_memory::InMemoryBlockStore;

pub trait BlockStore: Send + 'static {
    /// Insert `block` keyed by its hash. Storing a block that is already stored is a no-op.
    fn store(&mut self, block: Block);

    /// Get the block identified by `hash`, if it is stored.
    fn get(&self, hash: &CryptoHash) -> Option<Block>;

    /// Check whether the block identified by `hash` is stored.
    fn contains(&self, hash: &CryptoHash) -> bool {
        self.get(hash).is_some()
    }

    /// Remove the blocks that can no longer be needed now that `committed` has been committed, and return
    /// their hashes.
    ///
    /// Implementations must keep `committed` itself and every block with a view greater than or equal
    /// to `committed.view`.
    fn prune(&mut self, committed: &Block) -> Vec<CryptoHash>;
}
