/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A volatile, in-memory implementation of [`BlockStore`].

use std::collections::HashMap;

use crate::types::{block::Block, data_types::CryptoHash};

use super::BlockStore;

/// Stores blocks in a hash map keyed by block hash.
///
/// The store starts out holding only the [genesis block](Block::genesis).
///
/// ## Pruning
///
/// Once a block `B` is committed, every block with a view lower than `B.view` is either an ancestor of
/// `B` (which now has a committed child) or sits on a fork that can never be committed. `prune` removes
/// all of them.
pub struct InMemoryBlockStore {
    blocks: HashMap<CryptoHash, Block>,
}

impl InMemoryBlockStore {
    /// Create a new store containing the genesis block.
    pub fn new() -> Self {
        let genesis = Block::genesis();
        let mut blocks = HashMap::new();
        blocks.insert(genesis.hash, genesis);
        Self { blocks }
    }

    /// Get the number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn store(&mut self, block: Block) {
        self.blocks.entry(block.hash).or_insert(block);
    }

    fn get(&self, hash: &CryptoHash) -> Option<Block> {
        self.blocks.get(hash).cloned()
    }

    fn contains(&self, hash: &CryptoHash) -> bool {
        self.blocks.contains_key(hash)
    }

    fn prune(&mut self, committed: &Block) -> Vec<CryptoHash> {
        let pruned: Vec<CryptoHash> = self
            .blocks
            .values()
            .filter(|block| block.view < committed.view)
            .map(|block| block.hash)
            .collect();
        for hash in &pruned {
            self.blocks.remove(hash);
        }
        pruned
    }
}
