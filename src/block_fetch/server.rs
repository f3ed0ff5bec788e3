/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Implements the [`BlockFetchServer`], the side of the block fetch protocol that answers other
//! replicas' [`Fetch`] requests from the local block store.

use crate::{
    block_fetch::messages::{Deliver, Fetch},
    block_store::BlockStore,
    networking::{network::Network, sending::SenderHandle},
    types::data_types::ReplicaID,
};

pub(crate) struct BlockFetchServer<N: Network> {
    sender: SenderHandle<N>,
}

impl<N: Network> BlockFetchServer<N> {
    pub(crate) fn new(sender: SenderHandle<N>) -> Self {
        Self { sender }
    }

    /// Send the requested block back to `origin` if it is stored. Requests for unknown or pruned blocks
    /// go unanswered: another replica may still have the block.
    pub(crate) fn on_receive_fetch<B: BlockStore>(
        &mut self,
        fetch: Fetch,
        origin: ReplicaID,
        block_store: &B,
    ) -> bool {
        match block_store.get(&fetch.hash) {
            Some(block) => {
                self.sender.send(origin, Deliver { block });
                true
            }
            None => {
                log::debug!("Fetch for unknown block {} from {}", fetch.hash, origin);
                false
            }
        }
    }
}
