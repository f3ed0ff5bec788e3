/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages used to recover blocks that a replica learns about (through a parent link or a QC) but
//! has not received.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{block::Block, data_types::CryptoHash};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum BlockFetchMessage {
    Fetch(Fetch),
    Deliver(Deliver),
}

/// Request for the block identified by `hash`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Fetch {
    pub hash: CryptoHash,
}

/// A block sent in response to a [`Fetch`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Deliver {
    pub block: Block,
}
