/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas as part of the
//! [`HotStuff`](crate::hotstuff::implementation::HotStuff) protocol.
//!
//! ## Messages
//!
//! 1. [`Proposal`]: broadcast by the leader of a view, carrying the block it proposes.
//! 2. [`Vote`]: sent by a replica to the proposer of a block it deems safe.
//! 3. [`NewView`]: sent to the leader of a view that a replica enters without being its leader,
//!    carrying the highest certificates the replica knows of.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    block::Block,
    certificates::{PartialCert, SyncInfo},
    data_types::ViewNumber,
};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum HotStuffMessage {
    Proposal(Proposal),
    Vote(Vote),
    NewView(NewView),
}

impl HotStuffMessage {
    /// Get the view the message was sent in. Votes do not carry a view: they are matched against
    /// proposals by block hash.
    pub fn view(&self) -> Option<ViewNumber> {
        match self {
            HotStuffMessage::Proposal(Proposal { block }) => Some(block.view),
            HotStuffMessage::Vote(_) => None,
            HotStuffMessage::NewView(NewView { view, .. }) => Some(*view),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub block: Block,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    pub cert: PartialCert,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NewView {
    /// The view the sender has just entered.
    pub view: ViewNumber,
    pub sync_info: SyncInfo,
}
