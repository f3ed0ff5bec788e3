/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exhaustive enumerations around every message variant exchanged between replicas.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    block_fetch::messages::{BlockFetchMessage, Deliver, Fetch},
    hotstuff::messages::{HotStuffMessage, NewView, Proposal, Vote},
    pacemaker::messages::PacemakerMessage,
    types::{certificates::TimeoutMsg, data_types::ViewNumber},
};

/// All message variants exchanged between replicas.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Message {
    /// See: [`HotStuffMessage`].
    HotStuffMessage(HotStuffMessage),

    /// See: [`PacemakerMessage`].
    PacemakerMessage(PacemakerMessage),

    /// See: [`BlockFetchMessage`].
    BlockFetchMessage(BlockFetchMessage),
}

impl Message {
    /// Get the view the message was sent for, if it is tied to one. Block fetch messages are not.
    pub fn view(&self) -> Option<ViewNumber> {
        match self {
            Message::HotStuffMessage(msg) => msg.view(),
            Message::PacemakerMessage(msg) => Some(msg.view()),
            Message::BlockFetchMessage(_) => None,
        }
    }
}

impl From<HotStuffMessage> for Message {
    fn from(value: HotStuffMessage) -> Self {
        Message::HotStuffMessage(value)
    }
}

impl From<Proposal> for Message {
    fn from(value: Proposal) -> Self {
        Message::HotStuffMessage(HotStuffMessage::Proposal(value))
    }
}

impl From<Vote> for Message {
    fn from(value: Vote) -> Self {
        Message::HotStuffMessage(HotStuffMessage::Vote(value))
    }
}

impl From<NewView> for Message {
    fn from(value: NewView) -> Self {
        Message::HotStuffMessage(HotStuffMessage::NewView(value))
    }
}

impl From<PacemakerMessage> for Message {
    fn from(value: PacemakerMessage) -> Self {
        Message::PacemakerMessage(value)
    }
}

impl From<TimeoutMsg> for Message {
    fn from(value: TimeoutMsg) -> Self {
        Message::PacemakerMessage(PacemakerMessage::Timeout(value))
    }
}

impl From<BlockFetchMessage> for Message {
    fn from(value: BlockFetchMessage) -> Self {
        Message::BlockFetchMessage(value)
    }
}

impl From<Fetch> for Message {
    fn from(value: Fetch) -> Self {
        Message::BlockFetchMessage(BlockFetchMessage::Fetch(value))
    }
}

impl From<Deliver> for Message {
    fn from(value: Deliver) -> Self {
        Message::BlockFetchMessage(BlockFetchMessage::Deliver(value))
    }
}
