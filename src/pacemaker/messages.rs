/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas as part of the
//! [`Pacemaker`](crate::pacemaker::implementation::Pacemaker) protocol.
//!
//! The Pacemaker protocol involves a single type of message, [`TimeoutMsg`], which a replica
//! broadcasts when its timer for the current view expires. A quorum of timeout messages for the same
//! view forms a [`TimeoutCert`](crate::types::certificates::TimeoutCert), which lets every replica that
//! sees it move past that view.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{certificates::TimeoutMsg, data_types::ViewNumber};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum PacemakerMessage {
    Timeout(TimeoutMsg),
}

impl PacemakerMessage {
    pub fn view(&self) -> ViewNumber {
        match self {
            PacemakerMessage::Timeout(TimeoutMsg { view, .. }) => *view,
        }
    }
}

impl From<TimeoutMsg> for PacemakerMessage {
    fn from(value: TimeoutMsg) -> Self {
        PacemakerMessage::Timeout(value)
    }
}
