/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events a replica emits, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events are published by
//! the algorithm thread into a channel and handled on the [event bus](crate::event_bus) thread, so
//! handlers never block consensus.

use std::sync::mpsc::Sender;
use std::time::{Duration, SystemTime};

use crate::hotstuff::messages::{NewView, Proposal, Vote};
use crate::types::{
    block::Block,
    certificates::{QuorumCert, TimeoutCert, TimeoutMsg},
    data_types::{CryptoHash, ReplicaID, ViewNumber},
};

pub enum Event {
    // Events that change the replica's chain state.
    InsertBlock(InsertBlockEvent),
    CommitBlock(CommitBlockEvent),
    PruneBlock(PruneBlockEvent),
    UpdateHighQC(UpdateHighQCEvent),
    UpdateLockedQC(UpdateLockedQCEvent),
    // Events that involve broadcasting/sending a message.
    Propose(ProposeEvent),
    Vote(VoteEvent),
    NewView(NewViewEvent),
    Timeout(TimeoutEvent),
    // Events that involve receiving a message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceiveVote(ReceiveVoteEvent),
    ReceiveNewView(ReceiveNewViewEvent),
    ReceiveTimeout(ReceiveTimeoutEvent),
    // View synchronization events.
    StartView(StartViewEvent),
    ViewTimeout(ViewTimeoutEvent),
    CollectQC(CollectQCEvent),
    CollectTC(CollectTCEvent),
    // Block fetch events.
    FetchBlock(FetchBlockEvent),
    DeliverBlock(DeliverBlockEvent),
}

impl Event {
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            // The event bus only goes away when the replica is shutting down.
            let _ = event_publisher.send(self);
        }
    }
}

pub struct InsertBlockEvent {
    pub timestamp: SystemTime,
    pub block: Block,
}

pub struct CommitBlockEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
    pub view: ViewNumber,
}

pub struct PruneBlockEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
}

/// The view is that of the block certified by `high_qc`.
pub struct UpdateHighQCEvent {
    pub timestamp: SystemTime,
    pub high_qc: QuorumCert,
    pub view: ViewNumber,
}

pub struct UpdateLockedQCEvent {
    pub timestamp: SystemTime,
    pub locked_qc: QuorumCert,
    pub view: ViewNumber,
}

pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
}

pub struct VoteEvent {
    pub timestamp: SystemTime,
    pub proposer: ReplicaID,
    pub vote: Vote,
}

pub struct NewViewEvent {
    pub timestamp: SystemTime,
    pub leader: ReplicaID,
    pub new_view: NewView,
}

pub struct TimeoutEvent {
    pub timestamp: SystemTime,
    pub timeout: TimeoutMsg,
}

pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub proposal: Proposal,
}

pub struct ReceiveVoteEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub vote: Vote,
}

pub struct ReceiveNewViewEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub new_view: NewView,
}

pub struct ReceiveTimeoutEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub timeout: TimeoutMsg,
}

pub struct StartViewEvent {
    pub timestamp: SystemTime,
    pub leader: ReplicaID,
    pub view: ViewNumber,
}

/// `timeout` is the duration the replica waited before giving up on `view`.
pub struct ViewTimeoutEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
    pub timeout: Duration,
}

pub struct CollectQCEvent {
    pub timestamp: SystemTime,
    pub quorum_cert: QuorumCert,
}

pub struct CollectTCEvent {
    pub timestamp: SystemTime,
    pub timeout_cert: TimeoutCert,
}

pub struct FetchBlockEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
}

pub struct DeliverBlockEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub block: CryptoHash,
}
