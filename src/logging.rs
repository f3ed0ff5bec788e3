/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via replica's
//! [config](crate::replica::Configuration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveProposal](crate::events::ReceiveProposalEvent) is printed:
//!
//! ```text
//! ReceiveProposal, 1701329264, 3, fNGCJyk, 12
//! ```
//!
//! In the snippet:
//! - The third value is the ID of the replica the proposal came from.
//! - The fourth value is the first seven characters of the Base64 encoding of the hash of the proposed
//!   block.
//! - The fifth value is the view of the proposed block.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

use crate::events::*;
use crate::types::certificates::{QuorumCert, SyncInfo};

// Names of each event in PascalCase for printing:
pub const INSERT_BLOCK: &str = "InsertBlock";
pub const COMMIT_BLOCK: &str = "CommitBlock";
pub const PRUNE_BLOCK: &str = "PruneBlock";
pub const UPDATE_HIGH_QC: &str = "UpdateHighQC";
pub const UPDATE_LOCKED_QC: &str = "UpdateLockedQC";

pub const PROPOSE: &str = "Propose";
pub const VOTE: &str = "Vote";
pub const NEW_VIEW: &str = "NewView";
pub const TIMEOUT: &str = "Timeout";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_VOTE: &str = "ReceiveVote";
pub const RECEIVE_NEW_VIEW: &str = "ReceiveNewView";
pub const RECEIVE_TIMEOUT: &str = "ReceiveTimeout";

pub const START_VIEW: &str = "StartView";
pub const VIEW_TIMEOUT: &str = "ViewTimeout";
pub const COLLECT_QC: &str = "CollectQC";
pub const COLLECT_TC: &str = "CollectTC";

pub const FETCH_BLOCK: &str = "FetchBlock";
pub const DELIVER_BLOCK: &str = "DeliverBlock";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for InsertBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |insert_block_event: &InsertBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                INSERT_BLOCK,
                secs_since_unix_epoch(insert_block_event.timestamp),
                first_seven_base64_chars(&insert_block_event.block.hash.bytes()),
                insert_block_event.block.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_block_event: &CommitBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                COMMIT_BLOCK,
                secs_since_unix_epoch(commit_block_event.timestamp),
                first_seven_base64_chars(&commit_block_event.block.bytes()),
                commit_block_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for PruneBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |prune_block_event: &PruneBlockEvent| {
            log::info!(
                "{}, {}, {}",
                PRUNE_BLOCK,
                secs_since_unix_epoch(prune_block_event.timestamp),
                first_seven_base64_chars(&prune_block_event.block.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateHighQCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_high_qc_event: &UpdateHighQCEvent| {
            log::info!(
                "{}, {}, {}, {}",
                UPDATE_HIGH_QC,
                secs_since_unix_epoch(update_high_qc_event.timestamp),
                first_seven_base64_chars(&update_high_qc_event.high_qc.block.bytes()),
                update_high_qc_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateLockedQCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_locked_qc_event: &UpdateLockedQCEvent| {
            log::info!(
                "{}, {}, {}, {}",
                UPDATE_LOCKED_QC,
                secs_since_unix_epoch(update_locked_qc_event.timestamp),
                first_seven_base64_chars(&update_locked_qc_event.locked_qc.block.bytes()),
                update_locked_qc_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                first_seven_base64_chars(&propose_event.proposal.block.hash.bytes()),
                propose_event.proposal.block.view,
                propose_event.proposal.block.command.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for VoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |vote_event: &VoteEvent| {
            log::info!(
                "{}, {}, {}, {}",
                VOTE,
                secs_since_unix_epoch(vote_event.timestamp),
                vote_event.proposer,
                first_seven_base64_chars(&vote_event.vote.cert.block.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for NewViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |new_view_event: &NewViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                NEW_VIEW,
                secs_since_unix_epoch(new_view_event.timestamp),
                new_view_event.leader,
                new_view_event.new_view.view,
                sync_info_summary(&new_view_event.new_view.sync_info)
            )
        };
        Box::new(logger)
    }
}

impl Logger for TimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |timeout_event: &TimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}",
                TIMEOUT,
                secs_since_unix_epoch(timeout_event.timestamp),
                timeout_event.timeout.view,
                qc_summary(&timeout_event.timeout.high_qc)
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_proposal_event: &ReceiveProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                receive_proposal_event.origin,
                first_seven_base64_chars(&receive_proposal_event.proposal.block.hash.bytes()),
                receive_proposal_event.proposal.block.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveVoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_vote_event: &ReceiveVoteEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_VOTE,
                secs_since_unix_epoch(receive_vote_event.timestamp),
                receive_vote_event.origin,
                first_seven_base64_chars(&receive_vote_event.vote.cert.block.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveNewViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_new_view_event: &ReceiveNewViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_NEW_VIEW,
                secs_since_unix_epoch(receive_new_view_event.timestamp),
                receive_new_view_event.origin,
                receive_new_view_event.new_view.view,
                sync_info_summary(&receive_new_view_event.new_view.sync_info)
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_timeout_event: &ReceiveTimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_TIMEOUT,
                secs_since_unix_epoch(receive_timeout_event.timestamp),
                receive_timeout_event.origin,
                receive_timeout_event.timeout.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_view_event: &StartViewEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_VIEW,
                secs_since_unix_epoch(start_view_event.timestamp),
                start_view_event.leader,
                start_view_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ViewTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |view_timeout_event: &ViewTimeoutEvent| {
            log::info!(
                "{}, {}, {}, {:?}",
                VIEW_TIMEOUT,
                secs_since_unix_epoch(view_timeout_event.timestamp),
                view_timeout_event.view,
                view_timeout_event.timeout
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectQCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_qc_event: &CollectQCEvent| {
            log::info!(
                "{}, {}, {}",
                COLLECT_QC,
                secs_since_unix_epoch(collect_qc_event.timestamp),
                qc_summary(&collect_qc_event.quorum_cert)
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectTCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_tc_event: &CollectTCEvent| {
            log::info!(
                "{}, {}, {}, {}",
                COLLECT_TC,
                secs_since_unix_epoch(collect_tc_event.timestamp),
                collect_tc_event.timeout_cert.view,
                collect_tc_event.timeout_cert.signatures.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for FetchBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |fetch_block_event: &FetchBlockEvent| {
            log::info!(
                "{}, {}, {}",
                FETCH_BLOCK,
                secs_since_unix_epoch(fetch_block_event.timestamp),
                first_seven_base64_chars(&fetch_block_event.block.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for DeliverBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |deliver_block_event: &DeliverBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                DELIVER_BLOCK,
                secs_since_unix_epoch(deliver_block_event.timestamp),
                deliver_block_event.origin,
                first_seven_base64_chars(&deliver_block_event.block.bytes())
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

// Timestamps before the Unix Epoch are printed as 0.
fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}

fn qc_summary(qc: &QuorumCert) -> String {
    format!(
        "QC, block: {}, no. of signatures: {}",
        first_seven_base64_chars(&qc.block.bytes()),
        qc.signatures.len()
    )
}

fn sync_info_summary(sync_info: &SyncInfo) -> String {
    let qc = sync_info
        .qc
        .as_ref()
        .map_or(String::from("no QC"), qc_summary);
    let tc = sync_info
        .tc
        .as_ref()
        .map_or(String::from("no TC"), |tc| format!("TC, view: {}", tc.view));
    format!("{}; {}", qc, tc)
}
