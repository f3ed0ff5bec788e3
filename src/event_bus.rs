/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which receives [events](crate::events) published by the algorithm thread and
//! passes each of them to the handlers registered for its type.
//!
//! Handlers come from two places: the default [loggers](crate::logging), registered if
//! [`log_events`](crate::replica::Configuration::log_events) is set, and the user-defined closures
//! passed to the [`ReplicaSpec`](crate::replica::ReplicaSpec) builder. Loggers always run before user
//! handlers.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// How long the event bus waits for an event before checking the shutdown signal again.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) struct EventHandlers {
    pub(crate) insert_block_handlers: Vec<HandlerPtr<InsertBlockEvent>>,
    pub(crate) commit_block_handlers: Vec<HandlerPtr<CommitBlockEvent>>,
    pub(crate) prune_block_handlers: Vec<HandlerPtr<PruneBlockEvent>>,
    pub(crate) update_high_qc_handlers: Vec<HandlerPtr<UpdateHighQCEvent>>,
    pub(crate) update_locked_qc_handlers: Vec<HandlerPtr<UpdateLockedQCEvent>>,

    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) vote_handlers: Vec<HandlerPtr<VoteEvent>>,
    pub(crate) new_view_handlers: Vec<HandlerPtr<NewViewEvent>>,
    pub(crate) timeout_handlers: Vec<HandlerPtr<TimeoutEvent>>,

    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_vote_handlers: Vec<HandlerPtr<ReceiveVoteEvent>>,
    pub(crate) receive_new_view_handlers: Vec<HandlerPtr<ReceiveNewViewEvent>>,
    pub(crate) receive_timeout_handlers: Vec<HandlerPtr<ReceiveTimeoutEvent>>,

    pub(crate) start_view_handlers: Vec<HandlerPtr<StartViewEvent>>,
    pub(crate) view_timeout_handlers: Vec<HandlerPtr<ViewTimeoutEvent>>,
    pub(crate) collect_qc_handlers: Vec<HandlerPtr<CollectQCEvent>>,
    pub(crate) collect_tc_handlers: Vec<HandlerPtr<CollectTCEvent>>,

    pub(crate) fetch_block_handlers: Vec<HandlerPtr<FetchBlockEvent>>,
    pub(crate) deliver_block_handlers: Vec<HandlerPtr<DeliverBlockEvent>>,
}

/// Build the list of handlers for one event type: its logger if `log_events`, then `user_handler`.
fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    if let Some(user_handler) = user_handler {
        handlers.push(user_handler);
    }
    handlers
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        insert_block_handler: Option<HandlerPtr<InsertBlockEvent>>,
        commit_block_handler: Option<HandlerPtr<CommitBlockEvent>>,
        prune_block_handler: Option<HandlerPtr<PruneBlockEvent>>,
        update_high_qc_handler: Option<HandlerPtr<UpdateHighQCEvent>>,
        update_locked_qc_handler: Option<HandlerPtr<UpdateLockedQCEvent>>,
        propose_handler: Option<HandlerPtr<ProposeEvent>>,
        vote_handler: Option<HandlerPtr<VoteEvent>>,
        new_view_handler: Option<HandlerPtr<NewViewEvent>>,
        timeout_handler: Option<HandlerPtr<TimeoutEvent>>,
        receive_proposal_handler: Option<HandlerPtr<ReceiveProposalEvent>>,
        receive_vote_handler: Option<HandlerPtr<ReceiveVoteEvent>>,
        receive_new_view_handler: Option<HandlerPtr<ReceiveNewViewEvent>>,
        receive_timeout_handler: Option<HandlerPtr<ReceiveTimeoutEvent>>,
        start_view_handler: Option<HandlerPtr<StartViewEvent>>,
        view_timeout_handler: Option<HandlerPtr<ViewTimeoutEvent>>,
        collect_qc_handler: Option<HandlerPtr<CollectQCEvent>>,
        collect_tc_handler: Option<HandlerPtr<CollectTCEvent>>,
        fetch_block_handler: Option<HandlerPtr<FetchBlockEvent>>,
        deliver_block_handler: Option<HandlerPtr<DeliverBlockEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            insert_block_handlers: handlers(log_events, insert_block_handler),
            commit_block_handlers: handlers(log_events, commit_block_handler),
            prune_block_handlers: handlers(log_events, prune_block_handler),
            update_high_qc_handlers: handlers(log_events, update_high_qc_handler),
            update_locked_qc_handlers: handlers(log_events, update_locked_qc_handler),
            propose_handlers: handlers(log_events, propose_handler),
            vote_handlers: handlers(log_events, vote_handler),
            new_view_handlers: handlers(log_events, new_view_handler),
            timeout_handlers: handlers(log_events, timeout_handler),
            receive_proposal_handlers: handlers(log_events, receive_proposal_handler),
            receive_vote_handlers: handlers(log_events, receive_vote_handler),
            receive_new_view_handlers: handlers(log_events, receive_new_view_handler),
            receive_timeout_handlers: handlers(log_events, receive_timeout_handler),
            start_view_handlers: handlers(log_events, start_view_handler),
            view_timeout_handlers: handlers(log_events, view_timeout_handler),
            collect_qc_handlers: handlers(log_events, collect_qc_handler),
            collect_tc_handlers: handlers(log_events, collect_tc_handler),
            fetch_block_handlers: handlers(log_events, fetch_block_handler),
            deliver_block_handlers: handlers(log_events, deliver_block_handler),
        }
    }

    /// Check whether no handler is registered for any event type. If so, the replica does not need to
    /// publish events at all.
    pub(crate) fn is_empty(&self) -> bool {
        self.insert_block_handlers.is_empty()
            && self.commit_block_handlers.is_empty()
            && self.prune_block_handlers.is_empty()
            && self.update_high_qc_handlers.is_empty()
            && self.update_locked_qc_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.vote_handlers.is_empty()
            && self.new_view_handlers.is_empty()
            && self.timeout_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_vote_handlers.is_empty()
            && self.receive_new_view_handlers.is_empty()
            && self.receive_timeout_handlers.is_empty()
            && self.start_view_handlers.is_empty()
            && self.view_timeout_handlers.is_empty()
            && self.collect_qc_handlers.is_empty()
            && self.collect_tc_handlers.is_empty()
            && self.fetch_block_handlers.is_empty()
            && self.deliver_block_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::InsertBlock(insert_block_event) => self
                .insert_block_handlers
                .iter()
                .for_each(|handler| handler(&insert_block_event)),

            Event::CommitBlock(commit_block_event) => self
                .commit_block_handlers
                .iter()
                .for_each(|handler| handler(&commit_block_event)),

            Event::PruneBlock(prune_block_event) => self
                .prune_block_handlers
                .iter()
                .for_each(|handler| handler(&prune_block_event)),

            Event::UpdateHighQC(update_high_qc_event) => self
                .update_high_qc_handlers
                .iter()
                .for_each(|handler| handler(&update_high_qc_event)),

            Event::UpdateLockedQC(update_locked_qc_event) => self
                .update_locked_qc_handlers
                .iter()
                .for_each(|handler| handler(&update_locked_qc_event)),

            Event::Propose(propose_event) => self
                .propose_handlers
                .iter()
                .for_each(|handler| handler(&propose_event)),

            Event::Vote(vote_event) => self
                .vote_handlers
                .iter()
                .for_each(|handler| handler(&vote_event)),

            Event::NewView(new_view_event) => self
                .new_view_handlers
                .iter()
                .for_each(|handler| handler(&new_view_event)),

            Event::Timeout(timeout_event) => self
                .timeout_handlers
                .iter()
                .for_each(|handler| handler(&timeout_event)),

            Event::ReceiveProposal(receive_proposal_event) => self
                .receive_proposal_handlers
                .iter()
                .for_each(|handler| handler(&receive_proposal_event)),

            Event::ReceiveVote(receive_vote_event) => self
                .receive_vote_handlers
                .iter()
                .for_each(|handler| handler(&receive_vote_event)),

            Event::ReceiveNewView(receive_new_view_event) => self
                .receive_new_view_handlers
                .iter()
                .for_each(|handler| handler(&receive_new_view_event)),

            Event::ReceiveTimeout(receive_timeout_event) => self
                .receive_timeout_handlers
                .iter()
                .for_each(|handler| handler(&receive_timeout_event)),

            Event::StartView(start_view_event) => self
                .start_view_handlers
                .iter()
                .for_each(|handler| handler(&start_view_event)),

            Event::ViewTimeout(view_timeout_event) => self
                .view_timeout_handlers
                .iter()
                .for_each(|handler| handler(&view_timeout_event)),

            Event::CollectQC(collect_qc_event) => self
                .collect_qc_handlers
                .iter()
                .for_each(|handler| handler(&collect_qc_event)),

            Event::CollectTC(collect_tc_event) => self
                .collect_tc_handlers
                .iter()
                .for_each(|handler| handler(&collect_tc_event)),

            Event::FetchBlock(fetch_block_event) => self
                .fetch_block_handlers
                .iter()
                .for_each(|handler| handler(&fetch_block_event)),

            Event::DeliverBlock(deliver_block_event) => self
                .deliver_block_handlers
                .iter()
                .for_each(|handler| handler(&deliver_block_event)),
        }
    }
}

/// Start the event bus thread. It runs until `shutdown_signal` fires, or until both the shutdown
/// sender and every event publisher are gone.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                log::warn!("event bus disconnected from the replica handle, shutting down");
                return;
            }
        }

        match event_subscriber.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            // The algorithm thread has exited. Wait for the shutdown signal.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(EVENT_POLL_INTERVAL),
        }
    })
}
