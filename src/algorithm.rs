/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The single actor that owns a replica's consensus state and drives it with incoming events.
//!
//! [`Algorithm`] bundles the [`HotStuff`] consensus engine, the [`Pacemaker`], the serving side of block
//! fetching, the block store, the crypto provider and the application. Each kind of input has its own
//! `handle_*` method, and [`handle_message`](Algorithm::handle_message) dispatches a network message to
//! the right one. The algorithm thread started by [`ReplicaSpec::start`](crate::replica::ReplicaSpec::start)
//! is a loop of:
//! 1. Checking for the shutdown signal.
//! 2. Polling the network for a message, and handling it if there is one.
//! 3. Ticking the Pacemaker with the current time.
//!
//! ## Keeping the subprotocols in sync
//!
//! The engine never changes views by itself and the Pacemaker never touches the chain. After every
//! event the algorithm:
//! 1. Forwards the engine's highest QC to the Pacemaker, which advances its view if the QC justifies a
//!    higher one.
//! 2. If the Pacemaker's view is now ahead of the engine's, enters that view in the engine, passing in
//!    the highest TC so that the engine never votes in an abandoned view.
//!
//! Step 2 happens at most once per step, so a replica that certifies its own proposal moves on to the
//! next view on the next event instead of spinning through views within one call.
//!
//! A received proposal is treated specially: the QC it carries is forwarded to the Pacemaker before
//! the proposal is checked, so that a replica that fell behind can join the proposal's view and vote
//! in it.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Instant, SystemTime};

use crate::{
    app::AppHandle,
    block_fetch::{
        messages::{BlockFetchMessage, Deliver, Fetch},
        server::BlockFetchServer,
    },
    block_store::BlockStore,
    crypto::Crypto,
    events::{
        DeliverBlockEvent, Event, ReceiveNewViewEvent, ReceiveProposalEvent, ReceiveTimeoutEvent,
        ReceiveVoteEvent,
    },
    hotstuff::{
        implementation::{HotStuff, HotStuffConfiguration, HotStuffError},
        messages::{HotStuffMessage, NewView, Proposal, Vote},
    },
    leader_rotation::LeaderRotation,
    networking::{messages::Message, network::Network, sending::SenderHandle},
    pacemaker::{
        implementation::{Pacemaker, PacemakerConfiguration, PacemakerError},
        messages::PacemakerMessage,
        types::ViewInfo,
    },
    types::{
        block::Block,
        certificates::{QuorumCert, SyncInfo, TimeoutCert, TimeoutMsg},
        data_types::{CryptoHash, ReplicaID, ViewNumber},
    },
};

/// A replica's consensus state, and the procedures that update it in response to events.
///
/// Create one with [`ReplicaSpec::algorithm`](crate::replica::ReplicaSpec::algorithm) to drive it by
/// hand (e.g., in a simulation), or let [`ReplicaSpec::start`](crate::replica::ReplicaSpec::start) run
/// it on its own thread.
///
/// Every `handle_*` method is a no-op after [`stop`](Self::stop) has been called.
pub struct Algorithm<N: Network + 'static, B: BlockStore, C: Crypto + 'static> {
    me: ReplicaID,
    network: N,
    hotstuff: HotStuff<N>,
    pacemaker: Pacemaker<N>,
    block_fetch_server: BlockFetchServer<N>,
    block_store: B,
    crypto: C,
    app: AppHandle,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network + 'static, B: BlockStore, C: Crypto + 'static> Algorithm<N, B, C> {
    /// Create an `Algorithm` whose engine sits in view 0 and whose Pacemaker starts view 1 at `now`. The
    /// first call to [`handle_tick`](Self::handle_tick) makes the engine enter view 1.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        hotstuff_config: HotStuffConfiguration,
        pacemaker_config: PacemakerConfiguration,
        network: N,
        mut block_store: B,
        crypto: C,
        leader_rotation: Box<dyn LeaderRotation>,
        app: AppHandle,
        now: Instant,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let genesis = Block::genesis();
        if !block_store.contains(&genesis.hash) {
            block_store.store(genesis);
        }

        let me = hotstuff_config.me;
        let init_view_info = ViewInfo::new(
            ViewNumber::init(),
            leader_rotation.leader(ViewNumber::init()),
            now,
        );
        let hotstuff = HotStuff::new(
            hotstuff_config,
            init_view_info,
            SenderHandle::new(network.clone()),
            event_publisher.clone(),
        );
        let pacemaker = Pacemaker::new(
            pacemaker_config,
            leader_rotation,
            ViewNumber::init() + 1,
            now,
            SenderHandle::new(network.clone()),
            event_publisher.clone(),
        );
        let block_fetch_server = BlockFetchServer::new(SenderHandle::new(network.clone()));

        Self {
            me,
            network,
            hotstuff,
            pacemaker,
            block_fetch_server,
            block_store,
            crypto,
            app,
            event_publisher,
        }
    }

    /// Start the algorithm thread. It runs until `shutdown_signal` fires or its sender is dropped.
    pub(crate) fn start(mut self, shutdown_signal: Receiver<()>) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    log::warn!("algorithm thread disconnected from the replica handle, shutting down");
                    return;
                }
            }

            if let Some((origin, message)) = self.network.recv() {
                if let Err(err) = self.handle_message(origin, message, Instant::now()) {
                    log::error!("replica {} failed to handle a message: {}", self.me, err);
                }
            }

            if let Err(err) = self.handle_tick(Instant::now()) {
                log::error!("replica {} failed to tick: {}", self.me, err);
            }

            thread::yield_now();
        })
    }

    /// Handle a message received from `origin` by passing it to the `handle_*` method for its type.
    pub fn handle_message(
        &mut self,
        origin: ReplicaID,
        message: Message,
        now: Instant,
    ) -> Result<(), AlgorithmError> {
        match message {
            Message::HotStuffMessage(HotStuffMessage::Proposal(proposal)) => {
                self.handle_proposal(origin, proposal, now)
            }
            Message::HotStuffMessage(HotStuffMessage::Vote(vote)) => {
                self.handle_vote(origin, vote, now)
            }
            Message::HotStuffMessage(HotStuffMessage::NewView(new_view)) => {
                self.handle_new_view(origin, new_view, now)
            }
            Message::PacemakerMessage(PacemakerMessage::Timeout(timeout)) => {
                self.handle_timeout(origin, timeout, now)
            }
            Message::BlockFetchMessage(BlockFetchMessage::Fetch(fetch)) => {
                self.handle_fetch(origin, fetch);
                Ok(())
            }
            Message::BlockFetchMessage(BlockFetchMessage::Deliver(deliver)) => {
                self.handle_deliver(origin, deliver, now)
            }
        }
    }

    pub fn handle_proposal(
        &mut self,
        origin: ReplicaID,
        proposal: Proposal,
        now: Instant,
    ) -> Result<(), AlgorithmError> {
        if self.pacemaker.is_stopped() {
            return Ok(());
        }

        Event::ReceiveProposal(ReceiveProposalEvent {
            timestamp: SystemTime::now(),
            origin,
            proposal: proposal.clone(),
        })
        .publish(&self.event_publisher);

        self.process_proposal(origin, proposal, now)?;
        self.sync_views(now)
    }

    pub fn handle_vote(
        &mut self,
        origin: ReplicaID,
        vote: Vote,
        now: Instant,
    ) -> Result<(), AlgorithmError> {
        if self.pacemaker.is_stopped() {
            return Ok(());
        }

        Event::ReceiveVote(ReceiveVoteEvent {
            timestamp: SystemTime::now(),
            origin,
            vote: vote.clone(),
        })
        .publish(&self.event_publisher);

        self.hotstuff.on_receive_vote(
            vote,
            origin,
            &mut self.block_store,
            &self.crypto,
            &mut self.app,
        )?;
        self.sync_views(now)
    }

    /// Handle a [`NewView`]: the engine adopts its QC, and the Pacemaker advances through its QC or TC.
    pub fn handle_new_view(
        &mut self,
        origin: ReplicaID,
        new_view: NewView,
        now: Instant,
    ) -> Result<(), AlgorithmError> {
        if self.pacemaker.is_stopped() {
            return Ok(());
        }

        Event::ReceiveNewView(ReceiveNewViewEvent {
            timestamp: SystemTime::now(),
            origin,
            new_view: new_view.clone(),
        })
        .publish(&self.event_publisher);

        self.hotstuff
            .on_receive_new_view(&new_view, &mut self.block_store, &self.crypto);
        self.pacemaker
            .advance_view(&new_view.sync_info, &self.block_store, &self.crypto, now)?;
        self.sync_views(now)
    }

    /// Handle a [`TimeoutMsg`]: the engine adopts the sender's highest QC, and the Pacemaker counts the
    /// timeout towards a TC.
    pub fn handle_timeout(
        &mut self,
        origin: ReplicaID,
        timeout: TimeoutMsg,
        now: Instant,
    ) -> Result<(), AlgorithmError> {
        if self.pacemaker.is_stopped() {
            return Ok(());
        }

        Event::ReceiveTimeout(ReceiveTimeoutEvent {
            timestamp: SystemTime::now(),
            origin,
            timeout: timeout.clone(),
        })
        .publish(&self.event_publisher);

        self.hotstuff.on_receive_sync_info(
            &SyncInfo::with_qc(timeout.high_qc.clone()),
            &mut self.block_store,
            &self.crypto,
        );
        self.pacemaker
            .on_receive_timeout(timeout, &self.crypto, now)?;
        self.sync_views(now)
    }

    /// Serve a [`Fetch`] request from the local block store.
    pub fn handle_fetch(&mut self, origin: ReplicaID, fetch: Fetch) {
        if self.pacemaker.is_stopped() {
            return;
        }
        self.block_fetch_server
            .on_receive_fetch(fetch, origin, &self.block_store);
    }

    /// Handle a [`Deliver`]: insert the block, then process the proposals that were waiting for it as
    /// if they had just been received.
    pub fn handle_deliver(
        &mut self,
        origin: ReplicaID,
        deliver: Deliver,
        now: Instant,
    ) -> Result<(), AlgorithmError> {
        if self.pacemaker.is_stopped() {
            return Ok(());
        }

        Event::DeliverBlock(DeliverBlockEvent {
            timestamp: SystemTime::now(),
            origin,
            block: deliver.block.hash,
        })
        .publish(&self.event_publisher);

        let unparked = self.hotstuff.on_receive_deliver(
            deliver,
            &mut self.block_store,
            &self.crypto,
            &mut self.app,
        )?;
        for (proposer, proposal) in unparked {
            self.process_proposal(proposer, proposal, now)?;
        }
        self.sync_views(now)
    }

    /// Let the Pacemaker check the current view's deadline against `now`, then bring the engine into
    /// the Pacemaker's view if it has fallen behind.
    pub fn handle_tick(&mut self, now: Instant) -> Result<(), AlgorithmError> {
        if self.pacemaker.is_stopped() {
            return Ok(());
        }

        self.pacemaker
            .tick(now, self.hotstuff.high_qc(), &self.crypto)?;
        self.sync_views(now)
    }

    /// Stop the replica. Afterwards every `handle_*` method is a no-op.
    pub fn stop(&mut self) {
        self.pacemaker.stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.pacemaker.is_stopped()
    }

    /// Join the view justified by the proposal's QC, then let the engine check and vote for the
    /// proposal.
    fn process_proposal(
        &mut self,
        origin: ReplicaID,
        proposal: Proposal,
        now: Instant,
    ) -> Result<(), AlgorithmError> {
        self.pacemaker.advance_view(
            &SyncInfo::with_qc(proposal.block.justify.clone()),
            &self.block_store,
            &self.crypto,
            now,
        )?;
        self.enter_view_if_outdated()?;

        self.hotstuff.on_receive_proposal(
            proposal,
            origin,
            &mut self.block_store,
            &self.crypto,
            &mut self.app,
        )?;
        Ok(())
    }

    /// Forward the engine's highest QC to the Pacemaker, then enter the Pacemaker's view in the engine
    /// if it has moved.
    fn sync_views(&mut self, now: Instant) -> Result<(), AlgorithmError> {
        let high_qc = SyncInfo::with_qc(self.hotstuff.high_qc().clone());
        self.pacemaker
            .advance_view(&high_qc, &self.block_store, &self.crypto, now)?;
        self.enter_view_if_outdated()
    }

    fn enter_view_if_outdated(&mut self) -> Result<(), AlgorithmError> {
        let view_info = self.pacemaker.query().clone();
        if self.hotstuff.is_view_outdated(&view_info) {
            self.hotstuff.enter_view(
                view_info,
                self.pacemaker.highest_tc(),
                &mut self.block_store,
                &self.crypto,
                &mut self.app,
            )?;
        }
        Ok(())
    }

    pub fn me(&self) -> ReplicaID {
        self.me
    }

    /// Get the view the consensus engine is currently acting in.
    pub fn view(&self) -> ViewNumber {
        self.hotstuff.view()
    }

    /// Get the Pacemaker's current view, its leader, and its deadline. The view may be ahead of
    /// [`view`](Self::view) until the next event is handled.
    pub fn view_info(&self) -> &ViewInfo {
        self.pacemaker.query()
    }

    pub fn last_vote(&self) -> ViewNumber {
        self.hotstuff.last_vote()
    }

    pub fn high_qc(&self) -> &QuorumCert {
        self.hotstuff.high_qc()
    }

    pub fn locked_qc(&self) -> &QuorumCert {
        self.hotstuff.locked_qc()
    }

    /// Get the hash of the block the next proposal of this replica would extend.
    pub fn leaf(&self) -> CryptoHash {
        self.hotstuff.leaf()
    }

    /// Get the hash and the view of the last committed block.
    pub fn last_committed(&self) -> (CryptoHash, ViewNumber) {
        self.hotstuff.last_committed()
    }

    pub fn highest_tc(&self) -> Option<&TimeoutCert> {
        self.pacemaker.highest_tc()
    }

    pub fn block_store(&self) -> &B {
        &self.block_store
    }
}

/// Error returned by the `handle_*` methods of [`Algorithm`]. Either indicates a bug or a corrupted
/// block store, not a misbehaving peer: invalid input from peers is dropped, not reported.
#[derive(Debug)]
pub enum AlgorithmError {
    HotStuffError(HotStuffError),
    PacemakerError(PacemakerError),
}

impl From<HotStuffError> for AlgorithmError {
    fn from(value: HotStuffError) -> Self {
        AlgorithmError::HotStuffError(value)
    }
}

impl From<PacemakerError> for AlgorithmError {
    fn from(value: PacemakerError) -> Self {
        AlgorithmError::PacemakerError(value)
    }
}

impl Display for AlgorithmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmError::HotStuffError(err) => write!(f, "hotstuff: {}", err),
            AlgorithmError::PacemakerError(err) => write!(f, "pacemaker: {}", err),
        }
    }
}

impl Error for AlgorithmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AlgorithmError::HotStuffError(err) => Some(err),
            AlgorithmError::PacemakerError(err) => Some(err),
        }
    }
}
