/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the chained HotStuff subprotocol.
//!
//! Main type: [`HotStuff`].

use std::{
    collections::HashMap,
    error::Error,
    fmt::{self, Display, Formatter},
    sync::mpsc::Sender,
    time::SystemTime,
};

use crate::{
    app::AppHandle,
    block_fetch::messages::{Deliver, Fetch},
    block_store::BlockStore,
    crypto::{CertificateError, Crypto},
    events::{
        CollectQCEvent, CommitBlockEvent, Event, FetchBlockEvent, InsertBlockEvent, NewViewEvent,
        ProposeEvent, PruneBlockEvent, StartViewEvent, UpdateHighQCEvent, UpdateLockedQCEvent,
        VoteEvent,
    },
    hotstuff::{
        invariants::{self, Ancestry},
        messages::{NewView, Proposal, Vote},
        types::{PendingProposals, VoteCollector},
    },
    networking::{network::Network, sending::SenderHandle},
    pacemaker::types::ViewInfo,
    types::{
        block::Block,
        certificates::{QuorumCert, SyncInfo, TimeoutCert},
        data_types::{Command, CryptoHash, ReplicaID, ViewNumber},
    },
};

/// A single participant in the chained HotStuff subprotocol.
///
/// # Usage
///
/// `HotStuff` is meant to be used in an "event-oriented" fashion. Its crate-public `on_receive_*`
/// methods are called when the corresponding message arrives, and [`enter_view`](Self::enter_view) is
/// called when the [`Pacemaker`](crate::pacemaker::implementation::Pacemaker) moves the replica into a
/// new view. Before calling `enter_view`, callers check [`is_view_outdated`](Self::is_view_outdated)
/// against the latest [`ViewInfo`].
///
/// `HotStuff` never advances the view by itself. Whenever it learns of a higher QC, it only records it
/// as its [`high_qc`](Self::high_qc), and it is up to the caller to forward that QC to the `Pacemaker`.
pub(crate) struct HotStuff<N: Network> {
    config: HotStuffConfiguration,
    view_info: ViewInfo,
    last_vote: ViewNumber,
    high_qc: QuorumCert,
    locked_qc: QuorumCert,
    leaf: CryptoHash,
    last_committed: CryptoHash,
    last_committed_view: ViewNumber,
    proposed: Option<CryptoHash>,
    deferred_high_qcs: HashMap<CryptoHash, QuorumCert>,
    deferred_commit: Option<CryptoHash>,
    vote_collector: VoteCollector,
    pending_proposals: PendingProposals,
    /// Blocks requested through [`Fetch`], and the view each was last requested in.
    fetching: HashMap<CryptoHash, ViewNumber>,
    sender_handle: SenderHandle<N>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> HotStuff<N> {
    /// Create a new HotStuff subprotocol participant whose chain consists only of the genesis block.
    pub(crate) fn new(
        config: HotStuffConfiguration,
        view_info: ViewInfo,
        sender_handle: SenderHandle<N>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let genesis = Block::genesis().hash;
        let vote_collector = VoteCollector::new(config.quorum_size);
        Self {
            config,
            view_info,
            last_vote: ViewNumber::init(),
            high_qc: QuorumCert::genesis(),
            locked_qc: QuorumCert::genesis(),
            leaf: genesis,
            last_committed: genesis,
            last_committed_view: ViewNumber::init(),
            proposed: None,
            deferred_high_qcs: HashMap::new(),
            deferred_commit: None,
            vote_collector,
            pending_proposals: PendingProposals::default(),
            fetching: HashMap::new(),
            sender_handle,
            event_publisher,
        }
    }

    /// Checks whether the HotStuff internal view is outdated with respect to the view from [`ViewInfo`]
    /// provided by the [`Pacemaker`](crate::pacemaker::implementation::Pacemaker).
    pub(crate) fn is_view_outdated(&self, new_view_info: &ViewInfo) -> bool {
        new_view_info.view != self.view_info.view
    }

    /// Enter the view described by `new_view_info`.
    ///
    /// `highest_tc` is the highest TC the Pacemaker has seen. Since a quorum gave up on its view, this
    /// replica must never vote in that view again.
    ///
    /// # Precondition
    ///
    /// [`is_view_outdated`](Self::is_view_outdated) returns true.
    pub(crate) fn enter_view<B: BlockStore, C: Crypto>(
        &mut self,
        new_view_info: ViewInfo,
        highest_tc: Option<&TimeoutCert>,
        block_store: &mut B,
        crypto: &C,
        app: &mut AppHandle,
    ) -> Result<(), HotStuffError> {
        // 1. Stop voting in every view up to the one the highest TC abandons.
        if let Some(tc) = highest_tc {
            self.increase_last_voted_view(tc.view);
        }

        // 2. Update the internal view info and forget proposals that can no longer be voted for, along
        //    with requests made more than a view ago. Whatever still needs those blocks asks again.
        self.view_info = new_view_info;
        self.pending_proposals.retain_from(self.view_info.view);
        let view = self.view_info.view;
        self.fetching.retain(|_, requested_in| *requested_in + 1 >= view);
        let fetching = &self.fetching;
        self.deferred_high_qcs
            .retain(|block, _| fetching.contains_key(block));

        Event::StartView(StartViewEvent {
            timestamp: SystemTime::now(),
            leader: self.view_info.leader,
            view: self.view_info.view,
        })
        .publish(&self.event_publisher);

        // 3. Propose if I am the leader of the new view. Otherwise, tell the leader about the highest
        //    certificates I know of.
        if self.view_info.leader == self.config.me {
            self.propose(block_store, crypto, app)
        } else {
            let new_view = NewView {
                view: self.view_info.view,
                sync_info: SyncInfo {
                    qc: Some(self.high_qc.clone()),
                    tc: highest_tc.cloned(),
                },
            };
            self.sender_handle
                .send(self.view_info.leader, new_view.clone());

            Event::NewView(NewViewEvent {
                timestamp: SystemTime::now(),
                leader: self.view_info.leader,
                new_view,
            })
            .publish(&self.event_publisher);

            Ok(())
        }
    }

    /// Propose a new block for the current view, extending the highest certified block.
    ///
    /// Unless the leaf is the block certified by the highest QC or a chain of this replica's own
    /// [dummy blocks](Self::create_dummy) on top of it, the leaf is first reset to that block. Views
    /// between the leaf and the current view are then filled with dummy blocks, so that the proposal's
    /// parent is always in the view right before it.
    fn propose<B: BlockStore, C: Crypto>(
        &mut self,
        block_store: &mut B,
        crypto: &C,
        app: &mut AppHandle,
    ) -> Result<(), HotStuffError> {
        let view = self.view_info.view;

        // 1. Pick the block to extend.
        if !invariants::extends_with_gap_fillers(&self.leaf, &self.high_qc, block_store) {
            self.leaf = self.high_qc.block;
        }
        let leaf = block_store
            .get(&self.leaf)
            .ok_or(HotStuffError::BlockExpectedButNotFound { block: self.leaf })?;
        if leaf.view >= view {
            return Ok(());
        }

        // 2. Fill the gap between the leaf and the current view.
        let mut leaf_view = leaf.view;
        while leaf_view + 1 < view {
            leaf_view = self.create_dummy(block_store)?.view;
        }

        // 3. Build the proposal and broadcast it.
        let command = app.get_command().unwrap_or_else(Command::empty);
        let block = Block::new(
            self.leaf,
            command,
            view,
            self.high_qc.clone(),
            self.config.me,
        );
        self.insert(&block, block_store);
        self.leaf = block.hash;
        self.proposed = Some(block.hash);
        self.vote_collector.clear();

        let proposal = Proposal { block };
        self.sender_handle.broadcast(proposal.clone());

        Event::Propose(ProposeEvent {
            timestamp: SystemTime::now(),
            proposal: proposal.clone(),
        })
        .publish(&self.event_publisher);

        // 4. Process the proposal locally, like every other replica does.
        self.on_receive_proposal(proposal, self.config.me, block_store, crypto, app)
    }

    /// Extend the leaf with an empty block in the view right after it, justified by the highest QC.
    ///
    /// Other replicas fetch the dummy block when the proposal built on it reaches them.
    pub(crate) fn create_dummy<B: BlockStore>(
        &mut self,
        block_store: &mut B,
    ) -> Result<Block, HotStuffError> {
        let leaf = block_store
            .get(&self.leaf)
            .ok_or(HotStuffError::BlockExpectedButNotFound { block: self.leaf })?;

        let dummy = Block::new(
            leaf.hash,
            Command::empty(),
            leaf.view + 1,
            self.high_qc.clone(),
            self.config.me,
        );
        self.insert(&dummy, block_store);
        self.leaf = dummy.hash;

        Ok(dummy)
    }

    /// Process a proposal, voting for it if it is safe.
    ///
    /// ## Internal procedure
    ///
    /// 1. Ignore the proposal if it is for a past view or a view this replica already voted in.
    /// 2. Check that the block is well-formed and that its QC is valid.
    /// 3. Check that the block extends the block its QC certifies. If some block in between is missing,
    ///    park the proposal and request the missing block.
    /// 4. Check that the block was proposed by the leader of the current view, in the current view.
    /// 5. Check the locking rule, and ask the application whether it accepts the block's command.
    /// 6. Insert the block and update the highest QC, the locked QC, the last voted view, and the leaf.
    /// 7. Vote for the block by sending a partial certificate to its proposer.
    /// 8. Apply the commit rule.
    pub(crate) fn on_receive_proposal<B: BlockStore, C: Crypto>(
        &mut self,
        proposal: Proposal,
        origin: ReplicaID,
        block_store: &mut B,
        crypto: &C,
        app: &mut AppHandle,
    ) -> Result<(), HotStuffError> {
        let block = proposal.block;

        // 1. Drop proposals that are too old.
        if block.view < self.view_info.view || block.view <= self.last_vote {
            return Ok(());
        }

        // 2. Check that the block is well-formed and carries a valid QC.
        if origin != block.proposer
            || !block.is_correct()
            || !crypto.verify_quorum_cert(&block.justify)
        {
            log::debug!("dropping malformed proposal {} from {}", block.hash, origin);
            return Ok(());
        }

        // 3. Check that the chain down to the certified block is available and well-formed.
        match invariants::ancestry(&block, block_store) {
            Ancestry::Extends => (),
            Ancestry::Missing(missing) => {
                if self.pending_proposals.park(missing, origin, block) {
                    self.fetch(missing);
                }
                return Ok(());
            }
            Ancestry::Broken => {
                log::debug!("dropping proposal {} that does not extend its QC", block.hash);
                return Ok(());
            }
        }

        // 4. Only the leader of the current view may propose, and only in the current view.
        if block.view != self.view_info.view || block.proposer != self.view_info.leader {
            log::debug!(
                "dropping proposal {} for view {} from {}: not the current leader",
                block.hash,
                block.view,
                origin
            );
            return Ok(());
        }

        // 5. Check that the block is safe to vote for, and that the application accepts it.
        if !invariants::safe_to_vote(&block, &self.locked_qc, block_store) {
            log::debug!("not voting for {}: it conflicts with the locked QC", block.hash);
            return Ok(());
        }
        if !block.command.is_empty() && !app.accept(&block.command) {
            log::debug!("not voting for {}: command rejected", block.hash);
            return Ok(());
        }

        // 6. Insert the block and update the safety state.
        self.insert(&block, block_store);
        self.update_high_qc(&block.justify, block_store);
        self.update_locked_qc(&block.justify, block_store);
        self.last_vote = block.view;
        self.leaf = block.hash;

        // 7. Vote.
        let vote = Vote {
            cert: crypto.create_partial_cert(&block),
        };

        Event::Vote(VoteEvent {
            timestamp: SystemTime::now(),
            proposer: block.proposer,
            vote: vote.clone(),
        })
        .publish(&self.event_publisher);

        if block.proposer == self.config.me {
            self.on_receive_vote(vote, self.config.me, block_store, crypto, app)?;
        } else {
            self.sender_handle.send(block.proposer, vote);
        }

        // 8. Commit, if the block completes a three-chain.
        self.try_commit(&block, block_store, app)
    }

    /// Collect a vote for the block this replica proposed most recently. Once a quorum of votes has
    /// been collected, combine them into a QC and adopt it as the highest QC.
    pub(crate) fn on_receive_vote<B: BlockStore, C: Crypto>(
        &mut self,
        vote: Vote,
        origin: ReplicaID,
        block_store: &mut B,
        crypto: &C,
        app: &mut AppHandle,
    ) -> Result<(), HotStuffError> {
        let block_hash = vote.cert.block;

        // 1. Only collect correct votes, cast by their sender, for my latest proposal.
        if self.proposed != Some(block_hash)
            || vote.cert.signer() != origin
            || !crypto.verify_partial_cert(&vote.cert)
        {
            return Ok(());
        }

        // 2. If this vote completes a quorum, form a QC.
        if let Some(certs) = self.vote_collector.collect(vote.cert) {
            // A later commit may have pruned the block, making its QC useless.
            let block = match block_store.get(&block_hash) {
                Some(block) => block,
                None => return Ok(()),
            };
            let qc = crypto.create_quorum_cert(&block, &certs)?;

            Event::CollectQC(CollectQCEvent {
                timestamp: SystemTime::now(),
                quorum_cert: qc.clone(),
            })
            .publish(&self.event_publisher);

            // 3. Adopt the new QC and apply the commit rule to the block it certifies.
            self.update_high_qc(&qc, block_store);
            self.try_commit(&block, block_store, app)?;
        }

        Ok(())
    }

    /// Adopt the QC carried by a [`NewView`] message if it is higher than the highest QC.
    ///
    /// The TC the message may carry is the Pacemaker's business.
    pub(crate) fn on_receive_new_view<B: BlockStore, C: Crypto>(
        &mut self,
        new_view: &NewView,
        block_store: &mut B,
        crypto: &C,
    ) {
        self.on_receive_sync_info(&new_view.sync_info, block_store, crypto)
    }

    /// Adopt the QC in `sync_info`, if any, if it is valid and higher than the highest QC.
    pub(crate) fn on_receive_sync_info<B: BlockStore, C: Crypto>(
        &mut self,
        sync_info: &SyncInfo,
        block_store: &mut B,
        crypto: &C,
    ) {
        if let Some(qc) = &sync_info.qc {
            if *qc != self.high_qc && crypto.verify_quorum_cert(qc) {
                self.update_high_qc(qc, block_store);
            }
        }
    }

    /// Insert a block received in answer to one of this replica's [`Fetch`] requests. Blocks that were
    /// not requested, or whose request has been dropped, are ignored.
    ///
    /// Returns the proposals that were waiting for this block. These should be processed again from the
    /// start, as if they had just been received.
    pub(crate) fn on_receive_deliver<B: BlockStore, C: Crypto>(
        &mut self,
        deliver: Deliver,
        block_store: &mut B,
        crypto: &C,
        app: &mut AppHandle,
    ) -> Result<Vec<(ReplicaID, Proposal)>, HotStuffError> {
        let block = deliver.block;

        // 1. Only insert requested, well-formed blocks that are not already committed or pruned.
        if !self.fetching.contains_key(&block.hash) {
            log::debug!("ignoring unrequested block {}", block.hash);
            return Ok(Vec::new());
        }
        if block.is_genesis() || !block.is_correct() || !crypto.verify_quorum_cert(&block.justify) {
            return Ok(Vec::new());
        }
        let hash = block.hash;
        self.fetching.remove(&hash);
        if block.view <= self.last_committed_view {
            self.deferred_high_qcs.remove(&hash);
            return Ok(Vec::new());
        }
        self.insert(&block, block_store);

        // 2. Retry whatever was waiting for this block.
        if let Some(qc) = self.deferred_high_qcs.remove(&hash) {
            self.update_high_qc(&qc, block_store);
        }
        if let Some(deferred) = self.deferred_commit {
            if let Some(deferred) = block_store.get(&deferred) {
                self.commit(&deferred, block_store, app)?;
            }
        }

        Ok(self
            .pending_proposals
            .take(&hash)
            .into_iter()
            .map(|(origin, block)| (origin, Proposal { block }))
            .collect())
    }

    /// Make sure this replica never votes in a view up to and including `view`.
    pub(crate) fn increase_last_voted_view(&mut self, view: ViewNumber) {
        if view > self.last_vote {
            self.last_vote = view
        }
    }

    /// Replace the highest QC with `qc` if `qc` certifies a block with a higher view. Returns whether
    /// the highest QC changed.
    ///
    /// If the block certified by `qc` is not stored, it is requested and the update is retried once the
    /// block arrives. QCs waiting for different blocks do not displace each other.
    ///
    /// # Precondition
    ///
    /// `qc` is valid.
    fn update_high_qc<B: BlockStore>(&mut self, qc: &QuorumCert, block_store: &B) -> bool {
        let new_view = match invariants::qc_view(qc, block_store) {
            Some(view) => view,
            // The genesis block is only missing once it has been pruned.
            None if qc.is_genesis() => return false,
            None => {
                self.deferred_high_qcs.insert(qc.block, qc.clone());
                self.fetch(qc.block);
                return false;
            }
        };
        let current_view =
            invariants::qc_view(&self.high_qc, block_store).unwrap_or(ViewNumber::init());

        if new_view > current_view {
            self.high_qc = qc.clone();

            Event::UpdateHighQC(UpdateHighQCEvent {
                timestamp: SystemTime::now(),
                high_qc: qc.clone(),
                view: new_view,
            })
            .publish(&self.event_publisher);

            true
        } else {
            false
        }
    }

    /// Replace the locked QC with `qc` if `qc` certifies a block with a higher view.
    fn update_locked_qc<B: BlockStore>(&mut self, qc: &QuorumCert, block_store: &B) {
        let new_view = match invariants::qc_view(qc, block_store) {
            Some(view) => view,
            None => return,
        };
        let current_view =
            invariants::qc_view(&self.locked_qc, block_store).unwrap_or(ViewNumber::init());

        if new_view > current_view {
            self.locked_qc = qc.clone();

            Event::UpdateLockedQC(UpdateLockedQCEvent {
                timestamp: SystemTime::now(),
                locked_qc: qc.clone(),
                view: new_view,
            })
            .publish(&self.event_publisher);
        }
    }

    /// Apply the three-chain commit rule to `block`, committing the block it identifies if any.
    fn try_commit<B: BlockStore>(
        &mut self,
        block: &Block,
        block_store: &mut B,
        app: &mut AppHandle,
    ) -> Result<(), HotStuffError> {
        match invariants::block_to_commit(block, block_store) {
            Some(committable) => self.commit(&committable, block_store, app),
            None => Ok(()),
        }
    }

    /// Commit `block` and all of its uncommitted ancestors, in ascending order of view, then prune the
    /// block store.
    ///
    /// If an ancestor is missing, it is requested and the commit is retried once it arrives.
    fn commit<B: BlockStore>(
        &mut self,
        block: &Block,
        block_store: &mut B,
        app: &mut AppHandle,
    ) -> Result<(), HotStuffError> {
        if block.view <= self.last_committed_view {
            return Ok(());
        }

        // 1. Collect the uncommitted blocks from `block` down to the last committed block.
        let mut uncommitted = Vec::new();
        let mut cursor = block.clone();
        while cursor.hash != self.last_committed {
            if cursor.view <= self.last_committed_view {
                return Err(HotStuffError::ConflictingCommit {
                    committed: self.last_committed,
                    conflicting: block.hash,
                });
            }
            let parent = cursor.parent;
            uncommitted.push(cursor);
            cursor = match block_store.get(&parent) {
                Some(parent) => parent,
                None => {
                    self.deferred_commit = Some(block.hash);
                    self.fetch(parent);
                    return Ok(());
                }
            };
        }

        // 2. Execute their commands, oldest first.
        for committed in uncommitted.into_iter().rev() {
            if !committed.command.is_empty() {
                app.exec(committed.command.clone());
            }

            Event::CommitBlock(CommitBlockEvent {
                timestamp: SystemTime::now(),
                block: committed.hash,
                view: committed.view,
            })
            .publish(&self.event_publisher);
        }
        self.last_committed = block.hash;
        self.last_committed_view = block.view;
        self.deferred_commit = None;

        // 3. Prune.
        for pruned in block_store.prune(block) {
            Event::PruneBlock(PruneBlockEvent {
                timestamp: SystemTime::now(),
                block: pruned,
            })
            .publish(&self.event_publisher);
        }

        Ok(())
    }

    fn insert<B: BlockStore>(&self, block: &Block, block_store: &mut B) {
        if !block_store.contains(&block.hash) {
            block_store.store(block.clone());

            Event::InsertBlock(InsertBlockEvent {
                timestamp: SystemTime::now(),
                block: block.clone(),
            })
            .publish(&self.event_publisher);
        }
    }

    /// Request `block` from every other replica, unless it was already requested in the current view.
    fn fetch(&mut self, block: CryptoHash) {
        let view = self.view_info.view;
        if self.fetching.insert(block, view) == Some(view) {
            return;
        }
        self.sender_handle.broadcast(Fetch { hash: block });

        Event::FetchBlock(FetchBlockEvent {
            timestamp: SystemTime::now(),
            block,
        })
        .publish(&self.event_publisher);
    }

    pub(crate) fn view(&self) -> ViewNumber {
        self.view_info.view
    }

    pub(crate) fn last_vote(&self) -> ViewNumber {
        self.last_vote
    }

    pub(crate) fn high_qc(&self) -> &QuorumCert {
        &self.high_qc
    }

    pub(crate) fn locked_qc(&self) -> &QuorumCert {
        &self.locked_qc
    }

    pub(crate) fn leaf(&self) -> CryptoHash {
        self.leaf
    }

    pub(crate) fn last_committed(&self) -> (CryptoHash, ViewNumber) {
        (self.last_committed, self.last_committed_view)
    }
}

/// Immutable parameters that determine the behaviour of the [`HotStuff`] struct.
#[derive(Clone)]
pub(crate) struct HotStuffConfiguration {
    pub(crate) me: ReplicaID,
    pub(crate) quorum_size: usize,
}

/// Error when processing a message or entering a view. Both indicate that the replica's state is
/// inconsistent with what the protocol guarantees.
#[derive(Debug)]
pub enum HotStuffError {
    /// A block that the replica inserted itself is no longer in the block store.
    BlockExpectedButNotFound { block: CryptoHash },
    /// A quorum of valid votes could not be combined into a QC.
    CertificateError(CertificateError),
    /// A block to commit does not extend the last committed block.
    ConflictingCommit {
        committed: CryptoHash,
        conflicting: CryptoHash,
    },
}

impl From<CertificateError> for HotStuffError {
    fn from(value: CertificateError) -> Self {
        HotStuffError::CertificateError(value)
    }
}

impl Display for HotStuffError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HotStuffError::BlockExpectedButNotFound { block } => {
                write!(f, "block {} expected in the block store but not found", block)
            }
            HotStuffError::CertificateError(err) => write!(f, "could not form a QC: {}", err),
            HotStuffError::ConflictingCommit {
                committed,
                conflicting,
            } => write!(
                f,
                "block {} does not extend the last committed block {}",
                conflicting, committed
            ),
        }
    }
}

impl Error for HotStuffError {}
