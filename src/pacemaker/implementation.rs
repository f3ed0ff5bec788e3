/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the Pacemaker subprotocol.
//!
//! Main type: [`Pacemaker`].

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    sync::mpsc::Sender,
    time::{Instant, SystemTime},
};

use crate::{
    block_store::BlockStore,
    crypto::{CertificateError, Crypto},
    events::{CollectTCEvent, Event, TimeoutEvent, ViewTimeoutEvent},
    hotstuff::invariants,
    leader_rotation::LeaderRotation,
    networking::{network::Network, sending::SenderHandle},
    pacemaker::types::{TimeoutCollector, ViewInfo, ViewTimeouts},
    types::{
        certificates::{QuorumCert, SyncInfo, TimeoutCert, TimeoutMsg},
        data_types::{ReplicaID, ViewNumber},
    },
};

/// A single participant in the Pacemaker subprotocol.
///
/// # Usage
///
/// After creating an instance of `Pacemaker` using [`new`](Self::new), the caller should interact with
/// it by calling four methods:
/// 1. [`on_receive_timeout`](Self::on_receive_timeout): whenever a [`TimeoutMsg`] is received.
/// 2. [`advance_view`](Self::advance_view): whenever the replica learns of a QC or TC, in a message or
///    by forming it.
/// 3. [`tick`](Self::tick): *as often as is practical*.
/// 4. [`query`](Self::query): whenever one of the above is called, the internal view counter of the
///    `Pacemaker` may be updated. The caller should call `query` whenever it needs to see this counter.
pub(crate) struct Pacemaker<N: Network> {
    config: PacemakerConfiguration,
    leader_rotation: Box<dyn LeaderRotation>,
    view_info: ViewInfo,
    timeout_collector: TimeoutCollector,
    highest_tc: Option<TimeoutCert>,
    consecutive_timeouts: u32,
    stopped: bool,
    sender: SenderHandle<N>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> Pacemaker<N> {
    /// Create a new `Pacemaker` in `init_view`, whose timer starts at `now`.
    pub(crate) fn new(
        config: PacemakerConfiguration,
        leader_rotation: Box<dyn LeaderRotation>,
        init_view: ViewNumber,
        now: Instant,
        sender: SenderHandle<N>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let view_info = ViewInfo::new(
            init_view,
            leader_rotation.leader(init_view),
            now + config.view_timeouts.timeout(0),
        );
        let timeout_collector = TimeoutCollector::new(config.quorum_size);
        Self {
            config,
            leader_rotation,
            view_info,
            timeout_collector,
            highest_tc: None,
            consecutive_timeouts: 0,
            stopped: false,
            sender,
            event_publisher,
        }
    }

    /// Query the Pacemaker for its current `ViewInfo`.
    pub(crate) fn query(&self) -> &ViewInfo {
        &self.view_info
    }

    /// Get the highest TC this Pacemaker has collected or received.
    pub(crate) fn highest_tc(&self) -> Option<&TimeoutCert> {
        self.highest_tc.as_ref()
    }

    /// Compare `now` against the deadline of the current view.
    ///
    /// If the view has timed out, broadcast a [`TimeoutMsg`] carrying `high_qc`, process it locally,
    /// and give the current view another, longer timeout. The replica stays in the view until a TC or
    /// QC lets it leave.
    pub(crate) fn tick<C: Crypto>(
        &mut self,
        now: Instant,
        high_qc: &QuorumCert,
        crypto: &C,
    ) -> Result<(), PacemakerError> {
        if self.stopped || now < self.view_info.deadline {
            return Ok(());
        }
        let cur_view = self.view_info.view;

        Event::ViewTimeout(ViewTimeoutEvent {
            timestamp: SystemTime::now(),
            view: cur_view,
            timeout: self.config.view_timeouts.timeout(self.consecutive_timeouts),
        })
        .publish(&self.event_publisher);

        // 1. Re-arm the timer with backoff.
        self.consecutive_timeouts = self.consecutive_timeouts.saturating_add(1);
        self.view_info.deadline = now + self.config.view_timeouts.timeout(self.consecutive_timeouts);

        // 2. Tell everyone that I gave up on the current view.
        let timeout = TimeoutMsg {
            sender: self.config.me,
            view: cur_view,
            signature: crypto.sign(&cur_view.to_hash()),
            high_qc: high_qc.clone(),
        };
        self.sender.broadcast(timeout.clone());

        Event::Timeout(TimeoutEvent {
            timestamp: SystemTime::now(),
            timeout: timeout.clone(),
        })
        .publish(&self.event_publisher);

        // 3. Count my own timeout towards a TC.
        self.on_receive_timeout(timeout, crypto, now)
    }

    /// Collect a timeout message. If it completes a quorum for its view, form a TC and advance to the
    /// view after it.
    ///
    /// Timeouts for views lower than the current view, and timeouts with invalid signatures, are
    /// ignored.
    pub(crate) fn on_receive_timeout<C: Crypto>(
        &mut self,
        timeout: TimeoutMsg,
        crypto: &C,
        now: Instant,
    ) -> Result<(), PacemakerError> {
        if self.stopped || timeout.view < self.view_info.view || !crypto.verify_timeout_msg(&timeout)
        {
            return Ok(());
        }

        let view = timeout.view;
        if let Some(timeouts) = self.timeout_collector.collect(timeout) {
            let tc = crypto.create_timeout_cert(view, &timeouts)?;

            Event::CollectTC(CollectTCEvent {
                timestamp: SystemTime::now(),
                timeout_cert: tc.clone(),
            })
            .publish(&self.event_publisher);

            self.advance_with_tc(tc, now)?;
        }

        Ok(())
    }

    /// Advance to the view justified by the QC and/or TC in `sync_info`, if it is higher than the
    /// current view. Returns whether the view changed.
    ///
    /// A QC for a block in view `v` justifies view `v + 1`, and a TC for view `v` justifies view `v + 1`.
    /// Certificates are only verified if they would advance the view. A QC whose block is not in
    /// `block_store` is ignored, since its view cannot be known.
    pub(crate) fn advance_view<B: BlockStore, C: Crypto>(
        &mut self,
        sync_info: &SyncInfo,
        block_store: &B,
        crypto: &C,
        now: Instant,
    ) -> Result<bool, PacemakerError> {
        if self.stopped {
            return Ok(false);
        }
        let mut advanced = false;

        // 1. Advance through the TC, keeping the backoff: a TC means the last view failed.
        if let Some(tc) = &sync_info.tc {
            if tc.view + 1 > self.view_info.view && crypto.verify_timeout_cert(tc) {
                advanced |= self.advance_with_tc(tc.clone(), now)?;
            }
        }

        // 2. Advance through the QC, resetting the backoff: a QC means the network makes progress.
        if let Some(qc) = &sync_info.qc {
            if let Some(certified_view) = invariants::qc_view(qc, block_store) {
                if certified_view + 1 > self.view_info.view && crypto.verify_quorum_cert(qc) {
                    self.consecutive_timeouts = 0;
                    self.update_view(certified_view + 1, now)?;
                    advanced = true;
                }
            }
        }

        Ok(advanced)
    }

    /// Stop the Pacemaker. Afterwards, the view never changes and no more timeouts are sent.
    pub(crate) fn stop(&mut self) {
        self.stopped = true
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Record `tc` as the highest TC if it is higher than the current one, and advance to the view after
    /// it if that view is higher than the current view.
    ///
    /// # Precondition
    ///
    /// `tc` is valid.
    fn advance_with_tc(&mut self, tc: TimeoutCert, now: Instant) -> Result<bool, PacemakerError> {
        let next_view = tc.view + 1;
        if self
            .highest_tc
            .as_ref()
            .map_or(true, |highest_tc| tc.view > highest_tc.view)
        {
            self.highest_tc = Some(tc);
        }

        if next_view > self.view_info.view {
            self.update_view(next_view, now)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Move to `next_view`: look up its leader, arm its deadline, and drop the timeouts collected for
    /// the views left behind.
    ///
    /// # Errors
    ///
    /// `next_view` must be greater than the current view. Otherwise, an
    /// [`PacemakerError::NonIncreasingView`] is returned.
    fn update_view(&mut self, next_view: ViewNumber, now: Instant) -> Result<(), PacemakerError> {
        let cur_view = self.view_info.view;
        if next_view <= cur_view {
            return Err(PacemakerError::NonIncreasingView {
                cur_view,
                next_view,
            });
        }

        self.view_info = ViewInfo::new(
            next_view,
            self.leader_rotation.leader(next_view),
            now + self.config.view_timeouts.timeout(self.consecutive_timeouts),
        );
        self.timeout_collector.remove_below(next_view);

        Ok(())
    }
}

/// Immutable parameters that determine the behaviour of the [`Pacemaker`].
#[derive(Clone)]
pub(crate) struct PacemakerConfiguration {
    pub(crate) me: ReplicaID,
    pub(crate) quorum_size: usize,
    pub(crate) view_timeouts: ViewTimeouts,
}

/// Enumerates the different ways a call to any of [`Pacemaker`]'s methods can fail.
#[derive(Debug)]
pub enum PacemakerError {
    /// The Pacemaker was asked to move to a view that is not greater than its current view.
    NonIncreasingView {
        cur_view: ViewNumber,
        next_view: ViewNumber,
    },
    /// A quorum of valid timeouts could not be combined into a TC.
    CertificateError(CertificateError),
}

impl From<CertificateError> for PacemakerError {
    fn from(value: CertificateError) -> Self {
        PacemakerError::CertificateError(value)
    }
}

impl Display for PacemakerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PacemakerError::NonIncreasingView {
                cur_view,
                next_view,
            } => write!(f, "cannot move from view {} to view {}", cur_view, next_view),
            PacemakerError::CertificateError(err) => write!(f, "could not form a TC: {}", err),
        }
    }
}

impl Error for PacemakerError {}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use rand_core::OsRng;

    use super::*;
    use crate::{
        block_store::InMemoryBlockStore,
        crypto::{ed25519::Ed25519Crypto, Signer, Verifier},
        leader_rotation::RoundRobin,
        networking::messages::Message,
        pacemaker::messages::PacemakerMessage,
        types::{
            block::Block,
            crypto_primitives::SigningKey,
            data_types::Command,
            replica_set::ReplicaSet,
        },
    };

    /// Records every message sent through it.
    #[derive(Clone, Default)]
    struct RecordingNetwork {
        sent: Arc<Mutex<Vec<(Option<ReplicaID>, Message)>>>,
    }

    impl RecordingNetwork {
        fn timeouts(&self) -> Vec<TimeoutMsg> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(_, message)| match message {
                    Message::PacemakerMessage(PacemakerMessage::Timeout(timeout)) => {
                        Some(timeout.clone())
                    }
                    _ => None,
                })
                .collect()
        }
    }

    impl Network for RecordingNetwork {
        fn broadcast(&mut self, message: Message) {
            self.sent.lock().unwrap().push((None, message))
        }

        fn send(&mut self, peer: ReplicaID, message: Message) {
            self.sent.lock().unwrap().push((Some(peer), message))
        }

        fn recv(&mut self) -> Option<(ReplicaID, Message)> {
            None
        }
    }

    const BASE: Duration = Duration::from_millis(100);

    fn cluster(n: u32) -> (Vec<Ed25519Crypto>, ReplicaSet) {
        let mut csprg = OsRng {};
        let keys: Vec<SigningKey> = (0..n).map(|_| SigningKey::generate(&mut csprg)).collect();
        let mut replica_set = ReplicaSet::new();
        for (i, key) in keys.iter().enumerate() {
            replica_set.put(ReplicaID::new(i as u32), key.verifying_key());
        }
        let cryptos = keys
            .into_iter()
            .enumerate()
            .map(|(i, key)| Ed25519Crypto::new(ReplicaID::new(i as u32), key, replica_set.clone()))
            .collect();
        (cryptos, replica_set)
    }

    fn pacemaker(
        me: u32,
        replica_set: &ReplicaSet,
        now: Instant,
    ) -> (Pacemaker<RecordingNetwork>, RecordingNetwork) {
        let network = RecordingNetwork::default();
        let config = PacemakerConfiguration {
            me: ReplicaID::new(me),
            quorum_size: replica_set.quorum_size(),
            view_timeouts: ViewTimeouts::new(BASE, BASE * 8, 2),
        };
        let pacemaker = Pacemaker::new(
            config,
            Box::new(RoundRobin::new(replica_set)),
            ViewNumber::new(1),
            now,
            SenderHandle::new(network.clone()),
            None,
        );
        (pacemaker, network)
    }

    fn timeout(crypto: &Ed25519Crypto, view: u64) -> TimeoutMsg {
        let view = ViewNumber::new(view);
        TimeoutMsg {
            sender: crypto.id(),
            view,
            signature: crypto.sign(&view.to_hash()),
            high_qc: QuorumCert::genesis(),
        }
    }

    fn timeout_cert(cryptos: &[Ed25519Crypto], view: u64) -> TimeoutCert {
        let timeouts: Vec<TimeoutMsg> = cryptos.iter().map(|crypto| timeout(crypto, view)).collect();
        cryptos[0]
            .create_timeout_cert(ViewNumber::new(view), &timeouts)
            .unwrap()
    }

    #[test]
    fn tick_before_deadline_does_nothing() {
        let (cryptos, replica_set) = cluster(4);
        let start = Instant::now();
        let (mut pacemaker, network) = pacemaker(0, &replica_set, start);

        pacemaker
            .tick(start + BASE / 2, &QuorumCert::genesis(), &cryptos[0])
            .unwrap();

        assert!(network.timeouts().is_empty());
        assert_eq!(pacemaker.query().view, ViewNumber::new(1));
        assert_eq!(pacemaker.query().leader, ReplicaID::new(1));
    }

    #[test]
    fn local_timeout_broadcasts_and_backs_off() {
        let (cryptos, replica_set) = cluster(4);
        let start = Instant::now();
        let (mut pacemaker, network) = pacemaker(0, &replica_set, start);

        let now = start + BASE;
        pacemaker.tick(now, &QuorumCert::genesis(), &cryptos[0]).unwrap();

        let sent = network.timeouts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].view, ViewNumber::new(1));
        assert_eq!(sent[0].sender, ReplicaID::new(0));
        assert!(cryptos[1].verify_timeout_msg(&sent[0]));

        // The view is kept, with a doubled timeout.
        assert_eq!(pacemaker.query().view, ViewNumber::new(1));
        assert_eq!(pacemaker.query().deadline, now + BASE * 2);

        // Ticking again before the new deadline does not send another timeout.
        pacemaker
            .tick(now + BASE, &QuorumCert::genesis(), &cryptos[0])
            .unwrap();
        assert_eq!(network.timeouts().len(), 1);
    }

    #[test]
    fn quorum_of_timeouts_forms_tc_and_advances() {
        let (cryptos, replica_set) = cluster(4);
        let start = Instant::now();
        let (mut pacemaker, _) = pacemaker(0, &replica_set, start);

        for crypto in &cryptos[1..3] {
            pacemaker
                .on_receive_timeout(timeout(crypto, 1), &cryptos[0], start)
                .unwrap();
        }
        assert_eq!(pacemaker.query().view, ViewNumber::new(1));

        // Forged: signed by replica 3 but claims to be from replica 0.
        let mut forged = timeout(&cryptos[3], 1);
        forged.sender = ReplicaID::new(0);
        pacemaker.on_receive_timeout(forged, &cryptos[0], start).unwrap();
        assert_eq!(pacemaker.query().view, ViewNumber::new(1));

        pacemaker
            .on_receive_timeout(timeout(&cryptos[3], 1), &cryptos[0], start)
            .unwrap();
        assert_eq!(pacemaker.query().view, ViewNumber::new(2));
        assert_eq!(pacemaker.query().leader, ReplicaID::new(2));
        assert_eq!(pacemaker.highest_tc().map(|tc| tc.view), Some(ViewNumber::new(1)));
    }

    #[test]
    fn timeouts_for_far_future_views_do_not_pile_up() {
        let (cryptos, replica_set) = cluster(4);
        let start = Instant::now();
        let (mut pacemaker, _) = pacemaker(0, &replica_set, start);

        for view in 2..=500 {
            pacemaker
                .on_receive_timeout(timeout(&cryptos[3], view), &cryptos[0], start)
                .unwrap();
        }
        assert_eq!(pacemaker.timeout_collector.len(), 1);
        assert_eq!(pacemaker.query().view, ViewNumber::new(1));

        // The others can still time out the current view together.
        for crypto in &cryptos[..3] {
            pacemaker
                .on_receive_timeout(timeout(crypto, 1), &cryptos[0], start)
                .unwrap();
        }
        assert_eq!(pacemaker.query().view, ViewNumber::new(2));
        assert_eq!(pacemaker.timeout_collector.len(), 1);
    }

    #[test]
    fn stale_timeouts_are_ignored() {
        let (cryptos, replica_set) = cluster(4);
        let start = Instant::now();
        let (mut pacemaker, _) = pacemaker(0, &replica_set, start);
        let block_store = InMemoryBlockStore::new();

        pacemaker
            .advance_view(&SyncInfo::with_tc(timeout_cert(&cryptos[1..], 3)), &block_store, &cryptos[0], start)
            .unwrap();
        assert_eq!(pacemaker.query().view, ViewNumber::new(4));

        for crypto in &cryptos {
            pacemaker
                .on_receive_timeout(timeout(crypto, 2), &cryptos[0], start)
                .unwrap();
        }
        assert_eq!(pacemaker.query().view, ViewNumber::new(4));
        assert_eq!(pacemaker.highest_tc().map(|tc| tc.view), Some(ViewNumber::new(3)));
    }

    #[test]
    fn timeout_cert_for_view_five_moves_to_view_six() {
        let (cryptos, replica_set) = cluster(4);
        let start = Instant::now();
        let (mut pacemaker, _) = pacemaker(0, &replica_set, start);
        let block_store = InMemoryBlockStore::new();

        let tc = timeout_cert(&cryptos[..3], 5);
        let advanced = pacemaker
            .advance_view(&SyncInfo::with_tc(tc.clone()), &block_store, &cryptos[0], start)
            .unwrap();

        assert!(advanced);
        assert_eq!(pacemaker.query().view, ViewNumber::new(6));
        assert_eq!(pacemaker.query().leader, ReplicaID::new(2));
        assert_eq!(pacemaker.highest_tc(), Some(&tc));

        // Replaying the same TC is a no-op.
        let advanced = pacemaker
            .advance_view(&SyncInfo::with_tc(tc), &block_store, &cryptos[0], start)
            .unwrap();
        assert!(!advanced);
    }

    #[test]
    fn invalid_or_stale_certificates_do_not_advance() {
        let (cryptos, replica_set) = cluster(4);
        let start = Instant::now();
        let (mut pacemaker, _) = pacemaker(0, &replica_set, start);
        let mut block_store = InMemoryBlockStore::new();

        // Two signatures are not a quorum of four.
        let mut tc = timeout_cert(&cryptos[..3], 7);
        tc.signatures.pop();
        assert!(!pacemaker
            .advance_view(&SyncInfo::with_tc(tc), &block_store, &cryptos[0], start)
            .unwrap());

        // The genesis QC justifies view 1, where the pacemaker already is.
        assert!(!pacemaker
            .advance_view(&SyncInfo::with_qc(QuorumCert::genesis()), &block_store, &cryptos[0], start)
            .unwrap());

        // A QC for an unknown block is ignored.
        let block = Block::new(
            Block::genesis().hash,
            Command::from("a"),
            ViewNumber::new(4),
            QuorumCert::genesis(),
            ReplicaID::new(0),
        );
        let certs: Vec<_> = cryptos[..3]
            .iter()
            .map(|crypto| crypto.create_partial_cert(&block))
            .collect();
        let qc = cryptos[0].create_quorum_cert(&block, &certs).unwrap();
        assert!(!pacemaker
            .advance_view(&SyncInfo::with_qc(qc.clone()), &block_store, &cryptos[0], start)
            .unwrap());

        // Once the block is known, the QC moves the pacemaker past the block's view.
        block_store.store(block);
        assert!(pacemaker
            .advance_view(&SyncInfo::with_qc(qc), &block_store, &cryptos[0], start)
            .unwrap());
        assert_eq!(pacemaker.query().view, ViewNumber::new(5));
    }

    #[test]
    fn progress_through_qc_resets_backoff() {
        let (cryptos, replica_set) = cluster(4);
        let start = Instant::now();
        let (mut pacemaker, _) = pacemaker(0, &replica_set, start);
        let mut block_store = InMemoryBlockStore::new();

        // Two local timeouts in view 1.
        pacemaker.tick(start + BASE, &QuorumCert::genesis(), &cryptos[0]).unwrap();
        pacemaker.tick(start + BASE * 3, &QuorumCert::genesis(), &cryptos[0]).unwrap();

        // A TC keeps the backoff.
        let now = start + BASE * 4;
        pacemaker
            .advance_view(&SyncInfo::with_tc(timeout_cert(&cryptos[1..], 1)), &block_store, &cryptos[0], now)
            .unwrap();
        assert_eq!(pacemaker.query().view, ViewNumber::new(2));
        assert_eq!(pacemaker.query().deadline, now + BASE * 4);

        // A QC resets it.
        let block = Block::new(
            Block::genesis().hash,
            Command::from("b"),
            ViewNumber::new(2),
            QuorumCert::genesis(),
            ReplicaID::new(2),
        );
        let certs: Vec<_> = cryptos[1..]
            .iter()
            .map(|crypto| crypto.create_partial_cert(&block))
            .collect();
        let qc = cryptos[0].create_quorum_cert(&block, &certs).unwrap();
        block_store.store(block);
        pacemaker
            .advance_view(&SyncInfo::with_qc(qc), &block_store, &cryptos[0], now)
            .unwrap();
        assert_eq!(pacemaker.query().view, ViewNumber::new(3));
        assert_eq!(pacemaker.query().deadline, now + BASE);
    }

    #[test]
    fn stopped_pacemaker_ignores_everything() {
        let (cryptos, replica_set) = cluster(4);
        let start = Instant::now();
        let (mut pacemaker, network) = pacemaker(0, &replica_set, start);
        let block_store = InMemoryBlockStore::new();

        pacemaker.stop();
        assert!(pacemaker.is_stopped());

        pacemaker.tick(start + BASE * 10, &QuorumCert::genesis(), &cryptos[0]).unwrap();
        assert!(network.timeouts().is_empty());

        assert!(!pacemaker
            .advance_view(&SyncInfo::with_tc(timeout_cert(&cryptos[1..], 5)), &block_store, &cryptos[0], start)
            .unwrap());
        assert_eq!(pacemaker.query().view, ViewNumber::new(1));
    }
}
