/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A cluster of replicas driven by hand, in a single thread, with a synthetic clock.
//!
//! Each replica's [`Algorithm`] is built with [`ReplicaSpec::algorithm`] and fed messages drained from
//! its mock network inbox, so tests decide exactly which messages are delivered, dropped, or reordered,
//! and when timers fire.

use std::time::{Duration, Instant};

use chained_hotstuff::{
    algorithm::Algorithm,
    block_store::InMemoryBlockStore,
    crypto::ed25519::Ed25519Crypto,
    leader_rotation::RoundRobin,
    networking::messages::Message,
    replica::{Configuration, ReplicaSpec},
    types::{
        crypto_primitives::SigningKey,
        data_types::{ReplicaID, ViewNumber},
        replica_set::ReplicaSet,
    },
};
use rand::{rngs::StdRng, seq::SliceRandom};
use rand_core::OsRng;

use super::{
    app::{CommitLog, Commands, RejectList},
    network::{mock_network, NetworkStub},
};

pub(crate) const BASE_VIEW_TIMEOUT: Duration = Duration::from_secs(1);
pub(crate) const MAX_VIEW_TIMEOUT: Duration = Duration::from_secs(8);

pub(crate) type TestAlgorithm = Algorithm<NetworkStub, InMemoryBlockStore, Ed25519Crypto>;

pub(crate) struct Peer {
    pub(crate) algorithm: TestAlgorithm,
    /// A copy of the replica's keys, for tests that sign messages on its behalf.
    pub(crate) crypto: Ed25519Crypto,
    pub(crate) inbox: NetworkStub,
    pub(crate) commands: Commands,
    pub(crate) rejects: RejectList,
    pub(crate) commit_log: CommitLog,
}

impl Peer {
    pub(crate) fn id(&self) -> ReplicaID {
        self.algorithm.me()
    }

    pub(crate) fn committed_view(&self) -> ViewNumber {
        self.algorithm.last_committed().1
    }
}

pub(crate) struct Cluster {
    pub(crate) peers: Vec<Peer>,
    pub(crate) replica_set: ReplicaSet,
}

impl Cluster {
    /// Create `n` replicas with IDs `0..n`, led in round-robin order, whose first view starts at
    /// `now`.
    pub(crate) fn new(n: u32, now: Instant) -> Cluster {
        let mut csprg = OsRng {};
        let keys: Vec<(ReplicaID, SigningKey)> = (0..n)
            .map(|i| (ReplicaID::new(i), SigningKey::generate(&mut csprg)))
            .collect();

        let mut replica_set = ReplicaSet::new();
        for (id, key) in &keys {
            replica_set.put(*id, key.verifying_key());
        }

        let networks = mock_network(keys.iter().map(|(id, _)| *id));
        let peers = keys
            .into_iter()
            .zip(networks)
            .map(|((id, key), network)| {
                let commands = Commands::default();
                let rejects = RejectList::default();
                let commit_log = CommitLog::default();
                let crypto = Ed25519Crypto::new(id, key, replica_set.clone());

                let algorithm = ReplicaSpec::builder()
                    .network(network.clone())
                    .block_store(InMemoryBlockStore::new())
                    .crypto(crypto.clone())
                    .leader_rotation(RoundRobin::new(&replica_set))
                    .command_queue(commands.clone())
                    .acceptor(rejects.clone())
                    .executor(commit_log.clone())
                    .configuration(configuration(id, replica_set.clone()))
                    .build()
                    .algorithm(now);

                Peer {
                    algorithm,
                    crypto,
                    inbox: network,
                    commands,
                    rejects,
                    commit_log,
                }
            })
            .collect();

        Cluster { peers, replica_set }
    }

    pub(crate) fn peer(&self, id: u32) -> &Peer {
        &self.peers[id as usize]
    }

    pub(crate) fn peer_mut(&mut self, id: u32) -> &mut Peer {
        &mut self.peers[id as usize]
    }

    pub(crate) fn tick_all(&mut self, now: Instant) {
        for peer in &mut self.peers {
            peer.algorithm.handle_tick(now).unwrap();
        }
    }

    /// Drain every inbox once and hand each message for which `filter(origin, recipient, message)`
    /// holds to its recipient. Returns the number of messages drained, delivered or not.
    pub(crate) fn deliver_round(
        &mut self,
        now: Instant,
        filter: &mut dyn FnMut(ReplicaID, ReplicaID, &Message) -> bool,
    ) -> usize {
        let mut drained = 0;
        for peer in &mut self.peers {
            let recipient = peer.id();
            for (origin, message) in peer.inbox.drain() {
                drained += 1;
                if filter(origin, recipient, &message) {
                    peer.algorithm
                        .handle_message(origin, message, now)
                        .unwrap();
                }
            }
        }
        drained
    }

    /// Deliver messages round by round until `done` holds, the network is quiet, or `max_rounds`
    /// rounds have passed. Returns whether `done` holds.
    pub(crate) fn run_until(
        &mut self,
        now: Instant,
        filter: &mut dyn FnMut(ReplicaID, ReplicaID, &Message) -> bool,
        done: impl Fn(&Cluster) -> bool,
        max_rounds: usize,
    ) -> bool {
        for _ in 0..max_rounds {
            if done(self) {
                return true;
            }
            if self.deliver_round(now, filter) == 0 {
                break;
            }
        }
        done(self)
    }

    /// Deliver every message until the network is quiet, or panic after `max_rounds` rounds.
    pub(crate) fn settle(
        &mut self,
        now: Instant,
        filter: &mut dyn FnMut(ReplicaID, ReplicaID, &Message) -> bool,
        max_rounds: usize,
    ) {
        for _ in 0..max_rounds {
            if self.deliver_round(now, filter) == 0 {
                return;
            }
        }
        panic!("network did not settle within {} rounds", max_rounds);
    }

    /// Drain every inbox and deliver all the messages in a random order.
    pub(crate) fn deliver_shuffled(&mut self, now: Instant, rng: &mut StdRng) -> usize {
        let mut pending: Vec<(usize, ReplicaID, Message)> = Vec::new();
        for (index, peer) in self.peers.iter().enumerate() {
            for (origin, message) in peer.inbox.drain() {
                pending.push((index, origin, message));
            }
        }
        pending.shuffle(rng);

        let delivered = pending.len();
        for (index, origin, message) in pending {
            self.peers[index]
                .algorithm
                .handle_message(origin, message, now)
                .unwrap();
        }
        delivered
    }
}

pub(crate) fn configuration(me: ReplicaID, replica_set: ReplicaSet) -> Configuration {
    Configuration::builder()
        .me(me)
        .replica_set(replica_set)
        .base_view_timeout(BASE_VIEW_TIMEOUT)
        .max_view_timeout(MAX_VIEW_TIMEOUT)
        .log_events(false)
        .build()
}

/// Delivers everything.
pub(crate) fn deliver_everything(_: ReplicaID, _: ReplicaID, _: &Message) -> bool {
    true
}
