/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica.
//!
//! The consensus core works to safely replicate a log of commands across a fixed set of processes. In
//! our terminology, these processes are called 'replicas', and the set of all replicas is called the
//! 'replica set'. Each replica is uniquely identified by a [`ReplicaID`], and holds the
//! [verifying key](crate::types::crypto_primitives::VerifyingKey) of every member.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the replica](ReplicaSpec) with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [`ReplicaSpec`],
//! - The function to [start](ReplicaSpec::start) a [`Replica`] given its specification,
//! - The function to build an [`Algorithm`] that the caller drives by hand instead
//!   ([`ReplicaSpec::algorithm`]),
//! - [The type](Replica) which keeps the replica alive.
//!
//! ## Starting a replica
//!
//! Here is an example that demonstrates how to build and start running a replica using the builder
//! pattern:
//!
//! ```ignore
//! let replica =
//!     ReplicaSpec::builder()
//!     .network(network)
//!     .block_store(InMemoryBlockStore::new())
//!     .crypto(Ed25519Crypto::new(me, signing_key, replica_set.clone()))
//!     .leader_rotation(RoundRobin::new(&replica_set))
//!     .command_queue(command_queue)
//!     .acceptor(acceptor)
//!     .executor(executor)
//!     .configuration(configuration)
//!     .on_commit_block(commit_handler)
//!     .build()
//!     .start()
//! ```
//!
//! ### Required setters
//!
//! The required setters are for providing the trait implementations required to run a replica:
//! - `.network(...)`
//! - `.block_store(...)`
//! - `.crypto(...)`
//! - `.leader_rotation(...)`
//! - `.command_queue(...)`
//! - `.acceptor(...)`
//! - `.executor(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from
//! [`crate::events`], one per event type, e.g.:
//! - `.on_insert_block(...)`
//! - `.on_commit_block(...)`
//! - `.on_start_view(...)`
//! - `.on_collect_tc(...)`
//!
//! The replica's [configuration](Configuration) can also be defined using the builder pattern, for
//! example:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(ReplicaID::new(0))
//!     .replica_set(replica_set)
//!     .base_view_timeout(Duration::from_millis(500))
//!     .max_view_timeout(Duration::from_secs(8))
//!     .log_events(true)
//!     .build()
//! ```

use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use typed_builder::TypedBuilder;

use crate::algorithm::Algorithm;
use crate::app::{Acceptor, AppHandle, CommandQueue, Executor};
use crate::block_store::BlockStore;
use crate::crypto::Crypto;
use crate::event_bus::*;
use crate::events::*;
use crate::hotstuff::implementation::HotStuffConfiguration;
use crate::leader_rotation::LeaderRotation;
use crate::networking::network::Network;
use crate::pacemaker::implementation::PacemakerConfiguration;
use crate::pacemaker::types::ViewTimeouts;
use crate::types::{data_types::ReplicaID, replica_set::ReplicaSet};

/// Stores the user-defined parameters required to start the replica, that is:
/// 1. The replica's [ID](ReplicaID).
/// 2. The [replica set](ReplicaSet), which fixes the quorum size.
/// 3. The base view timeout: how long a view lasts if the previous view made progress.
/// 4. The maximum view timeout, which caps the backoff applied after consecutive view timeouts.
/// 5. The view timeout multiplier applied on each consecutive view timeout.
/// 6. The "Log Events" flag, if set to "true" then logs should be printed.
///
/// ## View timeouts
///
/// After `k` consecutive views time out, the next view lasts `min(base * multiplier^k, max)`. The count
/// resets whenever the replica leaves a view through a QC.
///
/// ## Log Events
///
/// This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.replica_set(...)`
    - `.base_view_timeout(...)`
    - `.max_view_timeout(...)`
    - `.log_events(...)`

    Optional:
    - `.view_timeout_multiplier(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the ID of this replica. Required."))]
    pub me: ReplicaID,
    #[builder(setter(doc = "Set the members of the replica set and their verifying keys. Required."))]
    pub replica_set: ReplicaSet,
    #[builder(setter(doc = "Set the duration of a view entered after progress. Required."))]
    pub base_view_timeout: Duration,
    #[builder(setter(doc = "Set the upper bound on the duration of a view. Required."))]
    pub max_view_timeout: Duration,
    #[builder(
        default = 2,
        setter(doc = "Set the factor by which the view duration grows on each consecutive view timeout. Optional, defaults to 2.")
    )]
    pub view_timeout_multiplier: u32,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl From<Configuration> for (HotStuffConfiguration, PacemakerConfiguration) {
    fn from(config: Configuration) -> Self {
        let quorum_size = config.replica_set.quorum_size();
        let hotstuff_config = HotStuffConfiguration {
            me: config.me,
            quorum_size,
        };
        let pacemaker_config = PacemakerConfiguration {
            me: config.me,
            quorum_size,
            view_timeouts: ViewTimeouts::new(
                config.base_view_timeout,
                config.max_view_timeout,
                config.view_timeout_multiplier,
            ),
        };
        (hotstuff_config, pacemaker_config)
    }
}

/// Stores all necessary parameters and trait implementations required to run the [`Replica`].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.network(...)`
    - `.block_store(...)`
    - `.crypto(...)`
    - `.leader_rotation(...)`
    - `.command_queue(...)`
    - `.acceptor(...)`
    - `.executor(...)`
    - `.configuration(...)`

    Optional: one `.on_*(...)` handler per event type in [crate::events].
"))]
pub struct ReplicaSpec<N: Network + 'static, B: BlockStore, C: Crypto + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the store that holds the replica's blocks. The argument must implement the [BlockStore](crate::block_store::BlockStore) trait. Required."))]
    block_store: B,
    #[builder(setter(doc = "Set the signer and verifier of the replica's certificates. Required."))]
    crypto: C,
    #[builder(setter(
        transform = |leader_rotation: impl LeaderRotation + 'static| Box::new(leader_rotation) as Box<dyn LeaderRotation>,
        doc = "Set the schedule that maps views to leaders. Required."
    ))]
    leader_rotation: Box<dyn LeaderRotation>,
    #[builder(setter(
        transform = |command_queue: impl CommandQueue + 'static| Box::new(command_queue) as Box<dyn CommandQueue>,
        doc = "Set the source of the commands this replica proposes. Required."
    ))]
    command_queue: Box<dyn CommandQueue>,
    #[builder(setter(
        transform = |acceptor: impl Acceptor + 'static| Box::new(acceptor) as Box<dyn Acceptor>,
        doc = "Set the policy deciding which proposed commands this replica votes for. Required."
    ))]
    acceptor: Box<dyn Acceptor>,
    #[builder(setter(
        transform = |executor: impl Executor + 'static| Box::new(executor) as Box<dyn Executor>,
        doc = "Set the receiver of committed commands. Required."
    ))]
    executor: Box<dyn Executor>,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&InsertBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<InsertBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is inserted into the replica's block store. Optional."))]
    on_insert_block: Option<HandlerPtr<InsertBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is committed. Optional."))]
    on_commit_block: Option<HandlerPtr<CommitBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PruneBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PruneBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is removed from the replica's block store. Optional."))]
    on_prune_block: Option<HandlerPtr<PruneBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateHighQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateHighQCEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its highest QC. Optional."))]
    on_update_high_qc: Option<HandlerPtr<UpdateHighQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateLockedQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateLockedQCEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its locked QC. Optional."))]
    on_update_locked_qc: Option<HandlerPtr<UpdateLockedQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a proposal for a block. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&VoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<VoteEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a vote. Optional."))]
    on_vote: Option<HandlerPtr<VoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a new view message to the leader of the view it entered. Optional."))]
    on_new_view: Option<HandlerPtr<NewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&TimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<TimeoutEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a timeout message. Optional."))]
    on_timeout: Option<HandlerPtr<TimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a proposal for a block. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveVoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveVoteEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a vote. Optional."))]
    on_receive_vote: Option<HandlerPtr<ReceiveVoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveNewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveNewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a new view message. Optional."))]
    on_receive_new_view: Option<HandlerPtr<ReceiveNewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveTimeoutEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a timeout message. Optional."))]
    on_receive_timeout: Option<HandlerPtr<ReceiveTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartViewEvent>),
    doc = "Register a handler closure to be invoked after the replica enters a new view. Optional."))]
    on_start_view: Option<HandlerPtr<StartViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ViewTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ViewTimeoutEvent>),
    doc = "Register a handler closure to be invoked after the replica's view times out. Optional."))]
    on_view_timeout: Option<HandlerPtr<ViewTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectQCEvent>),
    doc = "Register a handler closure to be invoked after the replica collects a new quorum certificate. Optional."))]
    on_collect_qc: Option<HandlerPtr<CollectQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectTCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectTCEvent>),
    doc = "Register a handler closure to be invoked after the replica collects a new timeout certificate. Optional."))]
    on_collect_tc: Option<HandlerPtr<CollectTCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&FetchBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<FetchBlockEvent>),
    doc = "Register a handler closure to be invoked after the replica requests a block it is missing. Optional."))]
    on_fetch_block: Option<HandlerPtr<FetchBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DeliverBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DeliverBlockEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a delivered block. Optional."))]
    on_deliver_block: Option<HandlerPtr<DeliverBlockEvent>>,
}

impl<N: Network + 'static, B: BlockStore, C: Crypto + 'static> ReplicaSpec<N, B, C> {
    /// Starts all threads and channels associated with running a replica, and returns the handles to
    /// them in a [`Replica`] struct.
    pub fn start(self) -> Replica {
        let log_events = self.configuration.log_events;
        let event_handlers = EventHandlers::new(
            log_events,
            self.on_insert_block,
            self.on_commit_block,
            self.on_prune_block,
            self.on_update_high_qc,
            self.on_update_locked_qc,
            self.on_propose,
            self.on_vote,
            self.on_new_view,
            self.on_timeout,
            self.on_receive_proposal,
            self.on_receive_vote,
            self.on_receive_new_view,
            self.on_receive_timeout,
            self.on_start_view,
            self.on_view_timeout,
            self.on_collect_qc,
            self.on_collect_tc,
            self.on_fetch_block,
            self.on_deliver_block,
        );

        let (event_publisher, event_bus) = if event_handlers.is_empty() {
            (None, None)
        } else {
            let (event_publisher, event_subscriber) = mpsc::channel();
            let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
            let event_bus =
                start_event_bus(event_handlers, event_subscriber, event_bus_shutdown_receiver);
            (Some(event_publisher), Some((event_bus, event_bus_shutdown)))
        };

        let (hotstuff_config, pacemaker_config) = self.configuration.into();
        let algorithm = Algorithm::new(
            hotstuff_config,
            pacemaker_config,
            self.network,
            self.block_store,
            self.crypto,
            self.leader_rotation,
            AppHandle::new(self.command_queue, self.acceptor, self.executor),
            Instant::now(),
            event_publisher,
        );
        let (algorithm_shutdown, algorithm_shutdown_receiver) = mpsc::channel();
        let algorithm = algorithm.start(algorithm_shutdown_receiver);

        let (event_bus, event_bus_shutdown) = event_bus.unzip();
        Replica {
            algorithm: Some(algorithm),
            algorithm_shutdown,
            event_bus,
            event_bus_shutdown,
        }
    }

    /// Build the replica's [`Algorithm`] without starting any thread, with its first view starting at
    /// `now`. The caller feeds it messages and ticks by hand.
    ///
    /// Registered event handlers are not run: events are only logged and handled on the event bus of a
    /// [started](Self::start) replica.
    pub fn algorithm(self, now: Instant) -> Algorithm<N, B, C> {
        let (hotstuff_config, pacemaker_config) = self.configuration.into();
        Algorithm::new(
            hotstuff_config,
            pacemaker_config,
            self.network,
            self.block_store,
            self.crypto,
            self.leader_rotation,
            AppHandle::new(self.command_queue, self.acceptor, self.executor),
            now,
            None,
        )
    }
}

/// A handle to the background threads of a replica. When this value is dropped, all background threads
/// are gracefully shut down.
pub struct Replica {
    algorithm: Option<JoinHandle<()>>,
    algorithm_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Drop for Replica {
    fn drop(&mut self) {
        // The algorithm thread goes first so that it publishes no event after the event bus is gone.
        let _ = self.algorithm_shutdown.send(());
        if let Some(algorithm) = self.algorithm.take() {
            if algorithm.join().is_err() {
                log::error!("algorithm thread panicked");
            }
        }

        if let Some(event_bus_shutdown) = &self.event_bus_shutdown {
            let _ = event_bus_shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            if event_bus.join().is_err() {
                log::error!("event bus thread panicked");
            }
        }
    }
}
