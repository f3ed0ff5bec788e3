/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A chained HotStuff consensus core, run identically by each of `n` replicas. It tolerates up to
//! `f` Byzantine replicas where `n >= 3f + 1`.
//!
//! Given a stream of commands, the replicas agree on a single, ever-growing chain of committed blocks.
//! No two correct replicas commit conflicting blocks, and the chain grows whenever the network is
//! eventually synchronous and leaders are eventually correct.
//!
//! ## Components
//!
//! - [`hotstuff`]: the consensus engine. Proposes, votes, forms QCs, and applies the locking and commit
//!   rules.
//! - [`pacemaker`]: the view synchronizer. Times views out with exponential backoff, collects timeout
//!   messages into TCs, and advances views on QCs and TCs.
//! - [`block_fetch`]: requests and serves blocks that a replica is missing.
//! - [`crypto`]: the certificate algebra, with an Ed25519 implementation.
//! - [`algorithm`]: the single actor that owns all of the above and feeds events into them.
//! - [`replica`]: builders to configure and start a replica.
//!
//! The library user provides the [network](networking::network::Network), the
//! [block store](block_store::BlockStore), the [leader rotation](leader_rotation::LeaderRotation), and
//! the [application](app).

pub mod algorithm;

pub mod app;

pub mod block_fetch;

pub mod block_store;

pub mod crypto;

pub(crate) mod event_bus;

pub mod events;

pub mod hotstuff;

pub mod leader_rotation;

pub mod logging;

pub mod metrics;

pub mod networking;

pub mod pacemaker;

pub mod replica;

pub mod types;
