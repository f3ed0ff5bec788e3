/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol for Byzantine view synchronization and leader selection.
//!
//! # Byzantine View Synchronization
//!
//! SMR protocols like [HotStuff](super::hotstuff) can only make progress if a quorum of replicas spend
//! a long enough time in the same view in order to vote for the same proposal. In other words, state
//! machine replication is only live once **view synchronization** is achieved, and it has to be achieved
//! without synchronized clocks and in the presence of replicas that fail in arbitrary ways.
//!
//! The Pacemaker achieves it through certificates:
//! 1. **Progress**: a QC for a block proposed in view `v` proves that a quorum voted in `v`. Any
//!    replica that sees it moves to `v + 1` immediately, which makes view changes after successful
//!    views as fast as the network allows.
//! 2. **Timeouts**: a replica that spends too long in a view broadcasts a signed
//!    [`TimeoutMsg`](crate::types::certificates::TimeoutMsg). A quorum of timeout messages for `v` forms a
//!    [`TimeoutCert`](crate::types::certificates::TimeoutCert), which moves every replica that sees it to
//!    `v + 1`. Replicas that never vote in a view they gave up on keep TCs safe to act upon.
//!
//! Certificates reach lagging replicas through the `NewView` messages sent to each view's leader and
//! through the `high_qc` carried in every timeout message.
//!
//! ## View timeouts
//!
//! The duration of a view grows exponentially with the number of consecutive views that timed out,
//! up to a configurable maximum, and returns to the base duration as soon as a QC is seen. This lets
//! replicas whose views drifted apart eventually overlap for long enough to make progress.
//!
//! ## Leader selection
//!
//! The leader of each view is decided by the configured
//! [`LeaderRotation`](crate::leader_rotation::LeaderRotation).

pub mod implementation;

pub mod messages;

pub mod types;
