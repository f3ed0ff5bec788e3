/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol for committing `Block`s.
//!
//! The consensus engine implements chained HotStuff: every block carries a QC for an
//! ancestor, so voting for a block also votes for the chain it extends, and a single round of votes
//! per view drives the commit of earlier blocks.
//!
//! A view generally proceeds as follows:
//! 1. The leader of the view proposes a block that extends its leaf and carries its highest QC as
//!    `justify`. Views skipped since the leaf are first filled with empty "dummy" blocks.
//! 2. Replicas process the proposal: check that it is well-formed, cryptographically correct, extends
//!    the block its QC certifies, and is safe with respect to their locked QC, and ask the application
//!    whether to accept its command. If so they insert the block, update their highest QC and lock,
//!    apply the commit rule, and vote by sending a partial certificate to the proposer.
//! 3. The proposer collects the votes into a QC for its block and adopts it as its highest QC, which
//!    lets the [`Pacemaker`](crate::pacemaker::implementation::Pacemaker) move every replica into the
//!    next view.
//!
//! ## Commit rule
//!
//! A block B is committed when there are two more blocks B₁ and B₂ such that B₂ certifies B₁, B₁
//! certifies B, each is the parent of the next, and the three were proposed in consecutive views.
//! Committing B also commits every uncommitted ancestor of B, in order.
//!
//! ## Safety
//!
//! A replica votes at most once per view, and only for blocks whose QC certifies a block at least as
//! recent as the one certified by its locked QC. Together with the commit rule, this guarantees that
//! no two correct replicas commit conflicting blocks as long as fewer than a third of the replicas are
//! faulty. The predicates themselves live in [`invariants`].

pub mod implementation;

pub(crate) mod invariants;

pub mod messages;

pub(crate) mod types;
