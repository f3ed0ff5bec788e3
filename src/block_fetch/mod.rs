/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Protocol for recovering individual blocks that a replica references but has not received.
//!
//! A replica can learn about a block without receiving it: a proposal may name a parent it missed,
//! a QC may certify a block it never saw, or a commit may need an ancestor that was never delivered to
//! it. In all these cases the [consensus engine](crate::hotstuff) broadcasts a
//! [`Fetch`](messages::Fetch) for the missing hash, and sets aside whatever was waiting for it.
//!
//! Every replica runs a [`BlockFetchServer`](server::BlockFetchServer), which answers a `Fetch` with a
//! [`Deliver`](messages::Deliver) carrying the block, if it has it. Delivered blocks are only stored
//! if this replica asked for them, their hash matches their contents, and their QC is valid.
//!
//! Dummy blocks travel the same way: a replica fetches them when a proposal built on them arrives.

pub mod messages;

pub(crate) mod server;
