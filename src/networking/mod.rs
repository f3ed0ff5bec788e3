/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer (P2P) networking.
//!
//! The replica does not open sockets itself. Instead, the user supplies a type implementing
//! [`Network`](network::Network), and the replica sends and receives [`Message`](messages::Message)s
//! through it. Delivery may be delayed, reordered, duplicated, or dropped: the protocol tolerates all
//! of these, but only makes progress once the network delivers messages between correct replicas in
//! bounded time.

pub mod network;

pub mod messages;

pub(crate) mod sending;
