/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use crate::types::data_types::ReplicaID;

use super::messages::Message;

/// Point-to-point and broadcast messaging between the members of the replica set.
///
/// Implementations are cloned so that each component of the replica can own a sending handle, so
/// clones must share the same underlying transport.
pub trait Network: Clone + Send {
    /// Send a message to every other member of the replica set without blocking. The sender does not
    /// receive its own broadcasts.
    fn broadcast(&mut self, message: Message);

    /// Send a message to the specified replica without blocking.
    fn send(&mut self, peer: ReplicaID, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(ReplicaID, Message)>;
}
