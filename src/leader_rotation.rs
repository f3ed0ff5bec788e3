/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Deterministic mapping from view numbers to leaders.
//!
//! Every replica must agree on who leads a given view without exchanging any messages, so a
//! [`LeaderRotation`] must be a pure function of the view number and the (fixed) replica set: the same
//! view always maps to the same leader, on every call and on every replica.

use crate::types::{
    data_types::{ReplicaID, ViewNumber},
    replica_set::ReplicaSet,
};

pub trait LeaderRotation: Send {
    /// Get the leader of `view`.
    fn leader(&self, view: ViewNumber) -> ReplicaID;
}

/// Rotates leadership through the replica set in ascending order of [`ReplicaID`]: the leader of
/// `view` is the `(view mod n)`-th replica.
#[derive(Clone)]
pub struct RoundRobin {
    replicas: Vec<ReplicaID>,
}

impl RoundRobin {
    /// Create a round-robin schedule over the members of `replica_set`.
    ///
    /// # Panics
    ///
    /// Panics if `replica_set` is empty, since no view could have a leader.
    pub fn new(replica_set: &ReplicaSet) -> Self {
        assert!(
            !replica_set.is_empty(),
            "a leader rotation needs at least one replica"
        );
        Self {
            replicas: replica_set.replicas().copied().collect(),
        }
    }
}

impl LeaderRotation for RoundRobin {
    fn leader(&self, view: ViewNumber) -> ReplicaID {
        let index = view.int() % (self.replicas.len() as u64);
        self.replicas[index as usize]
    }
}

/// Keeps the same replica as the leader of every view.
#[derive(Clone, Copy)]
pub struct FixedLeader {
    leader: ReplicaID,
}

impl FixedLeader {
    pub fn new(leader: ReplicaID) -> Self {
        Self { leader }
    }
}

impl LeaderRotation for FixedLeader {
    fn leader(&self, _: ViewNumber) -> ReplicaID {
        self.leader
    }
}
