/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The fixed membership of a cluster of replicas, and the quorum arithmetic that follows from it.

use std::collections::HashMap;

use ed25519_dalek::VerifyingKey;

use super::data_types::ReplicaID;

/// Stores the identities of the replicas in a cluster and the keys used to check their signatures.
///
/// ## Ordering of replicas
///
/// `ReplicaSet` internally maintains the list of replicas in ascending order of their [`ReplicaID`]s.
/// This is the order that [`RoundRobin`](crate::leader_rotation::RoundRobin) walks through.
///
/// ## Quorums
///
/// With `n` replicas the set tolerates `f = (n - 1) / 3` Byzantine replicas, and a quorum is any
/// `n - f` of them. Any two quorums intersect in at least one correct replica.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct ReplicaSet {
    // Replica IDs in ascending order.
    replicas: Vec<ReplicaID>,
    keys: HashMap<ReplicaID, VerifyingKey>,
}

impl ReplicaSet {
    /// Create an empty replica set.
    pub fn new() -> ReplicaSet {
        Self {
            replicas: Vec::new(),
            keys: HashMap::new(),
        }
    }

    /// Put `replica` into the replica set with the given `verifying_key`, preserving the
    /// [ordering of replicas](Self#ordering-of-replicas).
    ///
    /// If `replica` already exists in the replica set, this function replaces its key instead.
    pub fn put(&mut self, replica: ReplicaID, verifying_key: VerifyingKey) {
        if let Err(insert_pos) = self.replicas.binary_search(&replica) {
            self.replicas.insert(insert_pos, replica);
        }
        self.keys.insert(replica, verifying_key);
    }

    /// Check whether the replica set contains `replica`.
    pub fn contains(&self, replica: &ReplicaID) -> bool {
        self.keys.contains_key(replica)
    }

    /// Get the verifying key of `replica`, if it is a member.
    pub fn verifying_key(&self, replica: &ReplicaID) -> Option<&VerifyingKey> {
        self.keys.get(replica)
    }

    /// Get an iterator through the replica IDs in ascending order.
    pub fn replicas(&self) -> impl Iterator<Item = &ReplicaID> {
        self.replicas.iter()
    }

    /// Get the `n`-th replica in ascending order of IDs.
    pub fn nth(&self, n: usize) -> Option<&ReplicaID> {
        self.replicas.get(n)
    }

    /// Get the number of replicas in the replica set.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Check whether the replica set is empty.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Get the maximum number of Byzantine replicas this replica set can tolerate.
    pub fn max_faulty(&self) -> usize {
        self.len().saturating_sub(1) / 3
    }

    /// Get the minimum number of distinct signatures needed to form a certificate.
    pub fn quorum_size(&self) -> usize {
        self.len() - self.max_faulty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn replica_set(n: u32) -> ReplicaSet {
        let mut replica_set = ReplicaSet::new();
        for i in (0..n).rev() {
            let signing_key = SigningKey::from_bytes(&[i as u8 + 1; 32]);
            replica_set.put(ReplicaID::new(i), signing_key.verifying_key());
        }
        replica_set
    }

    #[test]
    fn quorum_size_is_n_minus_f() {
        assert_eq!(replica_set(1).quorum_size(), 1);
        assert_eq!(replica_set(3).quorum_size(), 3);
        assert_eq!(replica_set(4).quorum_size(), 3);
        assert_eq!(replica_set(7).quorum_size(), 5);
        assert_eq!(replica_set(10).quorum_size(), 7);
    }

    #[test]
    fn replicas_are_kept_in_ascending_order() {
        let replica_set = replica_set(5);
        let ids: Vec<u32> = replica_set.replicas().map(|id| id.int()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(replica_set.nth(2), Some(&ReplicaID::new(2)));
    }
}
