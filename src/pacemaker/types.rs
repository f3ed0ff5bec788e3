/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of types specific to the [Pacemaker](crate::pacemaker::implementation::Pacemaker)
//! protocol.

use std::{
    collections::{hash_map::Entry, BTreeMap, HashMap},
    time::{Duration, Instant},
};

use crate::types::{
    certificates::TimeoutMsg,
    data_types::{ReplicaID, ViewNumber},
};

/// Information about the view a replica is currently in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewInfo {
    pub view: ViewNumber,
    pub leader: ReplicaID,
    /// The instant at which the view times out unless the replica has left it by then.
    pub deadline: Instant,
}

impl ViewInfo {
    pub(crate) fn new(view: ViewNumber, leader: ReplicaID, deadline: Instant) -> Self {
        Self {
            view,
            leader,
            deadline,
        }
    }
}

/// Exponential backoff policy for view timeouts.
///
/// The k-th consecutive view that times out is given `base * multiplier^k`, capped at `max`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ViewTimeouts {
    base: Duration,
    max: Duration,
    multiplier: u32,
}

impl ViewTimeouts {
    pub(crate) fn new(base: Duration, max: Duration, multiplier: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            multiplier: multiplier.max(1),
        }
    }

    /// Get the duration of a view entered after `consecutive_timeouts` views in a row timed out.
    pub(crate) fn timeout(&self, consecutive_timeouts: u32) -> Duration {
        let mut timeout = self.base;
        for _ in 0..consecutive_timeouts {
            if timeout >= self.max {
                break;
            }
            timeout = timeout.saturating_mul(self.multiplier);
        }
        timeout.min(self.max)
    }
}

/// Collects timeout messages per view until a quorum of distinct senders gave up on the same view.
///
/// Only the highest view each sender timed out in is kept, so the collector never holds more than one
/// timeout per member of the replica set.
pub(crate) struct TimeoutCollector {
    quorum_size: usize,
    timeouts: BTreeMap<ViewNumber, HashMap<ReplicaID, TimeoutMsg>>,
    latest: HashMap<ReplicaID, ViewNumber>,
}

impl TimeoutCollector {
    pub(crate) fn new(quorum_size: usize) -> Self {
        Self {
            quorum_size,
            timeouts: BTreeMap::new(),
            latest: HashMap::new(),
        }
    }

    /// Add `timeout` to the group for its view, replacing its sender's timeout for a lower view. Returns
    /// the group if `timeout` completes a quorum.
    ///
    /// Timeouts for a view lower than one the sender already timed out in are ignored.
    ///
    /// # Preconditions
    /// `timeout` carries a valid signature by its sender.
    pub(crate) fn collect(&mut self, timeout: TimeoutMsg) -> Option<Vec<TimeoutMsg>> {
        match self.latest.get(&timeout.sender) {
            Some(latest) if *latest > timeout.view => return None,
            Some(latest) if *latest < timeout.view => {
                let superseded = *latest;
                if let Some(group) = self.timeouts.get_mut(&superseded) {
                    group.remove(&timeout.sender);
                    if group.is_empty() {
                        self.timeouts.remove(&superseded);
                    }
                }
            }
            _ => (),
        }
        self.latest.insert(timeout.sender, timeout.view);

        let group = self.timeouts.entry(timeout.view).or_default();
        let already_complete = group.len() >= self.quorum_size;
        match group.entry(timeout.sender) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(entry) => {
                entry.insert(timeout);
            }
        }

        if !already_complete && group.len() == self.quorum_size {
            Some(group.values().cloned().collect())
        } else {
            None
        }
    }

    /// Forget the timeouts collected for views lower than `view`.
    pub(crate) fn remove_below(&mut self, view: ViewNumber) {
        self.timeouts = self.timeouts.split_off(&view);
        self.latest.retain(|_, latest| *latest >= view);
    }

    pub(crate) fn views(&self) -> usize {
        self.timeouts.len()
    }

    /// Get the number of timeouts held across all views.
    pub(crate) fn len(&self) -> usize {
        self.timeouts.values().map(HashMap::len).sum()
    }
}
