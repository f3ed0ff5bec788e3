/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Measurements computed from [events](crate::events).
//!
//! [`CommitLatency`] measures how long blocks take to go from being inserted into a replica's block
//! store to being committed. Feed it events by registering handlers that forward to it:
//!
//! ```ignore
//! let latency = Arc::new(Mutex::new(CommitLatency::new()));
//! let (on_insert, on_commit, on_prune) = (latency.clone(), latency.clone(), latency.clone());
//!
//! ReplicaSpec::builder()
//!     // ...
//!     .on_insert_block(move |event| on_insert.lock().unwrap().on_insert_block(event))
//!     .on_commit_block(move |event| on_commit.lock().unwrap().on_commit_block(event))
//!     .on_prune_block(move |event| on_prune.lock().unwrap().on_prune_block(event))
//!     .build()
//!     .start();
//! ```
//!
//! Then call [`CommitLatency::take_measurement`] periodically.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use crate::events::{CommitBlockEvent, InsertBlockEvent, PruneBlockEvent};
use crate::types::data_types::CryptoHash;

/// Running mean and variance of a stream of samples, computed with Welford's online algorithm.
#[derive(Clone, Copy, Debug, Default)]
pub struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample.
    pub fn update(&mut self, sample: f64) {
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (sample - self.mean);
    }

    /// Get the mean, the sample variance, and the number of samples added since the last reset. The
    /// variance is 0 with fewer than two samples.
    pub fn get(&self) -> (f64, f64, u64) {
        if self.count < 2 {
            (self.mean, 0.0, self.count)
        } else {
            (self.mean, self.m2 / (self.count - 1) as f64, self.count)
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default()
    }
}

/// Statistics over the commit latencies observed in one measurement period, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatencyMeasurement {
    pub mean: f64,
    pub variance: f64,
    pub count: u64,
}

/// Measures the time between a block's [insertion](InsertBlockEvent) and its
/// [commit](CommitBlockEvent).
///
/// Blocks that are pruned without being committed are forgotten. Blocks committed without having been
/// seen inserted (e.g., before the handler was registered) are not measured.
#[derive(Debug, Default)]
pub struct CommitLatency {
    inserted: HashMap<CryptoHash, SystemTime>,
    latencies: Welford,
}

impl CommitLatency {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_insert_block(&mut self, insert_block_event: &InsertBlockEvent) {
        self.inserted
            .entry(insert_block_event.block.hash)
            .or_insert(insert_block_event.timestamp);
    }

    pub fn on_commit_block(&mut self, commit_block_event: &CommitBlockEvent) {
        if let Some(inserted_at) = self.inserted.remove(&commit_block_event.block) {
            // Clocks that step backwards yield a zero latency.
            let latency = commit_block_event
                .timestamp
                .duration_since(inserted_at)
                .unwrap_or(Duration::ZERO);
            self.latencies.update(latency.as_secs_f64() * 1000.0);
        }
    }

    pub fn on_prune_block(&mut self, prune_block_event: &PruneBlockEvent) {
        self.inserted.remove(&prune_block_event.block);
    }

    /// Get the statistics for the commits observed since the previous call, and start a new
    /// measurement period.
    pub fn take_measurement(&mut self) -> LatencyMeasurement {
        let (mean, variance, count) = self.latencies.get();
        self.latencies.reset();
        LatencyMeasurement {
            mean,
            variance,
            count,
        }
    }

    /// Get the number of inserted blocks that have been neither committed nor pruned yet.
    pub fn pending(&self) -> usize {
        self.inserted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{block::Block, data_types::ViewNumber};

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn welford_matches_two_pass_statistics() {
        let samples = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut welford = Welford::new();
        samples.iter().for_each(|sample| welford.update(*sample));

        let (mean, variance, count) = welford.get();
        assert_eq!(count, 8);
        assert_close(mean, 5.0);
        // Sum of squared deviations is 32.
        assert_close(variance, 32.0 / 7.0);

        welford.reset();
        assert_eq!(welford.get(), (0.0, 0.0, 0));
        welford.update(3.0);
        assert_eq!(welford.get(), (3.0, 0.0, 1));
    }

    #[test]
    fn commit_latency_measures_inserted_blocks_only() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let genesis = Block::genesis();
        let measured = CryptoHash::new([1; 32]);
        let forked = CryptoHash::new([2; 32]);

        let mut latency = CommitLatency::new();
        latency.on_insert_block(&InsertBlockEvent {
            timestamp: t0,
            block: Block { hash: measured, ..genesis.clone() },
        });
        latency.on_insert_block(&InsertBlockEvent {
            timestamp: t0,
            block: Block { hash: forked, ..genesis },
        });
        assert_eq!(latency.pending(), 2);

        latency.on_prune_block(&PruneBlockEvent {
            timestamp: t0 + Duration::from_millis(10),
            block: forked,
        });
        latency.on_commit_block(&CommitBlockEvent {
            timestamp: t0 + Duration::from_millis(250),
            block: measured,
            view: ViewNumber::new(1),
        });
        // Never inserted: ignored.
        latency.on_commit_block(&CommitBlockEvent {
            timestamp: t0 + Duration::from_millis(300),
            block: CryptoHash::new([3; 32]),
            view: ViewNumber::new(2),
        });
        assert_eq!(latency.pending(), 0);

        let measurement = latency.take_measurement();
        assert_eq!(measurement.count, 1);
        assert_close(measurement.mean, 250.0);
        assert_eq!(latency.take_measurement().count, 0);
    }
}
