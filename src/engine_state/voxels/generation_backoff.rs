//! Retry bookkeeping for chunk positions whose terrain generation failed.
//!
//! A failing position waits `base · 2^(failures - 1)` (capped at `max`) before it
//! may be generated again. Records live in an LRU so a world full of failures
//! cannot grow the table without bound; forgetting a record only means the
//! position is retried sooner.

use std::num::NonZeroUsize;

use lru::LruCache;
use web_time::{Duration, Instant};

use crate::{config::RetryConfig, engine_state::voxels::chunk::ChunkPosition};

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    failures: u32,
    retry_at: Instant,
    /// Set once the retry has been handed back to the generation queue.
    reoffered: bool,
}

/// Exponential backoff table keyed by chunk position.
pub struct GenerationBackoff {
    failures: LruCache<ChunkPosition, FailureRecord>,
    base_delay: Duration,
    max_delay: Duration,
}

impl GenerationBackoff {
    /// Creates an empty table from the retry configuration.
    pub fn new(config: &RetryConfig) -> Self {
        let capacity = NonZeroUsize::new(config.tracked_positions).unwrap_or(NonZeroUsize::MIN);
        Self {
            failures: LruCache::new(capacity),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }

    /// Records a failed attempt and returns the delay before the next one.
    pub fn record_failure(&mut self, position: ChunkPosition, now: Instant) -> Duration {
        let failures = self
            .failures
            .get(&position)
            .map_or(1, |record| record.failures.saturating_add(1));
        let delay = self.delay_for(failures);
        self.failures.put(
            position,
            FailureRecord {
                failures,
                retry_at: now + delay,
                reoffered: false,
            },
        );
        delay
    }

    /// Forgets a position after it generated successfully.
    pub fn record_success(&mut self, position: ChunkPosition) {
        self.failures.pop(&position);
    }

    /// Whether the position may be enqueued for generation at `now`.
    pub fn is_ready(&self, position: ChunkPosition, now: Instant) -> bool {
        self.failures
            .peek(&position)
            .is_none_or(|record| record.retry_at <= now)
    }

    /// Number of consecutive failures recorded for a position.
    pub fn failures(&self, position: ChunkPosition) -> u32 {
        self.failures.peek(&position).map_or(0, |record| record.failures)
    }

    /// Positions whose delay has elapsed and which have not been re-offered yet.
    ///
    /// Each due position is reported once per failure.
    pub fn take_due(&mut self, now: Instant) -> Vec<ChunkPosition> {
        let mut due = Vec::new();
        for (position, record) in self.failures.iter_mut() {
            if !record.reoffered && record.retry_at <= now {
                record.reoffered = true;
                due.push(*position);
            }
        }
        due
    }

    fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}
