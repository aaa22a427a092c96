//! Flush Policy
//!
//! Stateless size and time triggers. Callers only ask about non-empty
//! buffers; an empty buffer is never flushed.

use crate::sink::buffer::{LastFlushTimes, PartitionBuffer, TopicPartition};
use std::time::Duration;

/// Size and time thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Records per object (>= 1)
    pub max_records: usize,
    /// Zero disables time-based flushing
    pub flush_interval: Duration,
}

impl FlushPolicy {
    pub fn new(max_records: usize, flush_interval: Duration) -> Self {
        FlushPolicy {
            max_records,
            flush_interval,
        }
    }

    pub fn time_based_enabled(&self) -> bool {
        !self.flush_interval.is_zero()
    }

    pub fn should_flush_on_size(&self, buffer: &PartitionBuffer) -> bool {
        buffer.record_count() >= self.max_records
    }

    /// True once `flush_interval` has elapsed since the key's last flush
    ///
    /// A key without a recorded flush counts as flushed at `now_ms`.
    pub fn should_flush_on_time(
        &self,
        key: &TopicPartition,
        now_ms: u64,
        last_flush: &LastFlushTimes,
    ) -> bool {
        if !self.time_based_enabled() {
            return false;
        }
        let last = last_flush.get(key).unwrap_or(now_ms);
        let elapsed_ms = now_ms.saturating_sub(last);
        u128::from(elapsed_ms) >= self.flush_interval.as_millis()
    }
}
