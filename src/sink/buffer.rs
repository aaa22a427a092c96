//! Partition Buffers
//!
//! One `PartitionBuffer` per (topic, partition), owned by a `BufferRegistry`
//! alongside the per-key last-flush timestamps.
//!
//! Invariant: `record_count == 0` <=> content is empty <=> `start_offset`
//! is unset.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Sentinel for "no record buffered yet"
pub const UNSET_OFFSET: i64 = -1;

/// Buffer key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        TopicPartition {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Unflushed lines for one topic-partition
#[derive(Debug, Clone)]
pub struct PartitionBuffer {
    topic: String,
    partition: i32,
    start_offset: i64,
    content: String,
    record_count: usize,
}

impl PartitionBuffer {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        PartitionBuffer {
            topic: topic.into(),
            partition,
            start_offset: UNSET_OFFSET,
            content: String::new(),
            record_count: 0,
        }
    }

    /// Append one formatted line
    ///
    /// Offsets are taken as given: no contiguity or ordering check.
    pub fn append(&mut self, offset: i64, line: &str) {
        if self.record_count == 0 {
            self.start_offset = offset;
        }
        self.content.push_str(line);
        self.content.push('\n');
        self.record_count += 1;
    }

    /// Reset to the empty state; the buffer object is reused
    pub fn clear(&mut self) {
        self.content.clear();
        self.record_count = 0;
        self.start_offset = UNSET_OFFSET;
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Offset of the first record since creation or the last clear
    pub fn start_offset(&self) -> i64 {
        self.start_offset
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn key(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}

/// Last successful flush time per key, in milliseconds
#[derive(Debug, Clone, Default)]
pub struct LastFlushTimes {
    times: HashMap<TopicPartition, u64>,
}

impl LastFlushTimes {
    pub fn get(&self, key: &TopicPartition) -> Option<u64> {
        self.times.get(key).copied()
    }

    /// Record `now_ms` only if the key has never been seen
    pub fn seed(&mut self, key: &TopicPartition, now_ms: u64) {
        self.times.entry(key.clone()).or_insert(now_ms);
    }

    /// Record a successful flush
    pub fn record(&mut self, key: &TopicPartition, now_ms: u64) {
        self.times.insert(key.clone(), now_ms);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn clear(&mut self) {
        self.times.clear();
    }
}

/// Buffers and last-flush times for every key a task has seen
///
/// Keys are kept ordered so sweeps and drains run in a stable order.
#[derive(Debug, Default)]
pub struct BufferRegistry {
    buffers: BTreeMap<TopicPartition, PartitionBuffer>,
    last_flush: LastFlushTimes,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the buffer for a key, creating it lazily
    ///
    /// A new key's last-flush time is seeded to `now_ms` so it is not
    /// immediately eligible for a time-based flush.
    pub fn get_or_create(&mut self, key: &TopicPartition, now_ms: u64) -> &mut PartitionBuffer {
        if !self.buffers.contains_key(key) {
            self.last_flush.seed(key, now_ms);
        }
        self.buffers
            .entry(key.clone())
            .or_insert_with(|| PartitionBuffer::new(key.topic.clone(), key.partition))
    }

    pub fn get(&self, key: &TopicPartition) -> Option<&PartitionBuffer> {
        self.buffers.get(key)
    }

    /// Split borrow of one buffer and the last-flush table, for a flush call
    pub fn flush_parts(
        &mut self,
        key: &TopicPartition,
    ) -> Option<(&mut PartitionBuffer, &mut LastFlushTimes)> {
        let last_flush = &mut self.last_flush;
        self.buffers.get_mut(key).map(|buf| (buf, last_flush))
    }

    pub fn last_flush(&self) -> &LastFlushTimes {
        &self.last_flush
    }

    pub fn keys(&self) -> Vec<TopicPartition> {
        self.buffers.keys().cloned().collect()
    }

    /// Keys whose buffer currently holds records
    pub fn non_empty_keys(&self) -> Vec<TopicPartition> {
        self.buffers
            .iter()
            .filter(|(_, buf)| !buf.is_empty())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Total records buffered across all keys
    pub fn buffered_records(&self) -> usize {
        self.buffers.values().map(|b| b.record_count()).sum()
    }

    /// Drop every buffer and timestamp
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.last_flush.clear();
    }
}
