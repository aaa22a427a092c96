//! Sink Task
//!
//! Per-batch entry point driven by the host framework:
//!
//! ```text
//! put(batch):  sweep aged buffers → for each record: format → append → [size flush]
//! stop():      flush every non-empty buffer → drop registry
//! ```
//!
//! Batches are processed strictly one at a time by a single owner; the task
//! holds no locks. A fatal authentication failure halts the task for good.

use crate::sink::blob_store::BlobStore;
use crate::sink::buffer::{BufferRegistry, TopicPartition};
use crate::sink::clock::{ProductionClock, SinkClock};
use crate::sink::config::SinkConfig;
use crate::sink::error::{FlushError, SinkError};
use crate::sink::executor::{FlushExecutor, FlushReceipt};
use crate::sink::formatter::format_record;
use crate::sink::policy::FlushPolicy;
use crate::sink::record::SinkRecord;
use std::sync::Arc;
use tracing::{debug, info};

/// What caused a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Time,
    Shutdown,
}

/// Counters for one task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub records_received: u64,
    pub size_flushes: u64,
    pub time_flushes: u64,
    pub shutdown_flushes: u64,
    pub records_flushed: u64,
    pub bytes_uploaded: u64,
    pub retriable_failures: u64,
    pub fatal_failures: u64,
}

impl SinkStats {
    pub fn total_flushes(&self) -> u64 {
        self.size_flushes + self.time_flushes + self.shutdown_flushes
    }
}

/// Buffers records per topic-partition and publishes them as objects
pub struct SinkTask<C: SinkClock = ProductionClock> {
    registry: BufferRegistry,
    policy: FlushPolicy,
    executor: FlushExecutor<C>,
    clock: C,
    stats: SinkStats,
    halted: Option<String>,
}

impl SinkTask<ProductionClock> {
    /// Start a task on wall-clock time
    pub fn start(config: &SinkConfig, store: Arc<dyn BlobStore>) -> Self {
        Self::with_clock(config, store, ProductionClock::new())
    }

    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

impl<C: SinkClock> SinkTask<C> {
    pub fn with_clock(config: &SinkConfig, store: Arc<dyn BlobStore>, clock: C) -> Self {
        info!(
            account = %config.account_name,
            filesystem = %config.filesystem,
            store = ?config.store_type,
            base_path = %config.base_path,
            flush_max_records = config.flush_max_records,
            compress_gzip = config.compress_gzip,
            retry_max_attempts = config.retry_max_attempts,
            flush_interval_ms = config.flush_interval_ms,
            "sink task started"
        );

        SinkTask {
            registry: BufferRegistry::new(),
            policy: FlushPolicy::new(config.flush_max_records, config.flush_interval()),
            executor: FlushExecutor::new(
                store,
                config.base_path.clone(),
                config.compress_gzip,
                clock.clone(),
            ),
            clock,
            stats: SinkStats::default(),
            halted: None,
        }
    }

    /// Process one batch
    ///
    /// Aged buffers are flushed before any record of this batch is appended,
    /// all judged against a single `now` read at entry. An empty batch still
    /// runs the age check, so idle partitions are flushed on schedule.
    pub async fn put(&mut self, records: Vec<SinkRecord>) -> Result<(), SinkError> {
        self.ensure_running()?;
        let now_ms = self.clock.now().as_millis();
        self.sweep_aged(now_ms).await?;

        for record in records {
            let key = TopicPartition::new(record.topic.as_str(), record.partition);
            let line = format_record(&record);
            self.stats.records_received += 1;

            let buffer = self.registry.get_or_create(&key, now_ms);
            buffer.append(record.offset, &line);
            let full = self.policy.should_flush_on_size(buffer);
            debug!(key = %key, offset = record.offset, records = buffer.record_count(), "appended");

            if full {
                self.flush_key(&key, FlushTrigger::Size).await?;
            }
        }
        Ok(())
    }

    /// Flush everything and drop all buffers
    ///
    /// Stops at the first failure and returns it; buffers stay registered
    /// in that case so nothing is lost.
    pub async fn stop(&mut self) -> Result<(), SinkError> {
        self.ensure_running()?;
        info!(
            buffers = self.registry.len(),
            records = self.registry.buffered_records(),
            "flushing remaining buffers before shutdown"
        );

        for key in self.registry.non_empty_keys() {
            self.flush_key(&key, FlushTrigger::Shutdown).await?;
        }
        self.registry.clear();
        Ok(())
    }

    /// Flush buffers already at the size limit
    ///
    /// Only buffers left full by an earlier failed size flush qualify.
    pub async fn flush_full(&mut self) -> Result<(), SinkError> {
        self.ensure_running()?;
        for key in self.registry.non_empty_keys() {
            let full = self
                .registry
                .get(&key)
                .map(|buf| self.policy.should_flush_on_size(buf))
                .unwrap_or(false);
            if full {
                self.flush_key(&key, FlushTrigger::Size).await?;
            }
        }
        Ok(())
    }

    async fn sweep_aged(&mut self, now_ms: u64) -> Result<(), SinkError> {
        if !self.policy.time_based_enabled() {
            return Ok(());
        }
        for key in self.registry.non_empty_keys() {
            if self
                .policy
                .should_flush_on_time(&key, now_ms, self.registry.last_flush())
            {
                self.flush_key(&key, FlushTrigger::Time).await?;
            }
        }
        Ok(())
    }

    async fn flush_key(
        &mut self,
        key: &TopicPartition,
        trigger: FlushTrigger,
    ) -> Result<Option<FlushReceipt>, SinkError> {
        let (buffer, last_flush) = match self.registry.flush_parts(key) {
            Some(parts) => parts,
            None => return Ok(None),
        };

        match self.executor.flush(buffer, last_flush).await {
            Ok(Some(receipt)) => {
                debug!(key = %key, trigger = ?trigger, object = %receipt.key, "flushed");
                self.record_flush(trigger, &receipt);
                Ok(Some(receipt))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                if let FlushError::FatalAuth { .. } = e {
                    self.stats.fatal_failures += 1;
                    self.halted = Some(e.to_string());
                } else {
                    self.stats.retriable_failures += 1;
                }
                Err(e.into())
            }
        }
    }

    fn record_flush(&mut self, trigger: FlushTrigger, receipt: &FlushReceipt) {
        match trigger {
            FlushTrigger::Size => self.stats.size_flushes += 1,
            FlushTrigger::Time => self.stats.time_flushes += 1,
            FlushTrigger::Shutdown => self.stats.shutdown_flushes += 1,
        }
        self.stats.records_flushed += receipt.records as u64;
        self.stats.bytes_uploaded += receipt.bytes as u64;
    }

    fn ensure_running(&self) -> Result<(), SinkError> {
        match &self.halted {
            Some(reason) => Err(SinkError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }
}
