//! Flush Executor
//!
//! Publishes one buffer as one immutable object:
//!
//! ```text
//! buffer → UTF-8 bytes → [gzip] → create / append@0 / commit → clear
//! ```
//!
//! On failure the buffer is left exactly as it was, so the retry publishes
//! the same bytes under the same key.

use crate::sink::blob_store::BlobStore;
use crate::sink::buffer::{LastFlushTimes, PartitionBuffer};
use crate::sink::classifier::{classify, ErrorClass};
use crate::sink::clock::SinkClock;
use crate::sink::error::{FlushError, UploadError};
use bytes::Bytes;
use chrono::NaiveDate;
use flate2::write::GzEncoder;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

const EXTENSION_PLAIN: &str = ".log";
const EXTENSION_GZIP: &str = ".log.gz";

/// Object key of a flushed buffer
///
/// `{base_path}/date={YYYYMMDD}/{topic}-p{partition}-o{start_offset}.log[.gz]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationKey {
    pub base_path: String,
    pub date: NaiveDate,
    pub topic: String,
    pub partition: i32,
    pub start_offset: i64,
    pub compressed: bool,
}

impl DestinationKey {
    pub fn for_buffer(
        base_path: &str,
        date: NaiveDate,
        buffer: &PartitionBuffer,
        compressed: bool,
    ) -> Self {
        DestinationKey {
            base_path: base_path.to_string(),
            date,
            topic: buffer.topic().to_string(),
            partition: buffer.partition(),
            start_offset: buffer.start_offset(),
            compressed,
        }
    }

    pub fn extension(&self) -> &'static str {
        if self.compressed {
            EXTENSION_GZIP
        } else {
            EXTENSION_PLAIN
        }
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/date={}/{}-p{}-o{}{}",
            self.base_path,
            self.date.format("%Y%m%d"),
            self.topic,
            self.partition,
            self.start_offset,
            self.extension()
        )
    }
}

/// Summary of a successful flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReceipt {
    pub key: String,
    pub start_offset: i64,
    pub records: usize,
    pub bytes: usize,
}

/// Serializes, compresses and uploads buffers
pub struct FlushExecutor<C: SinkClock> {
    store: Arc<dyn BlobStore>,
    base_path: String,
    compress_gzip: bool,
    clock: C,
}

impl<C: SinkClock> FlushExecutor<C> {
    pub fn new(store: Arc<dyn BlobStore>, base_path: String, compress_gzip: bool, clock: C) -> Self {
        FlushExecutor {
            store,
            base_path,
            compress_gzip,
            clock,
        }
    }

    /// Key the buffer would be written to if flushed now
    pub fn destination_key(&self, buffer: &PartitionBuffer) -> DestinationKey {
        DestinationKey::for_buffer(&self.base_path, self.clock.today(), buffer, self.compress_gzip)
    }

    /// Bytes the buffer would be written as
    pub fn encode(&self, buffer: &PartitionBuffer) -> Result<Bytes, UploadError> {
        let raw = buffer.content().as_bytes();
        if !self.compress_gzip {
            return Ok(Bytes::copy_from_slice(raw));
        }
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), flate2::Compression::default());
        encoder.write_all(raw)?;
        Ok(Bytes::from(encoder.finish()?))
    }

    /// Flush one buffer
    ///
    /// Returns `Ok(None)` without touching the store when the buffer is
    /// empty. On success the buffer is cleared and the key's last-flush time
    /// set to now; on failure neither is modified.
    pub async fn flush(
        &self,
        buffer: &mut PartitionBuffer,
        last_flush: &mut LastFlushTimes,
    ) -> Result<Option<FlushReceipt>, FlushError> {
        if buffer.is_empty() {
            return Ok(None);
        }

        let key = self.destination_key(buffer).to_string();
        let result = match self.encode(buffer) {
            Ok(payload) => {
                info!(
                    "Writing {} records ({} bytes) to {}",
                    buffer.record_count(),
                    payload.len(),
                    key
                );
                self.publish(&key, &payload).await.map(|()| payload.len())
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                let receipt = FlushReceipt {
                    key,
                    start_offset: buffer.start_offset(),
                    records: buffer.record_count(),
                    bytes,
                };
                let tp = buffer.key();
                buffer.clear();
                last_flush.record(&tp, self.clock.now().as_millis());
                Ok(Some(receipt))
            }
            Err(source) => match classify(&source) {
                ErrorClass::FatalAuth => {
                    error!(key = %key, error = %source, "authentication failure, task cannot continue");
                    Err(FlushError::FatalAuth { key, source })
                }
                ErrorClass::Retriable => {
                    warn!(key = %key, error = %source, "transient upload failure, will retry");
                    Err(FlushError::Retriable { key, source })
                }
            },
        }
    }

    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), UploadError> {
        self.store.create_or_truncate(key).await?;
        self.store.append_at(key, payload, 0).await?;
        self.store.commit(key, payload.len() as u64).await
    }
}
