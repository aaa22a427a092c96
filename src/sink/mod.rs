//! Partitioned Blob Sink
//!
//! Buffers records per topic-partition and publishes each buffer as one
//! immutable object in a hierarchical blob store (Azure Data Lake Gen2 in
//! production, local filesystem or memory otherwise).
//!
//! ## Architecture
//!
//! ```text
//! SinkRecord → format → PartitionBuffer → FlushExecutor → BlobStore
//!                            ↑                  ↓
//!                       FlushPolicy       {base}/date=YYYYMMDD/{topic}-p{n}-o{offset}.log[.gz]
//!                     (size / age)
//! ```
//!
//! ## Key Features
//!
//! - **Deterministic keys**: a retried flush rewrites the same object
//! - **Loss-free failures**: a failed flush leaves its buffer untouched
//! - **Auth classification**: 401/403 or `AuthenticationFailed` anywhere in
//!   the cause chain halts the task; everything else is retriable
//! - **Drain on stop**: every non-empty buffer is published at shutdown

pub mod record;
pub mod formatter;
pub mod error;
pub mod classifier;
pub mod buffer;
pub mod policy;
pub mod clock;
pub mod blob_store;
pub mod executor;
pub mod config;
pub mod task;
#[cfg(feature = "azure")]
pub mod azure_store;

pub use record::{Field, Schema, SchemaType, SinkRecord, Struct, Value};
pub use formatter::{format_record, to_json};
pub use error::{FlushError, SinkError, UploadError};
pub use classifier::{classify, ErrorClass};
pub use buffer::{BufferRegistry, LastFlushTimes, PartitionBuffer, TopicPartition, UNSET_OFFSET};
pub use policy::FlushPolicy;
pub use clock::{ProductionClock, SimulatedClock, SinkClock, Timestamp};
pub use blob_store::{
    BlobStore, InMemoryBlobStore, LocalFsBlobStore, PublishedObject, StoreStats, WriteStep,
};
pub use executor::{DestinationKey, FlushExecutor, FlushReceipt};
pub use config::{ConfigError, SecretString, SinkConfig, StoreType};
pub use task::{FlushTrigger, SinkStats, SinkTask};
#[cfg(feature = "azure")]
pub use azure_store::AzureBlobStore;

use config::LOCAL_PATH_CONFIG;
use std::sync::Arc;

/// Build the store selected by `config.store_type`
pub fn build_store(config: &SinkConfig) -> Result<Arc<dyn BlobStore>, SinkError> {
    match config.store_type {
        StoreType::InMemory => Ok(Arc::new(InMemoryBlobStore::new())),
        StoreType::LocalFs => {
            let path = config
                .local_path
                .clone()
                .ok_or_else(|| SinkError::Config(ConfigError::Missing(LOCAL_PATH_CONFIG)))?;
            Ok(Arc::new(LocalFsBlobStore::new(path)))
        }
        #[cfg(feature = "azure")]
        StoreType::Azure => {
            let store = AzureBlobStore::new(config).map_err(SinkError::Store)?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "azure"))]
        StoreType::Azure => Err(SinkError::Unsupported(
            "azure store requires building with the `azure` feature",
        )),
    }
}
