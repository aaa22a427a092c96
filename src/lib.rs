pub mod observability;
pub mod sink;

pub use sink::{
    BlobStore, FlushError, SinkConfig, SinkError, SinkRecord, SinkTask, StoreType, UploadError,
};
