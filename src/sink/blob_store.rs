//! Blob Store Abstraction
//!
//! The sink publishes each flush with three calls: create (or truncate) the
//! destination object, append the payload at offset 0, then commit the final
//! length. Backends only move bytes; retry and timeout behavior belongs to
//! the backend's own transport.
//!
//! Implementations:
//! - `InMemoryBlobStore`: For unit tests, with scripted fault injection
//! - `LocalFsBlobStore`: For development and local testing
//! - `AzureBlobStore`: For production (feature `azure`)

use crate::sink::error::UploadError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// Write-sequence primitives of a remote object store
pub trait BlobStore: Send + Sync + 'static {
    /// Create the object, truncating it if it already exists
    fn create_or_truncate<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>>;

    /// Write `data` at byte position `offset` of an uncommitted object
    fn append_at<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        offset: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>>;

    /// Make the first `length` bytes durable and visible
    fn commit<'a>(
        &'a self,
        key: &'a str,
        length: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>>;
}

// ============================================================================
// InMemoryBlobStore - For tests
// ============================================================================

/// Step of the write sequence, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    Create,
    Append,
    Commit,
}

/// Write statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub creates: u64,
    pub appends: u64,
    pub commits: u64,
    pub bytes_committed: u64,
    pub injected_failures: u64,
}

/// A committed object, in publish order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedObject {
    pub key: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    staged: HashMap<String, Vec<u8>>,
    committed: HashMap<String, Vec<u8>>,
    published: Vec<PublishedObject>,
    faults: VecDeque<(WriteStep, UploadError)>,
    stats: StoreStats,
}

impl InMemoryState {
    /// Pop the next scripted fault if it targets `step`
    fn take_fault(&mut self, step: WriteStep) -> Result<(), UploadError> {
        if matches!(self.faults.front(), Some((target, _)) if *target == step) {
            if let Some((_, err)) = self.faults.pop_front() {
                self.stats.injected_failures += 1;
                return Err(err);
            }
        }
        Ok(())
    }
}

/// In-memory blob store for unit tests
///
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `step` with `err`
    ///
    /// Faults queue up and fire in order; a fault only fires once the
    /// write sequence reaches its step.
    pub fn inject_fault(&self, step: WriteStep, err: UploadError) {
        self.state.lock().faults.push_back((step, err));
    }

    /// Committed contents of an object
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().committed.get(key).cloned()
    }

    /// Bytes written to an object that has not been committed
    pub fn staged(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().staged.get(key).cloned()
    }

    /// Committed keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().committed.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Every successful commit, including overwrites of the same key
    pub fn published(&self) -> Vec<PublishedObject> {
        self.state.lock().published.clone()
    }

    pub fn stats(&self) -> StoreStats {
        self.state.lock().stats.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().committed.is_empty()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn create_or_truncate<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.take_fault(WriteStep::Create)?;
            state.stats.creates += 1;
            state.staged.insert(key.to_string(), Vec::new());
            Ok(())
        })
    }

    fn append_at<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        offset: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.take_fault(WriteStep::Append)?;
            let staged = state.staged.get_mut(key).ok_or_else(|| {
                UploadError::new(format!("append to uncreated object: {}", key)).with_status(404)
            })?;
            if staged.len() as u64 != offset {
                return Err(UploadError::new(format!(
                    "append at {} but object {} has {} bytes",
                    offset,
                    key,
                    staged.len()
                ))
                .with_status(400)
                .with_error_code("InvalidAppendPosition"));
            }
            staged.extend_from_slice(data);
            state.stats.appends += 1;
            Ok(())
        })
    }

    fn commit<'a>(
        &'a self,
        key: &'a str,
        length: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.take_fault(WriteStep::Commit)?;
            let staged_len = match state.staged.get(key) {
                Some(data) => data.len() as u64,
                None => {
                    return Err(UploadError::new(format!("commit of uncreated object: {}", key))
                        .with_status(404))
                }
            };
            if staged_len != length {
                return Err(UploadError::new(format!(
                    "commit at {} but object {} has {} bytes",
                    length, key, staged_len
                ))
                .with_status(400)
                .with_error_code("InvalidFlushPosition"));
            }

            let data = state.staged.remove(key).unwrap_or_default();
            state.stats.commits += 1;
            state.stats.bytes_committed += length;
            state.published.push(PublishedObject {
                key: key.to_string(),
                data: data.clone(),
            });
            state.committed.insert(key.to_string(), data);
            Ok(())
        })
    }
}

// ============================================================================
// LocalFsBlobStore - For development
// ============================================================================

/// Local filesystem blob store; keys are paths relative to `base_path`
#[derive(Debug, Clone)]
pub struct LocalFsBlobStore {
    base_path: PathBuf,
}

impl LocalFsBlobStore {
    pub fn new(base_path: PathBuf) -> Self {
        LocalFsBlobStore { base_path }
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Read an object back (for testing and inspection)
    pub async fn read(&self, key: &str) -> Result<Vec<u8>, UploadError> {
        Ok(tokio::fs::read(self.full_path(key)).await?)
    }
}

impl BlobStore for LocalFsBlobStore {
    fn create_or_truncate<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::File::create(&path).await?;
            Ok(())
        })
    }

    fn append_at<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        offset: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>> {
        Box::pin(async move {
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .open(self.full_path(key))
                .await?;
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            file.write_all(data).await?;
            file.flush().await?;
            Ok(())
        })
    }

    fn commit<'a>(
        &'a self,
        key: &'a str,
        length: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>> {
        Box::pin(async move {
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .open(self.full_path(key))
                .await?;
            let written = file.metadata().await?.len();
            if written < length {
                return Err(UploadError::new(format!(
                    "commit at {} but object {} has {} bytes",
                    length, key, written
                ))
                .with_status(400)
                .with_error_code("InvalidFlushPosition"));
            }
            file.set_len(length).await?;
            file.sync_all().await?;
            Ok(())
        })
    }
}
