//! Azure Data Lake Blob Store
//!
//! Writes objects to an ADLS Gen2 filesystem through the `object_store`
//! crate, authenticated with a SAS token. Appends are staged in memory and
//! the whole payload is published with a single `put` on commit, which
//! matches the sink's one-payload-per-object write sequence.

use crate::sink::blob_store::BlobStore;
use crate::sink::config::SinkConfig;
use crate::sink::error::UploadError;
use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore as ObjectStoreTrait, RetryConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

const AUTH_FAILED_CODE: &str = "AuthenticationFailed";

/// ADLS Gen2 store for production deployments
pub struct AzureBlobStore {
    store: Arc<dyn ObjectStoreTrait>,
    staged: Mutex<HashMap<String, Vec<u8>>>,
}

impl AzureBlobStore {
    /// Build a client from the sink configuration
    ///
    /// `retry_max_attempts` becomes the transport's retry count.
    /// `endpoint` is only applied when explicitly configured.
    pub fn new(config: &SinkConfig) -> Result<Self, UploadError> {
        let retry = RetryConfig {
            max_retries: config.retry_max_attempts as usize,
            ..Default::default()
        };

        let mut builder = MicrosoftAzureBuilder::new()
            .with_account(&config.account_name)
            .with_container_name(&config.filesystem)
            .with_config(AzureConfigKey::SasKey, config.sas_token.expose())
            .with_retry(retry);

        // Without an override the builder targets the account's blob endpoint
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint.clone());
        }

        let store = builder.build().map_err(|e| map_error(&e))?;

        Ok(AzureBlobStore {
            store: Arc::new(store),
            staged: Mutex::new(HashMap::new()),
        })
    }

    /// Create from an existing object store (for testing)
    pub fn from_store(store: Arc<dyn ObjectStoreTrait>) -> Self {
        AzureBlobStore {
            store,
            staged: Mutex::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for AzureBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureBlobStore")
            .field("store", &self.store.to_string())
            .finish()
    }
}

/// Convert an `object_store` error, keeping its cause chain
///
/// The storage service's error code only surfaces in the error text, so
/// an `AuthenticationFailed` mention is lifted into the error code.
fn map_error(err: &(dyn std::error::Error + 'static)) -> UploadError {
    let mut mapped = UploadError::new(err.to_string());

    if let Some(store_err) = err.downcast_ref::<object_store::Error>() {
        let status = match store_err {
            object_store::Error::Unauthenticated { .. } => Some(401),
            object_store::Error::PermissionDenied { .. } => Some(403),
            object_store::Error::NotFound { .. } => Some(404),
            object_store::Error::AlreadyExists { .. } => Some(409),
            object_store::Error::Precondition { .. } => Some(412),
            _ => None,
        };
        if let Some(status) = status {
            mapped = mapped.with_status(status);
        }
    }
    if err.to_string().contains(AUTH_FAILED_CODE) {
        mapped = mapped.with_error_code(AUTH_FAILED_CODE);
    }
    if let Some(source) = err.source() {
        mapped = mapped.caused_by(map_error(source));
    }
    mapped
}

impl BlobStore for AzureBlobStore {
    fn create_or_truncate<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>> {
        Box::pin(async move {
            self.store
                .put(&ObjectPath::from(key), bytes::Bytes::new().into())
                .await
                .map_err(|e| map_error(&e))?;
            self.staged.lock().insert(key.to_string(), Vec::new());
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
            let mut staged = self.staged.lock();
            let buf = staged.get_mut(key).ok_or_else(|| {
                UploadError::new(format!("append to uncreated object: {}", key)).with_status(404)
            })?;
            if buf.len() as u64 != offset {
                return Err(UploadError::new(format!(
                    "append at {} but object {} has {} bytes",
                    offset,
                    key,
                    buf.len()
                ))
                .with_status(400)
                .with_error_code("InvalidAppendPosition"));
            }
            buf.extend_from_slice(data);
            Ok(())
        })
    }

    fn commit<'a>(
        &'a self,
        key: &'a str,
        length: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>> {
        Box::pin(async move {
            let payload = match self.staged.lock().get(key) {
                Some(buf) if buf.len() as u64 == length => bytes::Bytes::copy_from_slice(buf),
                Some(buf) => {
                    return Err(UploadError::new(format!(
                        "commit at {} but object {} has {} bytes",
                        length,
                        key,
                        buf.len()
                    ))
                    .with_status(400)
                    .with_error_code("InvalidFlushPosition"))
                }
                None => {
                    return Err(UploadError::new(format!("commit of uncreated object: {}", key))
                        .with_status(404))
                }
            };

            self.store
                .put(&ObjectPath::from(key), payload.into())
                .await
                .map_err(|e| map_error(&e))?;
            self.staged.lock().remove(key);
            Ok(())
        })
    }
}
