//! Object storage for uploaded documents and knowledge-base source files.

pub mod azure;
pub mod local;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use azure::AzureBlobStore;
pub use local::LocalDirStore;

/// Content type used for uploaded project documents.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Errors returned by object stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Endpoint or object name could not be turned into a URL.
    #[error("Invalid storage URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Storage service responded with an unexpected status code.
    #[error("Unexpected storage response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Local filesystem access failed.
    #[error("Filesystem error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A blob listing response was not well-formed XML.
    #[error("Malformed blob listing: {0}")]
    MalformedListing(String),
    /// No storage backend is configured.
    #[error("No object storage configured (set AZURE_STORAGE_ACCOUNT_NAME or LOCAL_STORAGE_DIR)")]
    NotConfigured,
}

/// A named container of binary objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `name`, replacing any existing object, and return a retrievable URL.
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Names of every object in the container.
    async fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Full content of one object.
    async fn download(&self, name: &str) -> Result<Vec<u8>, StorageError>;
}

/// Build the store for `container` from configuration, preferring a local directory.
pub fn store_from_config(
    config: &crate::config::Config,
    container: &str,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    if let Some(root) = &config.local_storage_dir {
        return Ok(Arc::new(LocalDirStore::new(root.join(container))));
    }
    let endpoint = config.blob_endpoint().ok_or(StorageError::NotConfigured)?;
    Ok(Arc::new(AzureBlobStore::new(
        &endpoint,
        container,
        config.storage_sas_token.clone(),
    )?))
}
