//! Hosted search index integration.

pub mod client;
pub mod types;

pub use client::{DEFAULT_TOP, MAX_BATCH_SIZE, SearchIndexClient, default_index_schema};
pub use types::{ID_NUMBER_FIELD, SearchDocument, SearchError, SearchHit, UploadSummary};
