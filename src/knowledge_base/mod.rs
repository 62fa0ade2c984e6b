//! Offline loader that turns stored task spreadsheets into search documents.
//!
//! A run reads the highest id in the index once, numbers every new row after it, and
//! uploads the result. Re-running over the same files appends duplicates under new ids,
//! and two concurrent runs can hand out the same ids; neither case is guarded against.

pub mod coerce;
pub mod fake;

use crate::{
    metrics::PipelineMetrics,
    search::{SearchDocument, SearchError, SearchIndexClient, UploadSummary, default_index_schema},
    spreadsheet::{self, SpreadsheetError},
    storage::{ObjectStore, StorageError, store_from_config},
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub use coerce::document_from_row;
pub use fake::{FakeDataGenerator, IssueTally};

/// Sheets tried, in order, when reading a workbook.
pub const SHEET_CANDIDATES: [&str; 2] = ["Tasks", "Sheet1"];

/// Content type used when uploading workbooks.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Errors that abort a knowledge-base run.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Object storage failed.
    #[error("Storage request failed: {0}")]
    Storage(#[from] StorageError),
    /// Search index request failed.
    #[error("Search request failed: {0}")]
    Search(#[from] SearchError),
    /// Workbook conversion failed.
    #[error("Spreadsheet conversion failed: {0}")]
    Spreadsheet(#[from] SpreadsheetError),
    /// Index schema file was not valid JSON.
    #[error("Malformed index schema: {0}")]
    MalformedSchema(#[source] serde_json::Error),
    /// Local filesystem access failed.
    #[error("Filesystem error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Whether a run rebuilds the index first.
#[derive(Debug, Clone, Default)]
pub enum IndexSetup {
    /// Append to the existing index.
    #[default]
    Keep,
    /// Delete and create the index, from `schema` or the built-in definition.
    Recreate {
        /// Optional JSON index definition.
        schema: Option<PathBuf>,
    },
}

/// Source file that contributed no documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    /// Object name.
    pub name: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Summary of one loader run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Files that produced rows.
    pub files_processed: usize,
    /// Files that produced nothing.
    pub skipped: Vec<SkippedFile>,
    /// Documents built from all files.
    pub documents: usize,
    /// First id assigned in this run.
    pub first_id: u64,
    /// Last id assigned, when any document was built.
    pub last_id: Option<u64>,
    /// Upload outcome.
    pub upload: UploadSummary,
}

/// Rows extracted from one stored object.
#[derive(Debug, Clone, PartialEq)]
pub enum BlobRows {
    /// Header-keyed rows.
    Rows(Vec<Map<String, Value>>),
    /// Nothing usable, with the reason.
    Skipped(String),
}

/// Extract rows from an object based on its extension.
///
/// `.xlsx` files use the first of [`SHEET_CANDIDATES`] present; `.json` files must hold an
/// array of objects. Anything else is skipped.
pub fn rows_from_blob(name: &str, bytes: &[u8]) -> BlobRows {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".xlsx") {
        match spreadsheet::read_first_matching_sheet(bytes, &SHEET_CANDIDATES) {
            Ok(Some(sheet)) => {
                tracing::debug!(name, sheet = %sheet.name, rows = sheet.rows.len(), "Read workbook");
                BlobRows::Rows(sheet.rows)
            }
            Ok(None) => BlobRows::Skipped(format!(
                "no valid sheet ({}) found",
                SHEET_CANDIDATES.join(" or ")
            )),
            Err(error) => BlobRows::Skipped(error.to_string()),
        }
    } else if lower.ends_with(".json") {
        match serde_json::from_slice::<Vec<Map<String, Value>>>(bytes) {
            Ok(rows) => BlobRows::Rows(rows),
            Err(error) => BlobRows::Skipped(format!("expected an array of task objects: {error}")),
        }
    } else {
        BlobRows::Skipped("unsupported file type".into())
    }
}

/// Loads every supported object of a container into the search index.
pub struct KnowledgeBaseLoader {
    store: Arc<dyn ObjectStore>,
    search: SearchIndexClient,
    metrics: Arc<PipelineMetrics>,
}

impl KnowledgeBaseLoader {
    /// Create a loader reading from `store` and writing to `search`.
    pub fn new(store: Arc<dyn ObjectStore>, search: SearchIndexClient) -> Self {
        Self {
            store,
            search,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Report uploads into an existing metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Build a loader over the knowledge-base container from configuration.
    pub fn from_config(config: &crate::config::Config) -> Result<Self, LoaderError> {
        Ok(Self::new(
            store_from_config(config, &config.knowledge_base_container)?,
            SearchIndexClient::from_config(config)?,
        ))
    }

    /// Delete the index and create it again.
    pub async fn rebuild_index(&self, schema: Option<&Path>) -> Result<(), LoaderError> {
        let definition = match schema {
            Some(path) => {
                let raw = tokio::fs::read(path).await.map_err(|source| LoaderError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                serde_json::from_slice::<Value>(&raw).map_err(LoaderError::MalformedSchema)?
            }
            None => default_index_schema(self.search.index_name()),
        };
        self.search.delete_index().await?;
        self.search.create_index(&definition).await?;
        Ok(())
    }

    /// Run the load. Failing to read the current maximum id aborts before any upload.
    pub async fn run(&self, setup: IndexSetup) -> Result<LoadReport, LoaderError> {
        if let IndexSetup::Recreate { schema } = &setup {
            self.rebuild_index(schema.as_deref()).await?;
        }

        let first_id = self
            .search
            .max_document_id()
            .await?
            .map_or(1, |max| max + 1);
        tracing::info!(first_id, index = self.search.index_name(), "Starting knowledge-base load");

        let mut report = LoadReport {
            first_id,
            ..LoadReport::default()
        };
        let mut next_id = first_id;
        let mut documents: Vec<SearchDocument> = Vec::new();

        for name in self.store.list().await? {
            let lower = name.to_ascii_lowercase();
            if !lower.ends_with(".xlsx") && !lower.ends_with(".json") {
                tracing::debug!(name = %name, "Ignoring unsupported object");
                continue;
            }
            tracing::info!(name = %name, "Processing knowledge-base file");
            let bytes = self.store.download(&name).await?;
            match rows_from_blob(&name, &bytes) {
                BlobRows::Rows(rows) if !rows.is_empty() => {
                    report.files_processed += 1;
                    for row in &rows {
                        documents.push(document_from_row(next_id, row));
                        next_id += 1;
                    }
                }
                BlobRows::Rows(_) => report.skipped.push(SkippedFile {
                    name,
                    reason: "no rows".into(),
                }),
                BlobRows::Skipped(reason) => {
                    tracing::warn!(name = %name, reason = %reason, "Skipping file");
                    report.skipped.push(SkippedFile { name, reason });
                }
            }
        }

        report.documents = documents.len();
        report.last_id = (!documents.is_empty()).then(|| next_id - 1);
        if documents.is_empty() {
            tracing::info!("No knowledge-base rows to upload");
            return Ok(report);
        }

        report.upload = self.search.upload_documents(&documents).await?;
        self.metrics.record_uploaded(report.upload.uploaded as u64);
        tracing::info!(
            uploaded = report.upload.uploaded,
            failed = report.upload.failed,
            batches = report.upload.batches,
            "Knowledge-base load finished"
        );
        Ok(report)
    }
}
