//! Shared types used by the search index client.

use crate::sanitize::{de_f64, de_i64, de_issues, de_string, join_issues};
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors returned while interacting with the search index.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Endpoint failed to parse or normalize.
    #[error("Invalid search endpoint: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The service responded with an unexpected status code.
    #[error("Unexpected search response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// An existing document id could not be read as an integer.
    #[error("Document id {0:?} is not an integer")]
    InvalidDocumentId(String),
    /// A document could not be encoded as an indexing action.
    #[error("Failed to encode document {id}: {source}")]
    Encode {
        /// Key of the document being encoded.
        id: String,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

/// Numeric mirror of `id`; the key is a string and sorts as text, so ordering uses this.
pub const ID_NUMBER_FIELD: &str = "IdNumber";

fn de_issue_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    de_issues(deserializer).map(|issues| join_issues(&issues))
}

/// Flat, type-coerced task record as stored in the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Sequential identifier rendered as a string key.
    #[serde(default, deserialize_with = "de_string")]
    pub id: String,
    /// The same identifier as a number, used for ordering.
    #[serde(rename = "IdNumber", default, deserialize_with = "de_i64")]
    pub id_number: i64,
    /// Task description.
    #[serde(rename = "Task", default, deserialize_with = "de_string")]
    pub task: String,
    /// MSCW tier label.
    #[serde(rename = "MSCW", default, deserialize_with = "de_string")]
    pub mscw: String,
    /// Project area.
    #[serde(rename = "Area", default, deserialize_with = "de_string")]
    pub area: String,
    /// Engineering module.
    #[serde(rename = "Module", default, deserialize_with = "de_string")]
    pub module: String,
    /// Feature category.
    #[serde(rename = "Feature", default, deserialize_with = "de_string")]
    pub feature: String,
    /// Role performing the task.
    #[serde(rename = "Profile", default, deserialize_with = "de_string")]
    pub profile: String,
    /// Minimum days.
    #[serde(rename = "MinDays", default, deserialize_with = "de_i64")]
    pub min_days: i64,
    /// Most likely days.
    #[serde(rename = "RealDays", default, deserialize_with = "de_i64")]
    pub real_days: i64,
    /// Maximum days.
    #[serde(rename = "MaxDays", default, deserialize_with = "de_i64")]
    pub max_days: i64,
    /// Contingency placeholder, kept as text.
    #[serde(rename = "Contingency", default, deserialize_with = "de_string")]
    pub contingency: String,
    /// Point estimate in days.
    #[serde(rename = "EstimatedDays", default, deserialize_with = "de_i64")]
    pub estimated_days: i64,
    /// Derived price.
    #[serde(rename = "EstimatedPrice", default, deserialize_with = "de_f64")]
    pub estimated_price: f64,
    /// Comma-separated risk notes.
    #[serde(rename = "PotentialIssues", default, deserialize_with = "de_issue_text")]
    pub potential_issues: String,
}

/// One ranked result of a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Relevance score assigned by the service.
    #[serde(rename = "@search.score", default)]
    pub score: f64,
    /// Matched document.
    #[serde(flatten)]
    pub document: SearchDocument,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdOnly {
    #[serde(default, deserialize_with = "de_string")]
    pub id: String,
    #[serde(rename = "IdNumber", default)]
    pub id_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IndexingResult {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub status: bool,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

/// Outcome of a bulk document upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    /// Documents the service accepted.
    pub uploaded: usize,
    /// Documents the service rejected.
    pub failed: usize,
    /// Requests issued.
    pub batches: usize,
}
