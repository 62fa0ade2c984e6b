//! Text extraction through the hosted document-analysis service.
//!
//! Analysis is asynchronous on the service side: a submission answers `202 Accepted` with an
//! `Operation-Location` header, and the operation is polled until it reaches `succeeded` or
//! `failed`. The poll loop is bounded by [`PollPolicy`] so a stuck operation ends in
//! [`AnalysisOutcome::TimedOut`] instead of blocking the caller forever.

mod poll;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

pub use poll::{OperationStatusSource, poll_until_terminal};

const ANALYZE_PATH: &str = "formrecognizer/documentModels/prebuilt-read:analyze";
const ANALYZE_API_VERSION: &str = "2023-07-31";
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Transport-level failures while talking to the analysis service.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Accepted submission did not carry an `Operation-Location` header.
    #[error("Analysis accepted without an Operation-Location header")]
    MissingOperationLocation,
    /// Poll response could not be decoded.
    #[error("Malformed analysis status: {0}")]
    InvalidResponse(String),
}

/// Document handed to the analysis service.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Publicly retrievable URL.
    Url(String),
    /// Raw document bytes.
    Bytes(Vec<u8>),
}

/// Bounds for the status poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Delay between two polls.
    pub interval: Duration,
    /// Maximum number of polls before giving up.
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_polls: 300,
        }
    }
}

/// Status reported by an analysis operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationStatus {
    /// Queued, not yet started.
    NotStarted,
    /// In progress.
    Running,
    /// Terminal success.
    Succeeded,
    /// Terminal failure.
    Failed,
    /// Any status this client does not know; treated as non-terminal.
    #[serde(other)]
    Unknown,
}

impl OperationStatus {
    /// Whether polling can stop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One decoded poll response.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeOperation {
    /// Current status.
    pub status: OperationStatus,
    /// Result payload, present once the operation succeeded.
    #[serde(default, rename = "analyzeResult")]
    pub analyze_result: Option<AnalyzeResult>,
    /// Service-side error details for failed operations.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Subset of the analysis result this pipeline consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResult {
    /// Plain text of the whole document.
    #[serde(default)]
    pub content: Option<String>,
}

/// Tagged outcome of one extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Text was extracted.
    Succeeded(String),
    /// The operation succeeded without a `content` field.
    NoContent,
    /// The operation reached the `failed` state.
    Failed {
        /// Error details reported by the service, if any.
        detail: Option<String>,
    },
    /// The submission was not accepted.
    Rejected {
        /// Status returned instead of `202 Accepted`.
        status: StatusCode,
        /// Body of the rejection.
        body: String,
    },
    /// The operation did not finish within the poll bound.
    TimedOut {
        /// Number of polls issued.
        polls: u32,
    },
}

impl AnalysisOutcome {
    /// Extracted text, when the outcome carries any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Succeeded(text) => Some(text),
            _ => None,
        }
    }

    /// Human-readable reason why no text is available.
    pub fn describe(&self) -> String {
        match self {
            Self::Succeeded(_) => "analysis succeeded".into(),
            Self::NoContent => "No content found in the analysis response.".into(),
            Self::Failed { detail } => format!(
                "Document analysis failed: {}",
                detail.as_deref().unwrap_or("no details")
            ),
            Self::Rejected { status, body } => {
                format!("Error in initiating analysis ({status}): {body}")
            }
            Self::TimedOut { polls } => {
                format!("Document analysis did not finish after {polls} polls")
            }
        }
    }
}

/// HTTP client for the prebuilt read model.
pub struct DocumentAnalysisClient {
    pub(crate) client: Client,
    pub(crate) endpoint: String,
    pub(crate) api_key: String,
}

impl DocumentAnalysisClient {
    /// Create a client for the given service endpoint.
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, AnalysisError> {
        let client = Client::builder().user_agent("rusty-estimator/0.2").build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build a client from the global configuration.
    pub fn from_config(config: &crate::config::Config) -> Result<Self, AnalysisError> {
        Self::new(&config.doc_intel_endpoint, &config.doc_intel_api_key)
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/{ANALYZE_PATH}?api-version={ANALYZE_API_VERSION}",
            self.endpoint
        )
    }

    /// Submit a document and return the operation URL to poll, or the rejection outcome.
    pub async fn submit(
        &self,
        source: &DocumentSource,
    ) -> Result<Result<String, AnalysisOutcome>, AnalysisError> {
        let request = self
            .client
            .post(self.analyze_url())
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key);
        let request = match source {
            DocumentSource::Url(url) => request.json(&json!({ "urlSource": url })),
            DocumentSource::Bytes(bytes) => request
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes.clone()),
        };

        let response = request.send().await?;
        if response.status() != StatusCode::ACCEPTED {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "Error in initiating analysis");
            return Ok(Err(AnalysisOutcome::Rejected { status, body }));
        }

        let location = response
            .headers()
            .get("operation-location")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(AnalysisError::MissingOperationLocation)?;
        tracing::debug!(operation = %location, "Analysis accepted");
        Ok(Ok(location))
    }

    /// Submit a document and poll until the operation is terminal or the policy is exhausted.
    pub async fn extract_text(
        &self,
        source: &DocumentSource,
        policy: PollPolicy,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let location = match self.submit(source).await? {
            Ok(location) => location,
            Err(rejected) => return Ok(rejected),
        };
        let outcome = poll_until_terminal(self, &location, policy).await?;
        if outcome.text().is_none() {
            tracing::warn!(reason = %outcome.describe(), "No text extracted");
        }
        Ok(outcome)
    }
}

#[async_trait]
impl OperationStatusSource for DocumentAnalysisClient {
    async fn fetch_status(&self, location: &str) -> Result<AnalyzeOperation, AnalysisError> {
        let response = self
            .client
            .get(location)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| {
            AnalysisError::InvalidResponse(format!("{status}: {err}: {body}"))
        })
    }
}
