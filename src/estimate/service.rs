//! Estimation service coordinating storage, analysis, retrieval, and synthesis.

use crate::{
    analysis::{AnalysisOutcome, DocumentAnalysisClient, DocumentSource, PollPolicy},
    completion::{AzureOpenAiClient, CompletionClient, CompletionRequest},
    config::Config,
    estimate::{
        materialize::{EstimationReport, MaterializeError, parse_estimation},
        prompt::{
            ESTIMATION_MAX_TOKENS, ESTIMATION_TEMPERATURE, EstimationPrompt, QUERY_MAX_TOKENS,
            QUERY_TEMPERATURE, estimation_prompt, query_prompt,
        },
        types::PipelineError,
    },
    metrics::{MetricsSnapshot, PipelineMetrics},
    rates::{RateSource, RateTable, rate_source_from_config},
    search::{DEFAULT_TOP, SearchHit, SearchIndexClient},
    storage::{ObjectStore, PDF_CONTENT_TYPE, store_from_config},
    vocabulary::Revision,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Collaborators the service is assembled from.
pub struct ServiceComponents {
    /// Store receiving uploaded documents.
    pub store: Arc<dyn ObjectStore>,
    /// Document-analysis client.
    pub analysis: DocumentAnalysisClient,
    /// Generative-text client shared by query formulation and synthesis.
    pub completion: Box<dyn CompletionClient>,
    /// Search index holding historical tasks.
    pub search: SearchIndexClient,
    /// Source of the authoritative rate table.
    pub rates: Box<dyn RateSource>,
    /// Bounds for the analysis poll loop.
    pub poll_policy: PollPolicy,
    /// Active EstimatedDays revision.
    pub revision: Revision,
}

/// Runs the forward pipeline: ingest, extract, formulate, retrieve, synthesize, materialize.
///
/// Each stage finishes before the next begins. A failing stage is logged, counted, and
/// returned to the caller; nothing is retried.
pub struct EstimationService {
    store: Arc<dyn ObjectStore>,
    analysis: DocumentAnalysisClient,
    completion: Box<dyn CompletionClient>,
    search: SearchIndexClient,
    rates: Box<dyn RateSource>,
    poll_policy: PollPolicy,
    revision: Revision,
    metrics: Arc<PipelineMetrics>,
}

/// Uploaded document and the text extracted from it.
#[derive(Debug, Clone, Serialize)]
pub struct IngestedDocument {
    /// Location returned by the object store.
    pub url: String,
    /// Extracted plain text.
    pub text: String,
}

/// Inputs of one estimation run; at least one should be non-empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EstimateRequest {
    /// Text extracted from the project document.
    #[serde(default)]
    pub document_text: Option<String>,
    /// Free-form user requirements.
    #[serde(default)]
    pub requirements: Option<String>,
}

/// Successful estimate with everything shown alongside it.
#[derive(Debug, Clone, Serialize)]
pub struct EstimateResult {
    /// Query sent to the index.
    pub query: String,
    /// Records the estimate was grounded on.
    pub hits: Vec<SearchHit>,
    /// Audit rendering of `hits`.
    pub audit_json: String,
    /// Parsed tasks, totals, and advisory checks.
    pub report: EstimationReport,
}

/// Result of [`EstimationService::estimate`]; empty states are not errors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EstimateOutcome {
    /// Tasks were produced.
    Estimated(EstimateResult),
    /// The index returned no records for the query.
    NoMatches {
        /// Query sent to the index.
        query: String,
        /// Informational message.
        message: String,
    },
    /// The model answered with an empty task list.
    NoTasks {
        /// Query sent to the index.
        query: String,
        /// Records given to the model.
        hits: Vec<SearchHit>,
        /// Audit rendering of `hits`.
        audit_json: String,
        /// Informational message.
        message: String,
    },
}

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait EstimationApi: Send + Sync {
    /// Upload a document and extract its text.
    async fn ingest_document(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestedDocument, PipelineError>;

    /// Run query formulation, retrieval, synthesis, and materialization.
    async fn estimate(&self, request: EstimateRequest) -> Result<EstimateOutcome, PipelineError>;

    /// Current rate table.
    async fn rates(&self) -> RateTable;

    /// Active EstimatedDays revision.
    fn revision(&self) -> Revision;

    /// Current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl EstimationService {
    /// Assemble a service from explicit collaborators.
    pub fn new(components: ServiceComponents) -> Self {
        Self {
            store: components.store,
            analysis: components.analysis,
            completion: components.completion,
            search: components.search,
            rates: components.rates,
            poll_policy: components.poll_policy,
            revision: components.revision,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Build every collaborator from configuration.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        tracing::info!(
            container = %config.upload_container,
            index = %config.search_index_name,
            revision = ?config.estimation_revision,
            "Initializing estimation service"
        );
        Ok(Self::new(ServiceComponents {
            store: store_from_config(config, &config.upload_container)?,
            analysis: DocumentAnalysisClient::from_config(config)?,
            completion: Box::new(AzureOpenAiClient::from_config(config)?),
            search: SearchIndexClient::from_config(config)?,
            rates: rate_source_from_config(config),
            poll_policy: PollPolicy {
                interval: config.analysis_poll_interval,
                max_polls: config.analysis_max_polls,
            },
            revision: config.estimation_revision,
        }))
    }

    /// Shared metrics registry.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Upload `bytes` under `name`, then extract text from the stored document.
    ///
    /// The analysis service receives the URL when the store hands out an `http(s)` URL,
    /// otherwise the raw bytes.
    pub async fn ingest_document(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestedDocument, PipelineError> {
        let result = self.ingest_inner(name, bytes).await;
        self.track(result)
    }

    async fn ingest_inner(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestedDocument, PipelineError> {
        tracing::info!(name, size = bytes.len(), "Ingesting document");
        let url = self
            .store
            .upload(name, bytes.clone(), PDF_CONTENT_TYPE)
            .await?;

        let source = if url.starts_with("http://") || url.starts_with("https://") {
            DocumentSource::Url(url.clone())
        } else {
            DocumentSource::Bytes(bytes)
        };
        let outcome = self
            .analysis
            .extract_text(&source, self.poll_policy)
            .await?;

        match outcome {
            AnalysisOutcome::Succeeded(text) => {
                self.metrics.record_analysis();
                tracing::debug!(chars = text.len(), "Document analyzed");
                Ok(IngestedDocument { url, text })
            }
            other => Err(PipelineError::Extraction(other.describe())),
        }
    }

    /// Ask the model for one concise search query.
    pub async fn formulate_query(
        &self,
        document_text: Option<&str>,
        requirements: Option<&str>,
    ) -> Result<String, PipelineError> {
        let query = self
            .completion
            .complete(CompletionRequest {
                prompt: query_prompt(document_text, requirements),
                max_tokens: QUERY_MAX_TOKENS,
                temperature: QUERY_TEMPERATURE,
            })
            .await?;
        self.metrics.record_query();
        tracing::info!(query = %query, "Generated search query");
        Ok(query)
    }

    /// Top-5 historical records for `query`, in service order.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>, PipelineError> {
        let hits = self.search.search(query, DEFAULT_TOP).await?;
        self.metrics.record_search();
        tracing::info!(hits = hits.len(), "Retrieved similar tasks");
        Ok(hits)
    }

    /// Build the estimation prompt with a freshly fetched rate table and ask the model.
    ///
    /// Returns the prompt, the raw response, and the rate table used.
    pub async fn synthesize(
        &self,
        requirements: Option<&str>,
        document_text: Option<&str>,
        hits: &[SearchHit],
    ) -> Result<(EstimationPrompt, String, RateTable), PipelineError> {
        let rates = self.rates.fetch_rates().await;
        let prompt = estimation_prompt(requirements, document_text, hits, &rates, self.revision);
        let response = self
            .completion
            .complete(CompletionRequest {
                prompt: prompt.prompt.clone(),
                max_tokens: ESTIMATION_MAX_TOKENS,
                temperature: ESTIMATION_TEMPERATURE,
            })
            .await?;
        tracing::debug!(chars = response.len(), "Estimation response received");
        Ok((prompt, response, rates))
    }

    /// Run the pipeline from extracted text to a materialized report.
    pub async fn estimate(&self, request: EstimateRequest) -> Result<EstimateOutcome, PipelineError> {
        let result = self.estimate_inner(request).await;
        self.track(result)
    }

    async fn estimate_inner(
        &self,
        request: EstimateRequest,
    ) -> Result<EstimateOutcome, PipelineError> {
        let document_text = request.document_text.as_deref();
        let requirements = request.requirements.as_deref();

        let query = self.formulate_query(document_text, requirements).await?;
        let hits = self.retrieve(&query).await?;
        if hits.is_empty() {
            tracing::info!(query = %query, "No matching tasks in the knowledge base");
            return Ok(EstimateOutcome::NoMatches {
                query,
                message: "No matching tasks found in the knowledge base.".into(),
            });
        }

        let (prompt, response, rates) = self.synthesize(requirements, document_text, &hits).await?;
        match parse_estimation(&response, &rates, self.revision) {
            Ok(report) => {
                self.metrics.record_estimate();
                tracing::info!(
                    tasks = report.tasks.len(),
                    total_price = report.total_price,
                    issues = report.issues.len(),
                    "Estimate produced"
                );
                Ok(EstimateOutcome::Estimated(EstimateResult {
                    query,
                    hits,
                    audit_json: prompt.audit_json,
                    report,
                }))
            }
            Err(MaterializeError::NoTasks) => {
                tracing::info!("Estimation response carried no tasks");
                Ok(EstimateOutcome::NoTasks {
                    query,
                    hits,
                    audit_json: prompt.audit_json,
                    message: MaterializeError::NoTasks.to_string(),
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    fn track<T>(&self, result: Result<T, PipelineError>) -> Result<T, PipelineError> {
        if let Err(error) = &result {
            self.metrics.record_failure();
            tracing::error!(%error, "Pipeline stage failed");
        }
        result
    }
}

#[async_trait]
impl EstimationApi for EstimationService {
    async fn ingest_document(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestedDocument, PipelineError> {
        EstimationService::ingest_document(self, name, bytes).await
    }

    async fn estimate(&self, request: EstimateRequest) -> Result<EstimateOutcome, PipelineError> {
        EstimationService::estimate(self, request).await
    }

    async fn rates(&self) -> RateTable {
        self.rates.fetch_rates().await
    }

    fn revision(&self) -> Revision {
        self.revision
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
