//! HTTP surface for the estimator.
//!
//! - `POST /documents?name=<file>` – Store raw PDF bytes and return the extracted text.
//! - `POST /estimate` – Run query formulation, retrieval, and synthesis over
//!   `{document_text?, requirements?}`; empty states come back with status `no_matches` or
//!   `no_tasks`.
//! - `POST /export/xlsx`, `POST /export/json` – Turn `{tasks: [...]}` into a download.
//! - `GET /rates` – Current rate table.
//! - `GET /metrics` – Pipeline counters.
//! - `GET /commands` – Machine-readable command catalog.

use crate::estimate::{
    EstimateOutcome, EstimateRequest, EstimationApi, IngestedDocument, PipelineError, TaskRecord,
    to_json, to_xlsx,
};
use crate::knowledge_base::XLSX_CONTENT_TYPE;
use crate::metrics::MetricsSnapshot;
use crate::rates::RateTable;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const DEFAULT_DOCUMENT_NAME: &str = "document.pdf";

/// Build the HTTP router exposing the estimation API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: EstimationApi + 'static,
{
    Router::new()
        .route("/documents", post(upload_document::<S>))
        .route("/estimate", post(estimate::<S>))
        .route("/export/xlsx", post(export_xlsx))
        .route("/export/json", post(export_json))
        .route("/rates", get(get_rates::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Query string of `POST /documents`.
#[derive(Deserialize)]
struct DocumentParams {
    /// Object name; defaults to `document.pdf`.
    #[serde(default)]
    name: Option<String>,
}

/// Store a document and extract its text.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<DocumentParams>,
    body: Bytes,
) -> Result<Json<IngestedDocument>, AppError>
where
    S: EstimationApi,
{
    if body.is_empty() {
        return Err(AppError::bad_request("Request body must contain the document bytes"));
    }
    let name = params
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DOCUMENT_NAME.to_string());
    let document = service.ingest_document(&name, body.to_vec()).await?;
    tracing::info!(name = %name, chars = document.text.len(), "Document request completed");
    Ok(Json(document))
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|text| text.trim().is_empty())
}

/// Produce an estimate from document text and/or requirements.
async fn estimate<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<EstimateRequest>,
) -> Result<Json<EstimateOutcome>, AppError>
where
    S: EstimationApi,
{
    if is_blank(&request.document_text) && is_blank(&request.requirements) {
        return Err(AppError::bad_request(
            "Provide document_text, requirements, or both",
        ));
    }
    let outcome = service.estimate(request).await?;
    Ok(Json(outcome))
}

/// Request body for the export endpoints.
#[derive(Deserialize)]
struct ExportRequest {
    tasks: Vec<TaskRecord>,
}

/// Download the tasks as a workbook.
async fn export_xlsx(Json(request): Json<ExportRequest>) -> Result<Response, AppError> {
    let bytes = to_xlsx(&request.tasks).map_err(PipelineError::from)?;
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"estimation.xlsx\"",
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Download the tasks as formatted JSON.
async fn export_json(Json(request): Json<ExportRequest>) -> Result<Response, AppError> {
    let body = to_json(&request.tasks)
        .map_err(|error| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"estimation.json\"",
            ),
        ],
        body,
    )
        .into_response())
}

async fn get_rates<S>(State(service): State<Arc<S>>) -> Json<RateTable>
where
    S: EstimationApi,
{
    Json(service.rates().await)
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: EstimationApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload_document",
                method: "POST",
                path: "/documents?name=<file>",
                description: "Store raw PDF bytes and return { \"url\", \"text\" } with the extracted text.",
                request_example: None,
            },
            CommandDescriptor {
                name: "estimate",
                method: "POST",
                path: "/estimate",
                description: "Formulate a search query, retrieve similar historical tasks, and synthesize a task estimate.",
                request_example: Some(json!({
                    "document_text": "Extracted project document",
                    "requirements": "Mobile app with SSO and push notifications"
                })),
            },
            CommandDescriptor {
                name: "export_xlsx",
                method: "POST",
                path: "/export/xlsx",
                description: "Download tasks as a workbook with sheet \"Project Estimation\".",
                request_example: Some(json!({ "tasks": [{ "Task": "Setup CI", "MinDays": 1 }] })),
            },
            CommandDescriptor {
                name: "export_json",
                method: "POST",
                path: "/export/json",
                description: "Download tasks as formatted JSON.",
                request_example: Some(json!({ "tasks": [{ "Task": "Setup CI", "MinDays": 1 }] })),
            },
            CommandDescriptor {
                name: "rates",
                method: "GET",
                path: "/rates",
                description: "Return the current profile to daily rate table.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return pipeline counters.",
                request_example: None,
            },
        ],
    })
}

/// Error response carrying a status and a plain-text message.
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(error: PipelineError) -> Self {
        let status = match &error {
            PipelineError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Storage(_)
            | PipelineError::Analysis(_)
            | PipelineError::Completion(_)
            | PipelineError::Search(_)
            | PipelineError::Rates(_)
            | PipelineError::Materialize(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Spreadsheet(_) | PipelineError::Loader(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, error.to_string())
    }
}
