//! Estimation pipeline: task records, formulas, prompts, materialization, orchestration.

pub mod formula;
pub mod materialize;
pub mod prompt;
pub mod service;
pub mod types;

pub use formula::{bounded_estimated_days, estimated_price, weighted_estimated_days};
pub use materialize::{
    EXPORT_SHEET, EstimationReport, MaterializeError, ValidationIssue, parse_estimation,
    render_table, tasks_from_xlsx, to_json, to_xlsx,
};
pub use prompt::{EstimationPrompt, estimation_prompt, query_prompt};
pub use service::{
    EstimateOutcome, EstimateRequest, EstimateResult, EstimationApi, EstimationService,
    IngestedDocument, ServiceComponents,
};
pub use types::{PipelineError, TASK_COLUMNS, TaskRecord};
