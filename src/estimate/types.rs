//! Core data types and error definitions for the estimation pipeline.

use crate::{
    analysis::AnalysisError,
    completion::CompletionError,
    estimate::materialize::MaterializeError,
    knowledge_base::LoaderError,
    rates::RateError,
    sanitize::{de_f64, de_issues, de_string, issue_cell, ser_number},
    search::SearchError,
    spreadsheet::SpreadsheetError,
    storage::StorageError,
    vocabulary::Priority,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors emitted by the estimation pipeline and the batch tooling around it.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Object storage failed.
    #[error("Storage request failed: {0}")]
    Storage(#[from] StorageError),
    /// Document analysis transport failed.
    #[error("Document analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
    /// Analysis finished without usable text.
    #[error("Document analysis produced no text: {0}")]
    Extraction(String),
    /// Completion provider failed.
    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),
    /// Search index request failed.
    #[error("Search request failed: {0}")]
    Search(#[from] SearchError),
    /// Rate table could not be loaded.
    #[error("Rate lookup failed: {0}")]
    Rates(#[from] RateError),
    /// Workbook conversion failed.
    #[error("Spreadsheet conversion failed: {0}")]
    Spreadsheet(#[from] SpreadsheetError),
    /// Model response could not be turned into tasks.
    #[error("Estimation response rejected: {0}")]
    Materialize(#[from] MaterializeError),
    /// Knowledge-base load failed.
    #[error("Knowledge-base load failed: {0}")]
    Loader(#[from] LoaderError),
}

/// Column headers used for estimate exports, in display order.
pub const TASK_COLUMNS: [&str; 13] = [
    "MSCW",
    "Area",
    "Module",
    "Feature",
    "Task",
    "Profile",
    "MinDays",
    "RealDays",
    "MaxDays",
    "% Contingency",
    "EstimatedDays",
    "EstimatedPrice",
    "Potential Issues",
];

/// One estimated task as produced by the model or re-read from an export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
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
    /// Task description.
    #[serde(rename = "Task", default, deserialize_with = "de_string")]
    pub task: String,
    /// Role performing the task.
    #[serde(rename = "Profile", default, deserialize_with = "de_string")]
    pub profile: String,
    /// Minimum days.
    #[serde(
        rename = "MinDays",
        default,
        deserialize_with = "de_f64",
        serialize_with = "ser_number"
    )]
    pub min_days: f64,
    /// Most likely days.
    #[serde(
        rename = "RealDays",
        default,
        deserialize_with = "de_f64",
        serialize_with = "ser_number"
    )]
    pub real_days: f64,
    /// Maximum days.
    #[serde(
        rename = "MaxDays",
        default,
        deserialize_with = "de_f64",
        serialize_with = "ser_number"
    )]
    pub max_days: f64,
    /// Contingency placeholder.
    #[serde(
        rename = "% Contingency",
        alias = "Contingency",
        default,
        deserialize_with = "de_string"
    )]
    pub contingency: String,
    /// Point estimate in days.
    #[serde(
        rename = "EstimatedDays",
        default,
        deserialize_with = "de_f64",
        serialize_with = "ser_number"
    )]
    pub estimated_days: f64,
    /// Price derived from the point estimate and the profile rate.
    #[serde(
        rename = "EstimatedPrice",
        default,
        deserialize_with = "de_f64",
        serialize_with = "ser_number"
    )]
    pub estimated_price: f64,
    /// Risk notes; absent for most tasks.
    #[serde(
        rename = "Potential Issues",
        alias = "PotentialIssues",
        alias = "potential_issues",
        default,
        deserialize_with = "de_issues"
    )]
    pub potential_issues: Vec<String>,
}

impl TaskRecord {
    /// Parsed MSCW tier, if the label is recognizable.
    pub fn priority(&self) -> Option<Priority> {
        Priority::parse(&self.mscw)
    }

    /// Spreadsheet row keyed by [`TASK_COLUMNS`]; risk notes share one cell via [`issue_cell`].
    pub fn to_row(&self) -> Map<String, Value> {
        let mut row = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        row.insert(
            "Potential Issues".into(),
            Value::String(issue_cell(&self.potential_issues)),
        );
        row
    }

    /// Decode a header-keyed row.
    pub fn from_row(row: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(row.clone()))
    }
}
