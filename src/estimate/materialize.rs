//! Turning the model's estimation text into tasks, checks, and download artifacts.

use crate::{
    estimate::{
        formula::{bounded_estimated_days, estimated_price, weighted_estimated_days},
        types::{PipelineError, TASK_COLUMNS, TaskRecord},
    },
    rates::RateTable,
    sanitize::{format_number, join_issues, value_to_string},
    spreadsheet::{self, SpreadsheetError},
    vocabulary::{Field, Revision, VOCABULARY},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Sheet name used for estimate workbooks.
pub const EXPORT_SHEET: &str = "Project Estimation";

const IMPORT_SHEETS: [&str; 3] = [EXPORT_SHEET, "Tasks", "Sheet1"];
const PRICE_TOLERANCE: f64 = 0.005;

/// Reasons an estimation response yields no table.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The model returned nothing.
    #[error("Received empty response for estimation")]
    EmptyResponse,
    /// The response was not the expected JSON object.
    #[error("JSON decoding error: {0}")]
    Decode(#[from] serde_json::Error),
    /// The object decoded but carried no tasks.
    #[error("No tasks found in the estimation")]
    NoTasks,
}

/// Advisory finding about one task; never causes rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// Zero-based position of the task.
    pub task_index: usize,
    /// Column the finding concerns.
    pub field: &'static str,
    /// Human-readable explanation.
    pub message: String,
}

/// Parsed estimate with computed totals and advisory checks.
#[derive(Debug, Clone, Serialize)]
pub struct EstimationReport {
    /// Tasks in model order.
    pub tasks: Vec<TaskRecord>,
    /// Sum of `EstimatedPrice`.
    pub total_price: f64,
    /// Sum of `EstimatedDays`.
    pub total_days: f64,
    /// Summary field the active revision asks for.
    pub summary_field: &'static str,
    /// Value the model reported for `summary_field`, verbatim.
    pub declared_summary: Option<String>,
    /// Findings from vocabulary, rate, and formula checks.
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    tasks: Vec<TaskRecord>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Parse a raw model response into a report.
///
/// Markdown code fences and prose around the JSON object are tolerated.
pub fn parse_estimation(
    raw: &str,
    rates: &RateTable,
    revision: Revision,
) -> Result<EstimationReport, MaterializeError> {
    let body = extract_json_object(raw).ok_or(MaterializeError::EmptyResponse)?;
    let envelope: Envelope = serde_json::from_str(body)?;
    if envelope.tasks.is_empty() {
        return Err(MaterializeError::NoTasks);
    }

    let summary_field = revision.summary_field();
    let declared_summary = envelope
        .rest
        .get(summary_field)
        .filter(|value| !value.is_null())
        .map(value_to_string);
    let issues = validate(&envelope.tasks, rates, revision);
    if !issues.is_empty() {
        tracing::warn!(count = issues.len(), "Estimate has advisory issues");
    }

    Ok(EstimationReport {
        total_price: envelope.tasks.iter().map(|task| task.estimated_price).sum(),
        total_days: envelope.tasks.iter().map(|task| task.estimated_days).sum(),
        tasks: envelope.tasks,
        summary_field,
        declared_summary,
        issues,
    })
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let mut text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.split_once('\n').map_or("", |(_, body)| body);
        text = text.trim_end().strip_suffix("```").unwrap_or(text).trim();
        if text.is_empty() {
            return None;
        }
    }
    if !text.starts_with('{')
        && let (Some(start), Some(end)) = (text.find('{'), text.rfind('}'))
        && start < end
    {
        text = &text[start..=end];
    }
    Some(text)
}

/// Check tasks against the vocabulary, the rate table, and the active formulas.
pub fn validate(tasks: &[TaskRecord], rates: &RateTable, revision: Revision) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut push = |task_index: usize, field: &'static str, message: String| {
        issues.push(ValidationIssue {
            task_index,
            field,
            message,
        });
    };

    let mut previous_priority = None;
    for (index, task) in tasks.iter().enumerate() {
        for (field, value) in [
            (Field::Priority, &task.mscw),
            (Field::Area, &task.area),
            (Field::Module, &task.module),
            (Field::Feature, &task.feature),
        ] {
            if !VOCABULARY.accepts(field, value) {
                push(
                    index,
                    field.column(),
                    format!("{value:?} is not an allowed value"),
                );
            }
        }

        if let Some(priority) = task.priority() {
            if previous_priority.is_some_and(|previous| priority < previous) {
                push(
                    index,
                    Field::Priority.column(),
                    format!("{priority} listed after a lower priority"),
                );
            }
            previous_priority = Some(priority);
        }

        let rate = rates.rate_for(&task.profile);
        if rate.is_none() && !rates.is_empty() {
            push(
                index,
                Field::Profile.column(),
                format!("{:?} has no daily rate", task.profile),
            );
        }

        match revision {
            Revision::Weighted => {
                let expected = weighted_estimated_days(task.min_days, task.real_days, task.max_days);
                if expected != task.estimated_days {
                    push(
                        index,
                        "EstimatedDays",
                        format!(
                            "expected {} from the weighted formula, found {}",
                            format_number(expected),
                            format_number(task.estimated_days)
                        ),
                    );
                }
            }
            Revision::Bounded => match bounded_estimated_days(
                task.min_days,
                task.real_days,
                task.max_days,
                task.estimated_days,
            ) {
                Ok(rounded) if rounded != task.estimated_days => push(
                    index,
                    "EstimatedDays",
                    format!(
                        "expected {} after rounding, found {}",
                        format_number(rounded),
                        format_number(task.estimated_days)
                    ),
                ),
                Ok(_) => {}
                Err(error) => push(index, "EstimatedDays", error.to_string()),
            },
        }

        if let Some(rate) = rate {
            let expected = estimated_price(task.estimated_days, rate);
            if (expected - task.estimated_price).abs() > PRICE_TOLERANCE {
                push(
                    index,
                    "EstimatedPrice",
                    format!(
                        "expected {} for {} days at {}, found {}",
                        format_number(expected),
                        format_number(task.estimated_days),
                        format_number(rate),
                        format_number(task.estimated_price)
                    ),
                );
            }
        }
    }
    issues
}

/// Plain-text table with one row per task.
pub fn render_table(tasks: &[TaskRecord]) -> String {
    let rows: Vec<Vec<String>> = tasks.iter().map(cells).collect();
    let widths: Vec<usize> = TASK_COLUMNS
        .iter()
        .enumerate()
        .map(|(col, header)| {
            rows.iter()
                .map(|row| row[col].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(pad_row(TASK_COLUMNS.iter().copied(), &widths));
    out.push(
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &rows {
        out.push(pad_row(row.iter().map(String::as_str), &widths));
    }
    out.join("\n")
}

fn pad_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}

fn cells(task: &TaskRecord) -> Vec<String> {
    vec![
        task.mscw.clone(),
        task.area.clone(),
        task.module.clone(),
        task.feature.clone(),
        task.task.clone(),
        task.profile.clone(),
        format_number(task.min_days),
        format_number(task.real_days),
        format_number(task.max_days),
        task.contingency.clone(),
        format_number(task.estimated_days),
        format_number(task.estimated_price),
        join_issues(&task.potential_issues),
    ]
}

/// Pretty JSON array of the tasks.
pub fn to_json(tasks: &[TaskRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(tasks)
}

/// Workbook with one [`EXPORT_SHEET`] sheet.
pub fn to_xlsx(tasks: &[TaskRecord]) -> Result<Vec<u8>, SpreadsheetError> {
    let rows: Vec<_> = tasks.iter().map(TaskRecord::to_row).collect();
    spreadsheet::write_rows(EXPORT_SHEET, &TASK_COLUMNS, &rows)
}

/// Read tasks back from an exported (or hand-edited) workbook.
pub fn tasks_from_xlsx(bytes: &[u8]) -> Result<Vec<TaskRecord>, PipelineError> {
    let Some(sheet) = spreadsheet::read_first_matching_sheet(bytes, &IMPORT_SHEETS)? else {
        return Ok(Vec::new());
    };
    sheet
        .rows
        .iter()
        .map(|row| {
            TaskRecord::from_row(row)
                .map_err(|error| PipelineError::from(MaterializeError::Decode(error)))
        })
        .collect()
}
