//! Row coercion from spreadsheet or JSON shapes into search documents.

use crate::{
    sanitize::{join_issues, parse_number, value_to_string},
    search::SearchDocument,
};
use serde_json::{Map, Value};

const CONTINGENCY_COLUMNS: [&str; 2] = ["Contingency", "% Contingency"];
const ISSUE_COLUMNS: [&str; 3] = ["PotentialIssues", "Potential Issues", "potential_issues"];

fn first<'a>(row: &'a Map<String, Value>, columns: &[&str]) -> Option<&'a Value> {
    columns.iter().find_map(|column| row.get(*column))
}

/// Integer value of a numeric cell: empty is 0, `%` is stripped, fractions truncate.
///
/// Unparsable text also becomes 0 and is logged.
pub fn coerce_integer(value: Option<&Value>, column: &str) -> i64 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(number)) => number.as_f64().map_or(0, |value| value.trunc() as i64),
        Some(Value::String(text)) if text.trim().is_empty() => 0,
        Some(Value::String(text)) => match parse_number(text) {
            Some(number) => number.trunc() as i64,
            None => {
                tracing::warn!(column, value = %text, "Non-numeric cell coerced to 0");
                0
            }
        },
        Some(other) => {
            tracing::warn!(column, value = %other, "Non-numeric cell coerced to 0");
            0
        }
    }
}

/// Text value of a cell; empty cells become `""`.
pub fn coerce_text(value: Option<&Value>) -> String {
    value.map(value_to_string).unwrap_or_default()
}

/// Contingency cell as text; empty cells become `"0"`.
pub fn coerce_contingency(value: Option<&Value>) -> String {
    let text = coerce_text(value);
    if text.trim().is_empty() {
        "0".to_string()
    } else {
        text
    }
}

fn coerce_issues(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => {
            let items: Vec<String> = items
                .iter()
                .map(value_to_string)
                .filter(|item| !item.trim().is_empty())
                .collect();
            join_issues(&items)
        }
        other => coerce_text(other),
    }
}

/// Build the search document for one source row under `id`.
pub fn document_from_row(id: u64, row: &Map<String, Value>) -> SearchDocument {
    let integer = |column: &str| coerce_integer(row.get(column), column);
    let text = |column: &str| coerce_text(row.get(column));

    SearchDocument {
        id: id.to_string(),
        id_number: i64::try_from(id).unwrap_or(i64::MAX),
        task: text("Task"),
        mscw: text("MSCW"),
        area: text("Area"),
        module: text("Module"),
        feature: text("Feature"),
        profile: text("Profile"),
        min_days: integer("MinDays"),
        real_days: integer("RealDays"),
        max_days: integer("MaxDays"),
        contingency: coerce_contingency(first(row, &CONTINGENCY_COLUMNS)),
        estimated_days: integer("EstimatedDays"),
        estimated_price: integer("EstimatedPrice") as f64,
        potential_issues: coerce_issues(first(row, &ISSUE_COLUMNS)),
    }
}
