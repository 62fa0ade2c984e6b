//! Helpers for normalizing loosely typed values.
//!
//! Model output, spreadsheet cells, and search results disagree on whether a number is a
//! number or a string. These helpers accept both and are shared by the serde models and the
//! knowledge-base coercion rules.

use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
use serde_json::Value;

/// Parse a numeric string, tolerating whitespace, a trailing `%`, and thousands separators.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.replace(',', "").parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Render a number without a trailing `.0` when it is integral.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Render any JSON scalar as text; `null` becomes the empty string.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| number.to_string()),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

/// Deserialize a number from a JSON number, numeric string, or `null` (zero).
pub fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0.0),
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| D::Error::custom("number out of range")),
        Value::String(text) if text.trim().is_empty() => Ok(0.0),
        Value::String(text) => {
            parse_number(&text).ok_or_else(|| D::Error::custom(format!("not a number: {text:?}")))
        }
        other => Err(D::Error::custom(format!("expected a number, found {other}"))),
    }
}

/// Deserialize an integer, truncating fractional values.
pub fn de_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    de_f64(deserializer).map(|value| value.trunc() as i64)
}

/// Deserialize any scalar as a string.
pub fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(&Value::deserialize(deserializer)?))
}

/// Deserialize risk notes from a comma-separated string, a JSON array string, or an array.
pub fn de_issues<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(text) => Ok(parse_issue_cell(&text)),
        Value::Array(items) => Ok(items
            .iter()
            .map(value_to_string)
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()),
        other => Ok(split_issues(&value_to_string(&other))),
    }
}

/// Serialize integral numbers as JSON integers.
pub fn ser_number<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.fract() == 0.0 && value.abs() < 1e15 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// Split a comma-separated risk list, dropping blanks.
pub fn split_issues(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join risk notes the way they are stored in spreadsheets and search documents.
pub fn join_issues(issues: &[String]) -> String {
    issues.join(", ")
}

/// Encode risk notes into one spreadsheet cell that [`parse_issue_cell`] reads back exactly.
///
/// Notes that survive a comma split are joined; otherwise the cell holds a JSON array.
pub fn issue_cell(issues: &[String]) -> String {
    let joined = join_issues(issues);
    if split_issues(&joined) == issues {
        return joined;
    }
    serde_json::to_string(issues).unwrap_or(joined)
}

/// Inverse of [`issue_cell`]: a JSON array of strings, or a comma-separated list.
pub fn parse_issue_cell(text: &str) -> Vec<String> {
    if text.trim_start().starts_with('[')
        && let Ok(issues) = serde_json::from_str::<Vec<String>>(text)
    {
        return issues;
    }
    split_issues(text)
}
