//! `.xlsx` reading and writing over JSON-shaped rows.
//!
//! Rows are `serde_json` maps keyed by the header row, so the same decoding path serves
//! spreadsheets, JSON uploads, and model output.

use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
use rust_xlsxwriter::Workbook;
use serde_json::{Map, Value};
use std::io::Cursor;
use thiserror::Error;

/// Errors raised while converting between rows and `.xlsx` bytes.
#[derive(Debug, Error)]
pub enum SpreadsheetError {
    /// Workbook serialization failed.
    #[error("Failed to write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),
    /// Workbook bytes could not be parsed.
    #[error("Failed to read workbook: {0}")]
    Read(#[from] calamine::XlsxError),
    /// More rows or columns than the format allows.
    #[error("Sheet exceeds the {0} limit")]
    TooLarge(&'static str),
}

/// One worksheet decoded into header-keyed rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    /// Worksheet name.
    pub name: String,
    /// Header cells in column order.
    pub headers: Vec<String>,
    /// Data rows; empty cells map to `null`.
    pub rows: Vec<Map<String, Value>>,
}

/// Serialize `rows` under `headers` into a single-sheet workbook.
///
/// Missing keys and `null` values leave the cell empty.
pub fn write_rows(
    sheet_name: &str,
    headers: &[&str],
    rows: &[Map<String, Value>],
) -> Result<Vec<u8>, SpreadsheetError> {
    let mut workbook = Workbook::new();
    {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name)?;

        for (col, header) in headers.iter().enumerate() {
            worksheet.write_string(0, column_index(col)?, *header)?;
        }

        for (index, row) in rows.iter().enumerate() {
            let row_number =
                u32::try_from(index + 1).map_err(|_| SpreadsheetError::TooLarge("row"))?;
            for (col, header) in headers.iter().enumerate() {
                let col = column_index(col)?;
                match row.get(*header) {
                    None | Some(Value::Null) => {}
                    Some(Value::String(text)) if text.is_empty() => {}
                    Some(Value::Number(number)) => {
                        worksheet.write_number(row_number, col, number.as_f64().unwrap_or(0.0))?;
                    }
                    Some(Value::Bool(flag)) => {
                        worksheet.write_boolean(row_number, col, *flag)?;
                    }
                    Some(Value::String(text)) => {
                        worksheet.write_string(row_number, col, text)?;
                    }
                    Some(other) => {
                        worksheet.write_string(row_number, col, other.to_string())?;
                    }
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn column_index(col: usize) -> Result<u16, SpreadsheetError> {
    u16::try_from(col).map_err(|_| SpreadsheetError::TooLarge("column"))
}

/// Read the first sheet whose name appears in `candidates`, trying candidates in order.
///
/// Returns `Ok(None)` when the workbook has none of the candidate sheets.
pub fn read_first_matching_sheet(
    bytes: &[u8],
    candidates: &[&str],
) -> Result<Option<Sheet>, SpreadsheetError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let names = workbook.sheet_names();

    let Some(name) = candidates
        .iter()
        .find(|candidate| names.iter().any(|name| name == *candidate))
    else {
        tracing::debug!(available = ?names, "No candidate sheet present");
        return Ok(None);
    };

    let range = workbook.worksheet_range(name)?;
    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|cells| cells.iter().map(|cell| cell.to_string().trim().to_string()).collect())
        .unwrap_or_default();

    let rows = rows
        .filter(|cells| cells.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|cells| {
            headers
                .iter()
                .enumerate()
                .filter(|(_, header)| !header.is_empty())
                .map(|(index, header)| {
                    let value = cells.get(index).map(cell_to_value).unwrap_or(Value::Null);
                    (header.clone(), value)
                })
                .collect::<Map<String, Value>>()
        })
        .collect();

    Ok(Some(Sheet {
        name: (*name).to_string(),
        headers,
        rows,
    }))
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(value) => Value::from(*value),
        Data::Float(value) => serde_json::Number::from_f64(*value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::Bool(flag) => Value::Bool(*flag),
        Data::String(text) => Value::String(text.clone()),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object row")
    }

    #[test]
    fn written_rows_read_back_under_headers() {
        let bytes = write_rows(
            "Tasks",
            &["Task", "MinDays", "Contingency"],
            &[
                row(json!({ "Task": "Design API", "MinDays": 2, "Contingency": "0%" })),
                row(json!({ "Task": "Write docs", "MinDays": null })),
            ],
        )
        .expect("write");

        let sheet = read_first_matching_sheet(&bytes, &["Tasks", "Sheet1"])
            .expect("read")
            .expect("sheet");

        assert_eq!(sheet.name, "Tasks");
        assert_eq!(sheet.headers, vec!["Task", "MinDays", "Contingency"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0]["Task"], json!("Design API"));
        assert_eq!(sheet.rows[0]["MinDays"].as_f64(), Some(2.0));
        assert_eq!(sheet.rows[0]["Contingency"], json!("0%"));
        assert_eq!(sheet.rows[1]["MinDays"], Value::Null);
    }

    #[test]
    fn candidates_are_tried_in_order() {
        let bytes = write_rows("Sheet1", &["Task"], &[row(json!({ "Task": "Only row" }))])
            .expect("write");

        let sheet = read_first_matching_sheet(&bytes, &["Tasks", "Sheet1"])
            .expect("read")
            .expect("fallback sheet");
        assert_eq!(sheet.name, "Sheet1");
        assert_eq!(sheet.rows[0]["Task"], json!("Only row"));
    }

    #[test]
    fn missing_candidates_yield_none() {
        let bytes = write_rows("Summary", &["Task"], &[]).expect("write");
        let sheet = read_first_matching_sheet(&bytes, &["Tasks", "Sheet1"]).expect("read");
        assert!(sheet.is_none());
    }

    #[test]
    fn garbage_bytes_are_a_read_error() {
        let error = read_first_matching_sheet(b"not a workbook", &["Tasks"]).expect_err("error");
        assert!(matches!(error, SpreadsheetError::Read(_)));
    }
}
