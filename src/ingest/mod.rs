//! Sheet parsing
//!
//! Turns the raw bytes of an [`ImportFile`] into rows. CSV files need a
//! header row; cells are trimmed, kept as strings, and empty cells become
//! `null` (type casts convert them later). JSON files hold an array of
//! objects. Both formats expose exactly one sheet, index 0.

use serde_json::Value;

use crate::models::{FileFormat, ImportFile, Row};
use crate::pipeline::{PipelineError, PipelineResult};

const UTF8_BOM: &str = "\u{feff}";

/// Number of sheets the file exposes
pub fn sheet_count(file: &ImportFile) -> usize {
    match file.format {
        FileFormat::Csv | FileFormat::Json => 1,
    }
}

/// Parse one sheet of a file into rows
pub fn parse_sheet(file: &ImportFile, sheet_index: usize) -> PipelineResult<Vec<Row>> {
    let sheets = sheet_count(file);
    if sheet_index >= sheets {
        return Err(PipelineError::Validation(format!(
            "Sheet {} does not exist (file has {} sheet{})",
            sheet_index,
            sheets,
            if sheets == 1 { "" } else { "s" }
        )));
    }
    if file.content.iter().all(u8::is_ascii_whitespace) {
        return Err(PipelineError::Validation("File is empty".to_string()));
    }

    let rows = match file.format {
        FileFormat::Csv => parse_csv(&file.content)?,
        FileFormat::Json => parse_json(&file.content)?,
    };

    if rows.is_empty() {
        return Err(PipelineError::Validation(
            "File contains no data rows".to_string(),
        ));
    }
    Ok(rows)
}

fn parse_csv(content: &[u8]) -> PipelineResult<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| malformed_csv(&e))?
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let name = name.trim_start_matches(UTF8_BOM).trim();
            if name.is_empty() {
                format!("column_{}", i + 1)
            } else {
                name.to_string()
            }
        })
        .collect();

    if headers.is_empty() {
        return Err(PipelineError::Validation(
            "CSV header row is missing".to_string(),
        ));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| malformed_csv(&e))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (header.clone(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn malformed_csv(err: &csv::Error) -> PipelineError {
    match err.position() {
        Some(pos) => PipelineError::Validation(format!(
            "Malformed CSV at line {}: {}",
            pos.line(),
            err
        )),
        None => PipelineError::Validation(format!("Malformed CSV: {}", err)),
    }
}

fn parse_json(content: &[u8]) -> PipelineResult<Vec<Row>> {
    let value: Value = serde_json::from_slice(content)
        .map_err(|e| PipelineError::Validation(format!("Malformed JSON: {}", e)))?;

    let Value::Array(items) = value else {
        return Err(PipelineError::Validation(
            "JSON content must be an array of objects".to_string(),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(row) => Ok(row),
            other => Err(PipelineError::Validation(format!(
                "JSON element {} is not an object (found {})",
                i,
                json_type_name(&other)
            ))),
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
