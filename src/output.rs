//! Output Writer
//!
//! Renders command results to stdout as JSON, YAML, or a plain table, and
//! shapes errors for the top-level handler.
//!
//! # Output Contract
//! - `json`: pretty-printed records, errors as
//!   `{"ok": false, "command": "...", "error": {"code": "...", "message": "..."}}`
//! - `yaml`: the same records via `serde_yaml`
//! - `table`: one column per requested field, header row first

use std::io::Write;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{CtlError, Result};

/// Output format selected with `--output`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
    #[default]
    Table,
}

/// Write `value` in the selected format.
///
/// `fields` picks and orders the table columns; JSON and YAML always carry
/// the whole record.
pub fn write_records<T: Serialize>(
    out: &mut impl Write,
    format: OutputFormat,
    value: &T,
    fields: &[&str],
) -> Result<()> {
    let rendered = match format {
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(value)
                .map_err(|e| CtlError::process(format!("Could not serialize output: {e}")))?;
            json.push('\n');
            json
        }
        OutputFormat::Yaml => serde_yaml::to_string(value)
            .map_err(|e| CtlError::process(format!("Could not serialize output: {e}")))?,
        OutputFormat::Table => {
            let value = serde_json::to_value(value)
                .map_err(|e| CtlError::process(format!("Could not serialize output: {e}")))?;
            render_table(&value, fields)
        }
    };

    out.write_all(rendered.as_bytes())
        .map_err(|e| CtlError::process(format!("Could not write output: {e}")))
}

fn cell(record: &serde_json::Value, field: &str) -> String {
    match record.get(field) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Render an object or an array of objects as an aligned table.
fn render_table(value: &serde_json::Value, fields: &[&str]) -> String {
    let records: Vec<&serde_json::Value> = match value {
        serde_json::Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let header: Vec<String> = fields.iter().map(|f| f.replace('_', " ").to_uppercase()).collect();
    let rows: Vec<Vec<String>> =
        records.iter().map(|r| fields.iter().map(|f| cell(r, f)).collect()).collect();

    let widths: Vec<usize> = (0..fields.len())
        .map(|i| {
            rows.iter().map(|row| row[i].chars().count()).chain([header[i].len()]).max().unwrap_or(0)
        })
        .collect();

    let mut table = String::new();
    for row in std::iter::once(&header).chain(rows.iter()) {
        let line: Vec<String> =
            row.iter().zip(&widths).map(|(text, width)| format!("{text:<width$}")).collect();
        table.push_str(line.join("  ").trim_end());
        table.push('\n');
    }
    table
}

/// Error envelope printed for `--output json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Command that was attempted (connection-string, branches, ...)
    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, command: command.into(), error }
    }

    /// Create error envelope from CtlError
    pub fn from_error(command: impl Into<String>, err: &CtlError) -> Self {
        Self::new(command, ErrorInfo::new(err.error_code(), err.message()))
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "NOT_FOUND", "AUTH_TIMEOUT")
    pub code: String,

    /// Human-readable error message (no tokens or passwords)
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}
