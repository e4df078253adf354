//! Output Encodings and the Command Result Contract
//!
//! Every operation returns a [`CommandResult`]; result sets pass through
//! [`render`] in one of four closed encodings. Adapters normalize driver
//! values to JSON-safe scalars before they reach this module (timestamps to
//! ISO-8601 strings, binary to base64), so rendering cannot fail: a value the
//! encoders cannot represent is a programming defect, not a user-facing error.
//!
//! # Encodings
//! - `table`: box-drawing grid, `NULL` literals, `No results` sentinel
//! - `json`: pretty-printed array of row objects, `[]` when empty
//! - `csv`: header + rows via the csv crate, empty string when empty
//! - `toon`: token-oriented compact tabular encoding, empty string when empty

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::RowSet;
use crate::error::SqlwardError;

/// Closed set of output encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
    Toon,
}

impl OutputFormat {
    /// Get the format name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Toon => "toon",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = SqlwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "toon" => Ok(Self::Toon),
            other => Err(SqlwardError::invalid_input(format!(
                "unknown output format '{other}' (expected table, json, csv, or toon)"
            ))),
        }
    }
}

/// Outcome of one dispatched operation
///
/// Created once per dispatch, immutable, never reused. `succeeded == false`
/// with `confirmation_required == true` asks the caller to re-prompt for
/// consent; any other failure is terminal for the invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub succeeded: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,

    pub confirmation_required: bool,
}

impl CommandResult {
    /// Successful result carrying rendered output
    #[must_use]
    pub fn success(rendered: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            rendered_text: Some(rendered.into()),
            error_text: None,
            confirmation_required: false,
        }
    }

    /// Deferred-decision result: the caller should obtain consent and resubmit
    #[must_use]
    pub fn needs_confirmation(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            rendered_text: None,
            error_text: Some(message.into()),
            confirmation_required: true,
        }
    }

    /// Failed result from a structured error
    ///
    /// Confirmation signals keep their message as-is; every other error is
    /// surfaced verbatim behind the `error: ` marker.
    #[must_use]
    pub fn failure(error: &SqlwardError) -> Self {
        match error {
            SqlwardError::ConfirmationRequired(message) => Self::needs_confirmation(message.clone()),
            other => Self {
                succeeded: false,
                rendered_text: None,
                error_text: Some(format!("error: {}", other.message())),
                confirmation_required: false,
            },
        }
    }
}

/// Sentinel rendered for an empty result set in table format
pub const NO_RESULTS: &str = "No results";

/// Render a result set in the selected encoding
#[must_use]
pub fn render(rows: &RowSet, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => render_table(rows),
        OutputFormat::Json => render_json(rows),
        OutputFormat::Csv => render_csv(rows),
        OutputFormat::Toon => render_toon(rows),
    }
}

/// Box-drawing grid; column width = max(header, widest cell, 3)
fn render_table(rows: &RowSet) -> String {
    if rows.rows.is_empty() {
        return NO_RESULTS.to_string();
    }

    let rendered: Vec<Vec<String>> = rows
        .rows
        .iter()
        .map(|row| row.iter().map(table_cell).collect())
        .collect();

    let widths: Vec<usize> = rows
        .columns
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let cells = rendered.iter().map(|row| row[i].chars().count()).max().unwrap_or(0);
            header.chars().count().max(cells).max(3)
        })
        .collect();

    let rule = |left: char, mid: char, right: char| {
        let mut line = String::new();
        line.push(left);
        for (i, width) in widths.iter().enumerate() {
            if i > 0 {
                line.push(mid);
            }
            line.extend(std::iter::repeat('─').take(width + 2));
        }
        line.push(right);
        line
    };

    let format_row = |cells: &[String]| {
        let mut line = String::from("│");
        for (cell, width) in cells.iter().zip(&widths) {
            let pad = width - cell.chars().count();
            line.push(' ');
            line.push_str(cell);
            line.extend(std::iter::repeat(' ').take(pad + 1));
            line.push('│');
        }
        line
    };

    let mut out = Vec::with_capacity(rendered.len() + 4);
    out.push(rule('┌', '┬', '┐'));
    out.push(format_row(&rows.columns.iter().map(ToString::to_string).collect::<Vec<_>>()));
    out.push(rule('├', '┼', '┤'));
    for row in &rendered {
        out.push(format_row(row));
    }
    out.push(rule('└', '┴', '┘'));
    out.join("\n")
}

/// Cell text for the table grid (NULL rendered literally)
fn table_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pretty-printed array of row objects in column order
fn render_json(rows: &RowSet) -> String {
    let objects: Vec<serde_json::Value> = rows
        .rows
        .iter()
        .map(|row| {
            let mut object = serde_json::Map::new();
            for (column, value) in rows.columns.iter().zip(row) {
                object.insert(column.clone(), value.clone());
            }
            serde_json::Value::Object(object)
        })
        .collect();

    // Serializing Vec<Value> cannot fail
    serde_json::to_string_pretty(&objects).expect("JSON-safe values serialize")
}

/// Header + data rows; the csv crate quotes exactly when a cell contains a
/// comma, quote, or newline, doubling internal quotes
fn render_csv(rows: &RowSet) -> String {
    if rows.rows.is_empty() {
        return String::new();
    }

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(&rows.columns).expect("in-memory csv write");
    for row in &rows.rows {
        let record: Vec<String> = row.iter().map(csv_cell).collect();
        writer.write_record(&record).expect("in-memory csv write");
    }

    let bytes = writer.into_inner().expect("in-memory csv flush");
    String::from_utf8(bytes).expect("csv output is utf-8")
}

/// Cell text for CSV (NULL rendered as the empty field)
fn csv_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Token-oriented compact tabular encoding
///
/// One header line `[N]{col,...}:` followed by one indented comma-joined line
/// per row. Scalars are written bare where unambiguous and JSON-quoted
/// otherwise. Adapter-boundary normalization guarantees scalar input; any
/// residual composite value is flattened to its compact JSON text.
fn render_toon(rows: &RowSet) -> String {
    if rows.rows.is_empty() {
        return String::new();
    }

    let header: Vec<String> = rows.columns.iter().map(|c| toon_string(c)).collect();
    let mut out = format!("[{}]{{{}}}:", rows.rows.len(), header.join(","));
    for row in &rows.rows {
        let cells: Vec<String> = row.iter().map(toon_scalar).collect();
        out.push_str("\n  ");
        out.push_str(&cells.join(","));
    }
    out
}

/// Encode one JSON-safe value as a TOON scalar token
fn toon_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => toon_string(s),
        composite => toon_string(&composite.to_string()),
    }
}

/// Write a string bare when unambiguous, JSON-quoted otherwise
///
/// Quoting triggers on the cell delimiter, quote and escape characters,
/// control characters, key-value ambiguity (`: `), a leading structural
/// character, surrounding whitespace, and bare tokens that would read back
/// as a number, boolean, or null.
fn toon_string(s: &str) -> String {
    let needs_quotes = s.is_empty()
        || s.trim() != s
        || s.chars().any(|c| matches!(c, ',' | '"' | '\\') || c.is_control())
        || s.contains(": ")
        || s.starts_with('[')
        || s.starts_with('{')
        || matches!(s, "null" | "true" | "false")
        || s.parse::<f64>().is_ok();

    if needs_quotes {
        // JSON string escaping covers quotes, backslashes, and control chars
        serde_json::to_string(s).expect("string serializes")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RowSet {
        RowSet {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![
                vec![json!(1), json!("Alice")],
                vec![json!(2), serde_json::Value::Null],
            ],
        }
    }

    fn empty() -> RowSet {
        RowSet { columns: vec!["id".to_string(), "name".to_string()], rows: vec![] }
    }

    #[test]
    fn test_command_result_success() {
        let result = CommandResult::success("2 rows");
        assert!(result.succeeded);
        assert_eq!(result.rendered_text.as_deref(), Some("2 rows"));
        assert!(result.error_text.is_none());
        assert!(!result.confirmation_required);
    }

    #[test]
    fn test_command_result_failure_carries_marker() {
        let err = SqlwardError::query_failed("syntax error at or near \"FORM\"");
        let result = CommandResult::failure(&err);
        assert!(!result.succeeded);
        assert!(!result.confirmation_required);
        let text = result.error_text.unwrap();
        assert!(text.starts_with("error: "));
        assert!(text.contains("syntax error at or near \"FORM\""));
    }

    #[test]
    fn test_command_result_confirmation_signal() {
        let err = SqlwardError::confirmation_required("statement contains 'DELETE'");
        let result = CommandResult::failure(&err);
        assert!(!result.succeeded);
        assert!(result.confirmation_required);
        assert_eq!(result.error_text.as_deref(), Some("statement contains 'DELETE'"));
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("toon".parse::<OutputFormat>().unwrap(), OutputFormat::Toon);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_table_renders_grid_and_null() {
        let text = render(&sample(), OutputFormat::Table);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with('┌'));
        assert!(lines[1].contains("id"));
        assert!(lines[1].contains("name"));
        assert!(lines[3].contains("Alice"));
        assert!(lines[4].contains("NULL"));
        assert!(lines[5].starts_with('└'));
    }

    #[test]
    fn test_table_minimum_column_width() {
        let rows = RowSet { columns: vec!["a".to_string()], rows: vec![vec![json!("b")]] };
        let text = render(&rows, OutputFormat::Table);
        // width 3 plus one space of padding each side
        assert!(text.lines().next().unwrap().contains("─────"));
    }

    #[test]
    fn test_table_empty_sentinel() {
        assert_eq!(render(&empty(), OutputFormat::Table), NO_RESULTS);
    }

    #[test]
    fn test_json_round_trip() {
        let text = render(&sample(), OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!([{"id": 1, "name": "Alice"}, {"id": 2, "name": null}]));
    }

    #[test]
    fn test_json_empty_is_empty_array() {
        assert_eq!(render(&empty(), OutputFormat::Json), "[]");
    }

    #[test]
    fn test_csv_escaping() {
        let rows = RowSet {
            columns: vec!["name".to_string()],
            rows: vec![vec![json!("Doe, \"Johnny\"")]],
        };
        let text = render(&rows, OutputFormat::Csv);
        assert_eq!(text, "name\n\"Doe, \"\"Johnny\"\"\"\n");
    }

    #[test]
    fn test_csv_plain_cells_unquoted() {
        let text = render(&sample(), OutputFormat::Csv);
        assert_eq!(text, "id,name\n1,Alice\n2,\n");
    }

    #[test]
    fn test_csv_empty_is_empty_string() {
        assert_eq!(render(&empty(), OutputFormat::Csv), "");
    }

    #[test]
    fn test_toon_tabular_shape() {
        let text = render(&sample(), OutputFormat::Toon);
        assert_eq!(text, "[2]{id,name}:\n  1,Alice\n  2,null");
    }

    #[test]
    fn test_toon_quotes_ambiguous_strings() {
        let rows = RowSet {
            columns: vec!["v".to_string()],
            rows: vec![
                vec![json!("a,b")],
                vec![json!("42")],
                vec![json!("null")],
                vec![json!(" padded ")],
            ],
        };
        let text = render(&rows, OutputFormat::Toon);
        assert_eq!(text, "[4]{v}:\n  \"a,b\"\n  \"42\"\n  \"null\"\n  \" padded \"");
    }

    #[test]
    fn test_toon_empty_is_empty_string() {
        assert_eq!(render(&empty(), OutputFormat::Toon), "");
    }
}
