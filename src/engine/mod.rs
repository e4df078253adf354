//! Backend Adapter Contract and Core Types
//!
//! One adapter per engine family implements [`BackendAdapter`]. Each adapter
//! owns its live connections, keyed by profile name, created on first use and
//! held until `release_all`.
//!
//! # Boundary Rules
//! - Adapters never return `Err` to callers: every failure becomes a failed
//!   [`CommandResult`] at this boundary
//! - Driver values are normalized to JSON-safe scalars here (timestamps to
//!   ISO-8601, binary to base64, non-finite floats to null) so every output
//!   encoding consumes the same [`RowSet`] shape

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::config::{ConnectionProfile, SafetyPolicy};
use crate::error::{Result, SqlwardError};
use crate::output::{self, CommandResult, OutputFormat};
use crate::safety::{self, StatementKind};

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Bound on connection establishment; query execution itself is unbounded
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Supported engine families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineFamily {
    /// MySQL-compatible engines (includes MariaDB); the primary family
    #[default]
    MySql,
    /// Postgres-compatible engines
    Postgres,
}

impl EngineFamily {
    /// Get the family name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JSON-safe tabular result: ordered columns plus rows of scalar values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowSet {
    /// Column names in result order
    pub columns: Vec<String>,

    /// Rows in result order, one value per column
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RowSet {
    /// Result set with columns but no rows
    #[must_use]
    pub fn empty(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }
}

/// Outcome of physically executing one statement
#[derive(Debug, Clone)]
pub struct StatementOutcome {
    /// Result set for row-bearing statement kinds
    pub rows: Option<RowSet>,

    /// Affected-row count for mutating statement kinds
    pub rows_affected: Option<u64>,

    /// Generated identifier, when the engine reports one
    pub last_insert_id: Option<u64>,
}

/// Round-trip connectivity information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server version / flavor string
    pub server: String,

    /// Active database name
    pub database: String,

    /// Active schema, for families that have one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl ServerInfo {
    /// One-line rendering for `test_connectivity` output
    #[must_use]
    pub fn render(&self) -> String {
        match &self.schema {
            Some(schema) => {
                format!("{} (database: {}, schema: {})", self.server, self.database, schema)
            }
            None => format!("{} (database: {})", self.server, self.database),
        }
    }
}

/// Uniform asynchronous contract every engine family implements
///
/// All operations take the profile name and its resolved configuration; the
/// adapter keys its live connections by the name. Methods return
/// [`CommandResult`] directly — failures are converted at this boundary and
/// never propagate as `Err`.
pub trait BackendAdapter {
    /// Run the full gated pipeline for one statement
    ///
    /// Blacklist, then confirmation (skipped when `confirmed` records prior
    /// consent), then advisories, then SELECT limit injection, then physical
    /// execution and shaping.
    fn execute_statement(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        statement: &str,
        policy: &SafetyPolicy,
        format: OutputFormat,
        confirmed: bool,
    ) -> impl Future<Output = CommandResult> + Send;

    /// Enumerate databases visible to the connection
    fn list_databases(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
    ) -> impl Future<Output = CommandResult> + Send;

    /// Enumerate tables in the active database (and schema, where relevant)
    fn list_tables(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
    ) -> impl Future<Output = CommandResult> + Send;

    /// Describe the columns of one table
    fn describe_columns(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        table: &str,
        format: OutputFormat,
    ) -> impl Future<Output = CommandResult> + Send;

    /// List the indexes of one table
    fn list_indexes(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        table: &str,
        format: OutputFormat,
    ) -> impl Future<Output = CommandResult> + Send;

    /// Run the engine's EXPLAIN over a statement
    fn explain_statement(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        statement: &str,
        format: OutputFormat,
    ) -> impl Future<Output = CommandResult> + Send;

    /// Trivial round-trip returning server version and active database
    fn test_connectivity(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
    ) -> impl Future<Output = CommandResult> + Send;

    /// Close every owned connection and clear the profile map; idempotent
    fn release_all(&mut self) -> impl Future<Output = ()> + Send;
}

/// A statement that passed the gate, plus the notes to print above its output
#[derive(Debug, Clone)]
pub(crate) struct GatedStatement {
    pub statement: String,
    pub kind: StatementKind,
    pub notes: Vec<String>,
}

/// Run the policy gate over a statement before any connection is touched
///
/// Returns the (possibly limit-injected) statement text and the advisory
/// lines, or the blocking/deferring error.
pub(crate) fn gate_statement(
    statement: &str,
    policy: &SafetyPolicy,
    confirmed: bool,
) -> Result<GatedStatement> {
    let verdict = safety::evaluate(statement, policy);

    if !verdict.allowed {
        let reason = verdict.block_reason.unwrap_or_else(|| "blocked by policy".to_string());
        tracing::warn!(reason = %reason, "statement blocked");
        return Err(SqlwardError::policy_blocked(reason));
    }

    if verdict.confirmation_required && !confirmed {
        let message = verdict
            .confirmation_message
            .unwrap_or_else(|| "explicit confirmation is required".to_string());
        return Err(SqlwardError::confirmation_required(message));
    }

    let mut notes: Vec<String> = verdict.advisories.iter().map(safety::Advisory::render).collect();

    let kind = safety::classify(statement);
    let gated = safety::apply_default_limit(statement, policy.row_limit);
    if gated != statement {
        notes.push(format!("note: LIMIT {} appended to unbounded SELECT", policy.row_limit));
    }

    Ok(GatedStatement { statement: gated, kind, notes })
}

/// Shape a statement outcome into rendered text
///
/// Result-bearing outcomes get a row count header above the encoded body;
/// mutating outcomes report the affected-row count and any generated
/// identifier. Advisory notes always come first.
pub(crate) fn shape_statement_outcome(
    outcome: StatementOutcome,
    format: OutputFormat,
    notes: Vec<String>,
) -> String {
    let mut sections = notes;

    if let Some(rows) = outcome.rows {
        sections.push(format!("{} row(s)", rows.rows.len()));
        sections.push(output::render(&rows, format));
    } else {
        let affected = outcome.rows_affected.unwrap_or(0);
        let mut line = format!("{affected} row(s) affected");
        if let Some(id) = outcome.last_insert_id {
            line.push_str(&format!("; last insert id {id}"));
        }
        sections.push(line);
    }

    sections.join("\n")
}

/// Render a flat name list as bullet text
pub(crate) fn render_bullets(items: &[String]) -> String {
    if items.is_empty() {
        output::NO_RESULTS.to_string()
    } else {
        items.iter().map(|item| format!("- {item}")).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> SafetyPolicy {
        SafetyPolicy {
            row_limit: 100,
            confirm_keywords: vec!["DELETE".to_string(), "UPDATE".to_string()],
            blacklist: vec!["DROP DATABASE".to_string()],
        }
    }

    #[test]
    fn test_engine_family_serialization() {
        assert_eq!(serde_json::to_string(&EngineFamily::MySql).unwrap(), r#""mysql""#);
        assert_eq!(serde_json::to_string(&EngineFamily::Postgres).unwrap(), r#""postgres""#);
    }

    #[test]
    fn test_engine_family_default_is_primary() {
        assert_eq!(EngineFamily::default(), EngineFamily::MySql);
    }

    #[test]
    fn test_gate_blocks_blacklisted() {
        let err = gate_statement("DROP DATABASE prod", &policy(), false).unwrap_err();
        assert_eq!(err.error_code(), "POLICY_BLOCKED");
        assert!(err.message().contains("DROP DATABASE"));
    }

    #[test]
    fn test_gate_blacklist_ignores_consent() {
        let err = gate_statement("DROP DATABASE prod", &policy(), true).unwrap_err();
        assert_eq!(err.error_code(), "POLICY_BLOCKED");
    }

    #[test]
    fn test_gate_defers_unconfirmed_keyword() {
        let err = gate_statement("DELETE FROM users WHERE id = 1", &policy(), false).unwrap_err();
        assert_eq!(err.error_code(), "CONFIRMATION_REQUIRED");
    }

    #[test]
    fn test_gate_consent_skips_confirmation_only() {
        let gated = gate_statement("DELETE FROM users WHERE id = 1", &policy(), true).unwrap();
        assert_eq!(gated.statement, "DELETE FROM users WHERE id = 1");
        assert_eq!(gated.kind, StatementKind::Delete);
        assert!(gated.notes.is_empty());
    }

    #[test]
    fn test_gate_injects_limit_with_note() {
        let gated = gate_statement("SELECT * FROM users", &policy(), false).unwrap();
        assert_eq!(gated.statement, "SELECT * FROM users LIMIT 100");
        assert_eq!(gated.notes.len(), 3);
        assert!(gated.notes[0].contains("SELECT *"));
        assert!(gated.notes[1].contains("no LIMIT"));
        assert!(gated.notes[2].contains("LIMIT 100 appended"));
    }

    #[test]
    fn test_gate_leaves_bounded_select_alone() {
        let gated = gate_statement("SELECT id FROM users LIMIT 5", &policy(), false).unwrap();
        assert_eq!(gated.statement, "SELECT id FROM users LIMIT 5");
        assert!(gated.notes.is_empty());
    }

    #[test]
    fn test_shape_result_bearing_outcome() {
        let outcome = StatementOutcome {
            rows: Some(RowSet {
                columns: vec!["id".to_string()],
                rows: vec![vec![json!(1)], vec![json!(2)]],
            }),
            rows_affected: None,
            last_insert_id: None,
        };
        let text = shape_statement_outcome(outcome, OutputFormat::Json, vec![]);
        assert!(text.starts_with("2 row(s)\n"));
        assert!(text.contains("\"id\": 1"));
    }

    #[test]
    fn test_shape_mutating_outcome_with_generated_id() {
        let outcome =
            StatementOutcome { rows: None, rows_affected: Some(1), last_insert_id: Some(42) };
        let text = shape_statement_outcome(outcome, OutputFormat::Table, vec![]);
        assert_eq!(text, "1 row(s) affected; last insert id 42");
    }

    #[test]
    fn test_shape_prepends_notes() {
        let outcome = StatementOutcome { rows: None, rows_affected: Some(3), last_insert_id: None };
        let text =
            shape_statement_outcome(outcome, OutputFormat::Table, vec!["warning: x".to_string()]);
        assert_eq!(text, "warning: x\n3 row(s) affected");
    }

    #[test]
    fn test_render_bullets() {
        let items = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(render_bullets(&items), "- alpha\n- beta");
        assert_eq!(render_bullets(&[]), output::NO_RESULTS);
    }
}
