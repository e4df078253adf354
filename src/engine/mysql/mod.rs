//! MySQL Family Adapter
//!
//! Implements [`BackendAdapter`] for MySQL-compatible engines (including
//! MariaDB) on top of `mysql_async`.
//!
//! # Implementation Notes
//! - One connection pool per profile, opened on first use and held until
//!   `release_all`
//! - Enumeration via `SHOW DATABASES` / `SHOW TABLES`; column and index
//!   introspection via `information_schema` scoped to the connected database
//! - Zero dates ("0000-00-00") and other invalid timestamps decode to null
//! - Binary values that are not valid UTF-8 are Base64-encoded
//! - TLS negotiated through rustls when the profile asks for it
//! - Connection establishment is bounded by the shared connect timeout

use mysql_async::{prelude::*, OptsBuilder, Pool, Row, SslOpts, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::config::{ConnectionProfile, SafetyPolicy};
use crate::engine::{
    gate_statement, render_bullets, shape_statement_outcome, BackendAdapter, GatedStatement,
    RowSet, ServerInfo, StatementOutcome, CONNECT_TIMEOUT,
};
use crate::error::{Result, SqlwardError};
use crate::output::{self, CommandResult, OutputFormat};

/// MySQL-family adapter owning one pool per profile
#[derive(Default)]
pub struct MySqlAdapter {
    pools: HashMap<String, Pool>,
}

impl MySqlAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain a connection from the profile's pool, creating the pool on
    /// first use
    async fn conn(&mut self, profile: &str, cfg: &ConnectionProfile) -> Result<mysql_async::Conn> {
        let pool = match self.pools.entry(profile.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let opts = build_opts(cfg)?;
                tracing::debug!(profile, "opening mysql connection pool");
                entry.insert(Pool::new(opts))
            }
        };

        tokio::time::timeout(CONNECT_TIMEOUT, pool.get_conn())
            .await
            .map_err(|_| {
                SqlwardError::connection_failed(format!(
                    "connection to profile '{profile}' timed out after {}s",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| SqlwardError::connection_failed(format!("failed to connect to MySQL: {e}")))
    }

    async fn try_execute(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        statement: &str,
        policy: &SafetyPolicy,
        format: OutputFormat,
        confirmed: bool,
    ) -> Result<String> {
        let gated = gate_statement(statement, policy, confirmed)?;
        let outcome = self.run_statement(profile, cfg, &gated).await?;
        Ok(shape_statement_outcome(outcome, format, gated.notes))
    }

    /// Physically execute a gated statement
    async fn run_statement(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        gated: &GatedStatement,
    ) -> Result<StatementOutcome> {
        let mut conn = self.conn(profile, cfg).await?;
        tracing::debug!(profile, kind = %gated.kind, "executing statement");

        let mut result = conn
            .query_iter(gated.statement.as_str())
            .await
            .map_err(|e| SqlwardError::query_failed(e.to_string()))?;

        // Result-set metadata is present even for empty SELECTs
        match result.columns() {
            Some(columns) => {
                let names: Vec<String> =
                    columns.iter().map(|c| c.name_str().to_string()).collect();
                let raw: Vec<Row> = result
                    .collect()
                    .await
                    .map_err(|e| SqlwardError::query_failed(e.to_string()))?;
                let rows = raw.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
                Ok(StatementOutcome {
                    rows: Some(RowSet { columns: names, rows }),
                    rows_affected: None,
                    last_insert_id: None,
                })
            }
            None => {
                let outcome = StatementOutcome {
                    rows: None,
                    rows_affected: Some(result.affected_rows()),
                    last_insert_id: result.last_insert_id(),
                };
                drop(result);
                Ok(outcome)
            }
        }
    }

    /// Run a fixed row-bearing query and decode it
    async fn query_rows(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        query: &str,
        params: mysql_async::Params,
        columns: &[&str],
    ) -> Result<RowSet> {
        let mut conn = self.conn(profile, cfg).await?;
        let raw: Vec<Row> = conn
            .exec(query, params)
            .await
            .map_err(|e| SqlwardError::engine_error("mysql", e.to_string()))?;
        let rows = raw.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        Ok(RowSet { columns: columns.iter().map(ToString::to_string).collect(), rows })
    }

    /// Run a single-column enumeration query
    async fn query_names(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        query: &str,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn(profile, cfg).await?;
        let raw: Vec<Row> = conn
            .query(query)
            .await
            .map_err(|e| SqlwardError::engine_error("mysql", e.to_string()))?;

        raw.iter()
            .map(|row| {
                row.get(0).ok_or_else(|| {
                    SqlwardError::engine_error("mysql", "failed to extract name column")
                })
            })
            .collect()
    }

    async fn try_describe_columns(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        table: &str,
        format: OutputFormat,
    ) -> Result<String> {
        let query = "SELECT column_name, data_type, is_nullable, column_key, column_default, extra
                     FROM information_schema.columns
                     WHERE table_schema = ? AND table_name = ?
                     ORDER BY ordinal_position";
        let rows = self
            .query_rows(
                profile,
                cfg,
                query,
                mysql_async::Params::Positional(vec![
                    Value::from(cfg.database.as_str()),
                    Value::from(table),
                ]),
                &["column_name", "data_type", "is_nullable", "column_key", "column_default", "extra"],
            )
            .await?;

        if rows.rows.is_empty() {
            return Err(SqlwardError::invalid_input(format!(
                "table '{table}' not found in database '{}'",
                cfg.database
            )));
        }

        Ok(output::render(&rows, format))
    }

    async fn try_list_indexes(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        table: &str,
        format: OutputFormat,
    ) -> Result<String> {
        let query = "SELECT index_name, column_name, IF(non_unique = 0, 'YES', 'NO') AS `unique`,
                            seq_in_index
                     FROM information_schema.statistics
                     WHERE table_schema = ? AND table_name = ?
                     ORDER BY index_name, seq_in_index";
        let rows = self
            .query_rows(
                profile,
                cfg,
                query,
                mysql_async::Params::Positional(vec![
                    Value::from(cfg.database.as_str()),
                    Value::from(table),
                ]),
                &["index_name", "column_name", "unique", "seq_in_index"],
            )
            .await?;

        Ok(output::render(&rows, format))
    }

    async fn try_explain(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        statement: &str,
        format: OutputFormat,
    ) -> Result<String> {
        let mut conn = self.conn(profile, cfg).await?;
        let explain = format!("EXPLAIN {}", statement.trim());
        let mut result = conn
            .query_iter(explain.as_str())
            .await
            .map_err(|e| SqlwardError::query_failed(e.to_string()))?;

        let columns = result
            .columns()
            .ok_or_else(|| SqlwardError::engine_error("mysql", "EXPLAIN returned no result set"))?;
        let names: Vec<String> = columns.iter().map(|c| c.name_str().to_string()).collect();
        let raw: Vec<Row> =
            result.collect().await.map_err(|e| SqlwardError::query_failed(e.to_string()))?;
        let rows = raw.iter().map(decode_row).collect::<Result<Vec<_>>>()?;

        Ok(output::render(&RowSet { columns: names, rows }, format))
    }

    async fn try_test_connectivity(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
    ) -> Result<String> {
        let mut conn = self.conn(profile, cfg).await?;

        let version_row: Row = conn
            .query_first("SELECT VERSION()")
            .await
            .map_err(|e| SqlwardError::engine_error("mysql", e.to_string()))?
            .ok_or_else(|| SqlwardError::engine_error("mysql", "no version returned"))?;
        let version: String = version_row.get(0).ok_or_else(|| {
            SqlwardError::engine_error("mysql", "failed to extract version string")
        })?;

        let db_row: Row = conn
            .query_first("SELECT DATABASE()")
            .await
            .map_err(|e| SqlwardError::engine_error("mysql", e.to_string()))?
            .ok_or_else(|| SqlwardError::engine_error("mysql", "no database returned"))?;
        let database: Option<String> = db_row.get(0);

        let info = ServerInfo {
            server: parse_server_flavor(&version),
            database: database.unwrap_or_else(|| cfg.database.clone()),
            schema: None,
        };
        Ok(info.render())
    }
}

impl BackendAdapter for MySqlAdapter {
    async fn execute_statement(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        statement: &str,
        policy: &SafetyPolicy,
        format: OutputFormat,
        confirmed: bool,
    ) -> CommandResult {
        match self.try_execute(profile, cfg, statement, policy, format, confirmed).await {
            Ok(text) => CommandResult::success(text),
            Err(err) => CommandResult::failure(&err),
        }
    }

    async fn list_databases(&mut self, profile: &str, cfg: &ConnectionProfile) -> CommandResult {
        match self.query_names(profile, cfg, "SHOW DATABASES").await {
            Ok(names) => CommandResult::success(render_bullets(&names)),
            Err(err) => CommandResult::failure(&err),
        }
    }

    async fn list_tables(&mut self, profile: &str, cfg: &ConnectionProfile) -> CommandResult {
        match self.query_names(profile, cfg, "SHOW TABLES").await {
            Ok(names) => CommandResult::success(render_bullets(&names)),
            Err(err) => CommandResult::failure(&err),
        }
    }

    async fn describe_columns(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        table: &str,
        format: OutputFormat,
    ) -> CommandResult {
        match self.try_describe_columns(profile, cfg, table, format).await {
            Ok(text) => CommandResult::success(text),
            Err(err) => CommandResult::failure(&err),
        }
    }

    async fn list_indexes(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        table: &str,
        format: OutputFormat,
    ) -> CommandResult {
        match self.try_list_indexes(profile, cfg, table, format).await {
            Ok(text) => CommandResult::success(text),
            Err(err) => CommandResult::failure(&err),
        }
    }

    async fn explain_statement(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        statement: &str,
        format: OutputFormat,
    ) -> CommandResult {
        match self.try_explain(profile, cfg, statement, format).await {
            Ok(text) => CommandResult::success(text),
            Err(err) => CommandResult::failure(&err),
        }
    }

    async fn test_connectivity(&mut self, profile: &str, cfg: &ConnectionProfile) -> CommandResult {
        match self.try_test_connectivity(profile, cfg).await {
            Ok(text) => CommandResult::success(text),
            Err(err) => CommandResult::failure(&err),
        }
    }

    async fn release_all(&mut self) {
        for (profile, pool) in self.pools.drain() {
            tracing::debug!(profile = %profile, "closing mysql connection pool");
            if let Err(e) = pool.disconnect().await {
                tracing::warn!(profile = %profile, error = %e, "pool teardown failed");
            }
        }
    }
}

/// Build connection options from a profile
fn build_opts(cfg: &ConnectionProfile) -> Result<OptsBuilder> {
    let password = cfg.resolve_password()?;

    let mut opts = OptsBuilder::default()
        .ip_or_hostname(cfg.host.as_str())
        .tcp_port(cfg.port)
        .user(Some(cfg.user.as_str()))
        .pass(Some(password))
        .db_name(Some(cfg.database.as_str()));

    if cfg.tls {
        opts = opts.ssl_opts(SslOpts::default());
    }

    Ok(opts)
}

/// Detect MySQL vs MariaDB from the VERSION() string
fn parse_server_flavor(version: &str) -> String {
    if version.to_uppercase().contains("MARIADB") {
        let number = version.split('-').next().unwrap_or("unknown");
        format!("MariaDB {number}")
    } else {
        let number = version.split_whitespace().next().unwrap_or(version);
        format!("MySQL {number}")
    }
}

/// Decode one driver row into JSON-safe values
fn decode_row(row: &Row) -> Result<Vec<serde_json::Value>> {
    (0..row.len())
        .map(|idx| {
            let value = row.as_ref(idx).ok_or_else(|| {
                SqlwardError::query_failed(format!("failed to read value at column {idx}"))
            })?;
            Ok(decode_value(value))
        })
        .collect()
}

/// Normalize one driver value to a JSON-safe scalar
///
/// Timestamps become ISO-8601 strings, with invalid dates (zero month or day)
/// becoming null. Binary payloads that are not UTF-8 become Base64 text.
/// Non-finite floats become null.
fn decode_value(value: &Value) -> serde_json::Value {
    match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => serde_json::Value::String(s.to_string()),
            Err(_) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                serde_json::Value::String(encoded)
            }
        },

        Value::Int(i) => serde_json::Value::Number((*i).into()),

        Value::UInt(u) => serde_json::json!(*u),

        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),

        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),

        Value::Date(year, month, day, hour, minute, second, micro) => {
            let timestamp = chrono::NaiveDate::from_ymd_opt(
                i32::from(*year),
                u32::from(*month),
                u32::from(*day),
            )
            .and_then(|date| {
                date.and_hms_micro_opt(
                    u32::from(*hour),
                    u32::from(*minute),
                    u32::from(*second),
                    *micro,
                )
            });
            match timestamp {
                Some(ts) => {
                    serde_json::Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
                }
                None => serde_json::Value::Null,
            }
        }

        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!(
                "{sign}{total_hours}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}
