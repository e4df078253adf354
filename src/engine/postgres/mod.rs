//! Postgres Family Adapter
//!
//! Implements [`BackendAdapter`] for Postgres-compatible engines on top of
//! `tokio-postgres`.
//!
//! # Implementation Notes
//! - One cached client (plus its spawned connection task) per profile; a
//!   client the backend has closed is reopened transparently on next use
//! - Table and column lookups are qualified by the profile's schema,
//!   defaulting to `public` — the one data-shape difference from the MySQL
//!   family
//! - BYTEA is Base64-encoded, timestamps become ISO-8601 strings, JSON/JSONB
//!   pass through as nested JSON
//! - Connection establishment is bounded by the shared connect timeout

use std::collections::HashMap;
use tokio_postgres::types::{FromSql, ToSql};
use tokio_postgres::{Client, Config, NoTls, Row};

use crate::config::{ConnectionProfile, SafetyPolicy};
use crate::engine::{
    gate_statement, render_bullets, shape_statement_outcome, BackendAdapter, GatedStatement,
    RowSet, ServerInfo, StatementOutcome, CONNECT_TIMEOUT,
};
use crate::error::{Result, SqlwardError};
use crate::output::{self, CommandResult, OutputFormat};

/// One live backend connection: the client handle and its I/O task
struct Session {
    client: Client,
    task: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Postgres-family adapter owning one cached client per profile
#[derive(Default)]
pub struct PostgresAdapter {
    sessions: HashMap<String, Session>,
}

impl PostgresAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self { sessions: HashMap::new() }
    }

    /// Obtain the profile's cached client, opening or reopening as needed
    async fn client(&mut self, profile: &str, cfg: &ConnectionProfile) -> Result<&Client> {
        let reopen = self.sessions.get(profile).map_or(true, |s| s.client.is_closed());

        if reopen {
            if let Some(stale) = self.sessions.remove(profile) {
                tracing::debug!(profile, "cached client closed by backend; reopening");
                stale.task.abort();
            }
            let session = open_session(profile, cfg).await?;
            self.sessions.insert(profile.to_string(), session);
        }

        self.sessions
            .get(profile)
            .map(|session| &session.client)
            .ok_or_else(|| SqlwardError::connection_failed("connection cache is inconsistent"))
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
        let client = self.client(profile, cfg).await?;
        tracing::debug!(profile, kind = %gated.kind, "executing statement");
        let outcome = run_statement(client, &gated).await?;
        Ok(shape_statement_outcome(outcome, format, gated.notes))
    }

    async fn try_list_databases(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
    ) -> Result<String> {
        let client = self.client(profile, cfg).await?;
        let query = "SELECT datname
                     FROM pg_catalog.pg_database
                     WHERE datistemplate = false
                     ORDER BY datname";
        let names = query_names(client, query, &[]).await?;
        Ok(render_bullets(&names))
    }

    async fn try_list_tables(&mut self, profile: &str, cfg: &ConnectionProfile) -> Result<String> {
        let schema = cfg.schema_or_default().to_string();
        let client = self.client(profile, cfg).await?;
        let query = "SELECT table_name
                     FROM information_schema.tables
                     WHERE table_schema = $1
                     AND table_type = 'BASE TABLE'
                     ORDER BY table_name";
        let names = query_names(client, query, &[&schema]).await?;
        Ok(render_bullets(&names))
    }

    async fn try_describe_columns(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        table: &str,
        format: OutputFormat,
    ) -> Result<String> {
        let schema = cfg.schema_or_default().to_string();
        let client = self.client(profile, cfg).await?;
        let query = "SELECT column_name, data_type, is_nullable, column_default
                     FROM information_schema.columns
                     WHERE table_schema = $1 AND table_name = $2
                     ORDER BY ordinal_position";
        let rows = query_rows(
            client,
            query,
            &[&schema, &table],
            &["column_name", "data_type", "is_nullable", "column_default"],
        )
        .await?;

        if rows.rows.is_empty() {
            return Err(SqlwardError::invalid_input(format!(
                "table '{table}' not found in schema '{schema}'"
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
        let schema = cfg.schema_or_default().to_string();
        let client = self.client(profile, cfg).await?;
        let query = "SELECT indexname, indexdef
                     FROM pg_indexes
                     WHERE schemaname = $1 AND tablename = $2
                     ORDER BY indexname";
        let raw = client.query(query, &[&schema, &table]).await.map_err(|e| {
            SqlwardError::engine_error("postgres", e.to_string())
        })?;

        let mut rows = Vec::with_capacity(raw.len());
        for row in &raw {
            let name: String = fetch(row, 0)?.unwrap_or_default();
            let definition: String = fetch(row, 1)?.unwrap_or_default();
            rows.push(vec![
                serde_json::Value::String(name),
                serde_json::Value::Bool(definition.contains("UNIQUE INDEX")),
                serde_json::Value::String(extract_index_columns(&definition).join(", ")),
            ]);
        }

        let set = RowSet {
            columns: vec!["index_name".to_string(), "unique".to_string(), "columns".to_string()],
            rows,
        };
        Ok(output::render(&set, format))
    }

    async fn try_explain(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
        statement: &str,
        format: OutputFormat,
    ) -> Result<String> {
        let client = self.client(profile, cfg).await?;
        let explain = format!("EXPLAIN {}", statement.trim());
        let stmt = client
            .prepare(&explain)
            .await
            .map_err(|e| SqlwardError::query_failed(e.to_string()))?;
        let raw = client
            .query(&stmt, &[])
            .await
            .map_err(|e| SqlwardError::query_failed(e.to_string()))?;

        let columns: Vec<String> =
            stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let rows = raw.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        Ok(output::render(&RowSet { columns, rows }, format))
    }

    async fn try_test_connectivity(
        &mut self,
        profile: &str,
        cfg: &ConnectionProfile,
    ) -> Result<String> {
        let client = self.client(profile, cfg).await?;
        let row = client
            .query_one("SELECT version(), current_database(), current_schema", &[])
            .await
            .map_err(|e| SqlwardError::engine_error("postgres", e.to_string()))?;

        let version: String = fetch(&row, 0)?.unwrap_or_default();
        let database: String = fetch(&row, 1)?.unwrap_or_default();
        let schema: Option<String> = fetch(&row, 2)?;

        let info = ServerInfo { server: short_version(&version), database, schema };
        Ok(info.render())
    }
}

impl BackendAdapter for PostgresAdapter {
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
        match self.try_list_databases(profile, cfg).await {
            Ok(text) => CommandResult::success(text),
            Err(err) => CommandResult::failure(&err),
        }
    }

    async fn list_tables(&mut self, profile: &str, cfg: &ConnectionProfile) -> CommandResult {
        match self.try_list_tables(profile, cfg).await {
            Ok(text) => CommandResult::success(text),
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
        for (profile, session) in self.sessions.drain() {
            tracing::debug!(profile = %profile, "closing postgres connection");
            drop(session.client);
            session.task.abort();
        }
    }
}

/// Open one client and spawn its connection task
async fn open_session(profile: &str, cfg: &ConnectionProfile) -> Result<Session> {
    if cfg.tls {
        return Err(SqlwardError::connection_failed(
            "TLS is not supported for the postgres family; set tls = false",
        ));
    }

    let pg_config = build_pg_config(cfg)?;
    tracing::debug!(profile, "opening postgres connection");

    let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
        SqlwardError::connection_failed(format!("failed to connect to PostgreSQL: {e}"))
    })?;

    // Connection errors are not logged to prevent credential leakage
    let task = tokio::spawn(async move {
        let _ = connection.await;
    });

    Ok(Session { client, task })
}

/// Build a driver config from a profile
fn build_pg_config(cfg: &ConnectionProfile) -> Result<Config> {
    let password = cfg.resolve_password()?;

    let mut pg_config = Config::new();
    pg_config
        .host(&cfg.host)
        .port(cfg.port)
        .user(&cfg.user)
        .password(password)
        .dbname(&cfg.database)
        .connect_timeout(CONNECT_TIMEOUT);

    Ok(pg_config)
}

/// First two words of the version() string, e.g. "PostgreSQL 15.3"
fn short_version(version: &str) -> String {
    version.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
}

/// Execute a gated statement, routing on whether it returns rows
async fn run_statement(client: &Client, gated: &GatedStatement) -> Result<StatementOutcome> {
    let stmt = client
        .prepare(&gated.statement)
        .await
        .map_err(|e| SqlwardError::query_failed(e.to_string()))?;

    if stmt.columns().is_empty() {
        let affected = client
            .execute(&stmt, &[])
            .await
            .map_err(|e| SqlwardError::query_failed(e.to_string()))?;
        // Postgres reports no generated identifier through this path
        Ok(StatementOutcome { rows: None, rows_affected: Some(affected), last_insert_id: None })
    } else {
        let raw = client
            .query(&stmt, &[])
            .await
            .map_err(|e| SqlwardError::query_failed(e.to_string()))?;
        let columns: Vec<String> =
            stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let rows = raw.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        Ok(StatementOutcome {
            rows: Some(RowSet { columns, rows }),
            rows_affected: None,
            last_insert_id: None,
        })
    }
}

/// Run a fixed row-bearing query and decode it
async fn query_rows(
    client: &Client,
    query: &str,
    params: &[&(dyn ToSql + Sync)],
    columns: &[&str],
) -> Result<RowSet> {
    let raw = client
        .query(query, params)
        .await
        .map_err(|e| SqlwardError::engine_error("postgres", e.to_string()))?;
    let rows = raw.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
    Ok(RowSet { columns: columns.iter().map(ToString::to_string).collect(), rows })
}

/// Run a single-column enumeration query
async fn query_names(
    client: &Client,
    query: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<String>> {
    let raw = client
        .query(query, params)
        .await
        .map_err(|e| SqlwardError::engine_error("postgres", e.to_string()))?;

    raw.iter().map(|row| fetch::<String>(row, 0).map(Option::unwrap_or_default)).collect()
}

/// Typed cell access with a structured decode error
fn fetch<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>> {
    row.try_get(idx)
        .map_err(|e| SqlwardError::query_failed(format!("failed to decode column {idx}: {e}")))
}

/// Decode one driver row into JSON-safe values
fn decode_row(row: &Row) -> Result<Vec<serde_json::Value>> {
    (0..row.columns().len()).map(|idx| decode_cell(row, idx)).collect()
}

/// Normalize one typed cell to a JSON-safe scalar
///
/// Timestamps become ISO-8601 strings, BYTEA becomes Base64 text, non-finite
/// floats become null, JSON/JSONB pass through. Types without a dedicated arm
/// fall back to text decoding; a type the driver cannot read as text surfaces
/// as a query failure naming the type.
fn decode_cell(row: &Row, idx: usize) -> Result<serde_json::Value> {
    use tokio_postgres::types::Type;

    let col_type = row.columns()[idx].type_();

    let value = match *col_type {
        Type::BOOL => fetch::<bool>(row, idx)?.map_or(serde_json::Value::Null, serde_json::Value::Bool),

        Type::INT2 => fetch::<i16>(row, idx)?
            .map_or(serde_json::Value::Null, |v| serde_json::Value::Number(v.into())),
        Type::INT4 => fetch::<i32>(row, idx)?
            .map_or(serde_json::Value::Null, |v| serde_json::Value::Number(v.into())),
        Type::INT8 => fetch::<i64>(row, idx)?
            .map_or(serde_json::Value::Null, |v| serde_json::Value::Number(v.into())),

        Type::FLOAT4 => fetch::<f32>(row, idx)?
            .and_then(|v| serde_json::Number::from_f64(f64::from(v)))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Type::FLOAT8 => fetch::<f64>(row, idx)?
            .and_then(serde_json::Number::from_f64)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),

        Type::VARCHAR | Type::TEXT | Type::BPCHAR | Type::NAME => {
            fetch::<String>(row, idx)?.map_or(serde_json::Value::Null, serde_json::Value::String)
        }

        Type::JSON | Type::JSONB => {
            fetch::<serde_json::Value>(row, idx)?.unwrap_or(serde_json::Value::Null)
        }

        Type::BYTEA => match fetch::<Vec<u8>>(row, idx)? {
            Some(bytes) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                serde_json::Value::String(encoded)
            }
            None => serde_json::Value::Null,
        },

        Type::TIMESTAMP => fetch::<chrono::NaiveDateTime>(row, idx)?
            .map_or(serde_json::Value::Null, |v| {
                serde_json::Value::String(v.format("%Y-%m-%dT%H:%M:%S").to_string())
            }),
        Type::TIMESTAMPTZ => fetch::<chrono::DateTime<chrono::Utc>>(row, idx)?
            .map_or(serde_json::Value::Null, |v| serde_json::Value::String(v.to_rfc3339())),
        Type::DATE => fetch::<chrono::NaiveDate>(row, idx)?
            .map_or(serde_json::Value::Null, |v| {
                serde_json::Value::String(v.format("%Y-%m-%d").to_string())
            }),
        Type::TIME => fetch::<chrono::NaiveTime>(row, idx)?
            .map_or(serde_json::Value::Null, |v| {
                serde_json::Value::String(v.format("%H:%M:%S").to_string())
            }),

        Type::UUID => fetch::<uuid::Uuid>(row, idx)?
            .map_or(serde_json::Value::Null, |v| serde_json::Value::String(v.to_string())),

        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(v) => v.map_or(serde_json::Value::Null, serde_json::Value::String),
            Err(e) => {
                return Err(SqlwardError::query_failed(format!(
                    "cannot represent column type '{}' as text: {e}",
                    col_type.name()
                )))
            }
        },
    };

    Ok(value)
}

/// Extract column names from an index definition
///
/// Example: "CREATE INDEX idx_users_email ON public.users USING btree (email)"
fn extract_index_columns(index_def: &str) -> Vec<String> {
    if let Some(start) = index_def.rfind('(') {
        if let Some(end) = index_def.rfind(')') {
            if start < end {
                let column_list = &index_def[start + 1..end];
                return column_list.split(',').map(|s| s.trim().to_string()).collect();
            }
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineFamily;

    fn profile() -> ConnectionProfile {
        ConnectionProfile {
            engine: EngineFamily::Postgres,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: Some("postgres".to_string()),
            password_env: None,
            database: "postgres".to_string(),
            schema: None,
            tls: false,
        }
    }

    #[test]
    fn test_build_pg_config_requires_password_source() {
        let mut cfg = profile();
        cfg.password = None;
        let result = build_pg_config(&cfg);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_short_version() {
        assert_eq!(
            short_version("PostgreSQL 15.3 on x86_64-pc-linux-gnu, compiled by gcc"),
            "PostgreSQL 15.3"
        );
        assert_eq!(short_version("PostgreSQL"), "PostgreSQL");
    }

    #[test]
    fn test_extract_index_columns() {
        let single = "CREATE INDEX idx_users_email ON public.users USING btree (email)";
        assert_eq!(extract_index_columns(single), vec!["email"]);

        let multi = "CREATE UNIQUE INDEX idx_composite ON public.orders USING btree (user_id, order_date)";
        assert_eq!(extract_index_columns(multi), vec!["user_id", "order_date"]);

        assert!(extract_index_columns("no parens here").is_empty());
    }

    #[tokio::test]
    async fn test_tls_profile_rejected() {
        let mut cfg = profile();
        cfg.tls = true;
        let err = open_session("dev", &cfg).await.unwrap_err();
        assert_eq!(err.error_code(), "CONNECTION_FAILED");
        assert!(err.message().contains("TLS"));
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_connectivity_round_trip() {
        let cfg = profile();
        let mut adapter = PostgresAdapter::new();
        let result = adapter.test_connectivity("dev", &cfg).await;
        assert!(result.succeeded, "connectivity failed: {:?}", result.error_text);
        let text = result.rendered_text.unwrap();
        assert!(text.contains("PostgreSQL"));
        assert!(text.contains("schema:"));
        adapter.release_all().await;
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_client_cached_across_calls() {
        let cfg = profile();
        let mut adapter = PostgresAdapter::new();
        let _ = adapter.list_tables("dev", &cfg).await;
        let _ = adapter.list_tables("dev", &cfg).await;
        assert_eq!(adapter.sessions.len(), 1);
        adapter.release_all().await;
        assert!(adapter.sessions.is_empty());
    }
}
