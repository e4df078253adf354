//! Dispatcher Facade and Connection Registry
//!
//! The single entry point callers use: resolve the profile, select the engine
//! family's adapter (creating it lazily), and delegate the operation. One
//! adapter instance exists per family, shared by every profile of that
//! family; each adapter keys its live connections by profile name.
//!
//! No locking: this process serves one logical session, so at most one
//! statement is in flight and the lazy-create step is a plain check-then-
//! create on owned maps behind `&mut self`. If concurrent execution is ever
//! added, that step must become atomic.

use std::collections::HashMap;

use crate::config::Configuration;
use crate::engine::{BackendAdapter, EngineFamily};
use crate::error::{Result, SqlwardError};
use crate::output::{CommandResult, OutputFormat};

#[cfg(feature = "mysql")]
use crate::engine::mysql::MySqlAdapter;

#[cfg(feature = "postgres")]
use crate::engine::postgres::PostgresAdapter;

/// The seven operations the client exposes
#[derive(Debug, Clone)]
pub enum Operation {
    /// Execute a statement through the full safety pipeline
    Execute {
        statement: String,
        format: Option<OutputFormat>,
        /// Caller-recorded consent; skips only the confirmation check
        confirmed: bool,
    },
    /// Enumerate databases
    ListDatabases,
    /// Enumerate tables
    ListTables,
    /// Describe one table's columns
    DescribeColumns { table: String, format: Option<OutputFormat> },
    /// List one table's indexes
    ListIndexes { table: String, format: Option<OutputFormat> },
    /// Show the engine's execution plan
    Explain { statement: String, format: Option<OutputFormat> },
    /// Round-trip connectivity check
    TestConnectivity,
}

impl Operation {
    /// Operation name, for logging
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Execute { .. } => "execute-statement",
            Self::ListDatabases => "list-databases",
            Self::ListTables => "list-tables",
            Self::DescribeColumns { .. } => "describe-columns",
            Self::ListIndexes { .. } => "list-indexes",
            Self::Explain { .. } => "explain-statement",
            Self::TestConnectivity => "test-connectivity",
        }
    }
}

/// Closed set of adapter instances, selected by engine family
pub enum BackendHandle {
    #[cfg(feature = "mysql")]
    MySql(MySqlAdapter),

    #[cfg(feature = "postgres")]
    Postgres(PostgresAdapter),
}

impl BackendHandle {
    fn create(family: EngineFamily) -> Result<Self> {
        match family {
            #[cfg(feature = "mysql")]
            EngineFamily::MySql => Ok(Self::MySql(MySqlAdapter::new())),

            #[cfg(feature = "postgres")]
            EngineFamily::Postgres => Ok(Self::Postgres(PostgresAdapter::new())),

            #[allow(unreachable_patterns)]
            other => Err(SqlwardError::config_error(format!(
                "engine family '{other}' is not enabled in this build"
            ))),
        }
    }
}

impl BackendAdapter for BackendHandle {
    async fn execute_statement(
        &mut self,
        profile: &str,
        cfg: &crate::config::ConnectionProfile,
        statement: &str,
        policy: &crate::config::SafetyPolicy,
        format: OutputFormat,
        confirmed: bool,
    ) -> CommandResult {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(adapter) => {
                adapter.execute_statement(profile, cfg, statement, policy, format, confirmed).await
            }
            #[cfg(feature = "postgres")]
            Self::Postgres(adapter) => {
                adapter.execute_statement(profile, cfg, statement, policy, format, confirmed).await
            }
        }
    }

    async fn list_databases(
        &mut self,
        profile: &str,
        cfg: &crate::config::ConnectionProfile,
    ) -> CommandResult {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(adapter) => adapter.list_databases(profile, cfg).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(adapter) => adapter.list_databases(profile, cfg).await,
        }
    }

    async fn list_tables(
        &mut self,
        profile: &str,
        cfg: &crate::config::ConnectionProfile,
    ) -> CommandResult {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(adapter) => adapter.list_tables(profile, cfg).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(adapter) => adapter.list_tables(profile, cfg).await,
        }
    }

    async fn describe_columns(
        &mut self,
        profile: &str,
        cfg: &crate::config::ConnectionProfile,
        table: &str,
        format: OutputFormat,
    ) -> CommandResult {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(adapter) => adapter.describe_columns(profile, cfg, table, format).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(adapter) => adapter.describe_columns(profile, cfg, table, format).await,
        }
    }

    async fn list_indexes(
        &mut self,
        profile: &str,
        cfg: &crate::config::ConnectionProfile,
        table: &str,
        format: OutputFormat,
    ) -> CommandResult {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(adapter) => adapter.list_indexes(profile, cfg, table, format).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(adapter) => adapter.list_indexes(profile, cfg, table, format).await,
        }
    }

    async fn explain_statement(
        &mut self,
        profile: &str,
        cfg: &crate::config::ConnectionProfile,
        statement: &str,
        format: OutputFormat,
    ) -> CommandResult {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(adapter) => adapter.explain_statement(profile, cfg, statement, format).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(adapter) => {
                adapter.explain_statement(profile, cfg, statement, format).await
            }
        }
    }

    async fn test_connectivity(
        &mut self,
        profile: &str,
        cfg: &crate::config::ConnectionProfile,
    ) -> CommandResult {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(adapter) => adapter.test_connectivity(profile, cfg).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(adapter) => adapter.test_connectivity(profile, cfg).await,
        }
    }

    async fn release_all(&mut self) {
        match self {
            #[cfg(feature = "mysql")]
            Self::MySql(adapter) => adapter.release_all().await,
            #[cfg(feature = "postgres")]
            Self::Postgres(adapter) => adapter.release_all().await,
        }
    }
}

/// Lazily-created adapter instances, one per engine family
#[derive(Default)]
pub struct ConnectionRegistry {
    adapters: HashMap<EngineFamily, BackendHandle>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain the family's adapter, creating it on first use
    fn adapter(&mut self, family: EngineFamily) -> Result<&mut BackendHandle> {
        if !self.adapters.contains_key(&family) {
            tracing::debug!(family = %family, "creating backend adapter");
            let handle = BackendHandle::create(family)?;
            self.adapters.insert(family, handle);
        }
        self.adapters
            .get_mut(&family)
            .ok_or_else(|| SqlwardError::config_error("adapter registry is inconsistent"))
    }

    /// Release every adapter's connections and drop the adapters; idempotent
    async fn release_all(&mut self) {
        for handle in self.adapters.values_mut() {
            handle.release_all().await;
        }
        self.adapters.clear();
    }
}

/// Single entry point for callers
pub struct Dispatcher {
    config: Configuration,
    registry: ConnectionRegistry,
}

impl Dispatcher {
    #[must_use]
    pub fn new(config: Configuration) -> Self {
        Self { config, registry: ConnectionRegistry::new() }
    }

    /// The configuration this dispatcher serves
    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Resolve the profile, obtain the family adapter, and run one operation
    ///
    /// Every failure, including configuration errors, comes back as a failed
    /// [`CommandResult`]; this method never returns `Err`.
    pub async fn dispatch(&mut self, profile: Option<&str>, operation: Operation) -> CommandResult {
        let (name, cfg) = match self.config.resolve_profile(profile) {
            Ok(resolved) => resolved,
            Err(err) => return CommandResult::failure(&err),
        };

        if let Err(err) = check_format(&operation) {
            return CommandResult::failure(&err);
        }

        tracing::debug!(profile = name, operation = operation.name(), family = %cfg.engine, "dispatching");

        let adapter = match self.registry.adapter(cfg.engine) {
            Ok(adapter) => adapter,
            Err(err) => return CommandResult::failure(&err),
        };

        let default_format = self.config.default_format;
        match operation {
            Operation::Execute { statement, format, confirmed } => {
                adapter
                    .execute_statement(
                        name,
                        cfg,
                        &statement,
                        &self.config.safety,
                        format.unwrap_or(default_format),
                        confirmed,
                    )
                    .await
            }
            Operation::ListDatabases => adapter.list_databases(name, cfg).await,
            Operation::ListTables => adapter.list_tables(name, cfg).await,
            Operation::DescribeColumns { table, format } => {
                adapter.describe_columns(name, cfg, &table, format.unwrap_or(default_format)).await
            }
            Operation::ListIndexes { table, format } => {
                adapter.list_indexes(name, cfg, &table, format.unwrap_or(default_format)).await
            }
            Operation::Explain { statement, format } => {
                adapter
                    .explain_statement(name, cfg, &statement, format.unwrap_or(default_format))
                    .await
            }
            Operation::TestConnectivity => adapter.test_connectivity(name, cfg).await,
        }
    }

    /// Flush every pooled connection; must run before process exit
    ///
    /// Calling it with nothing open, or calling it twice, is a no-op.
    pub async fn close_all(&mut self) {
        self.registry.release_all().await;
    }
}

/// CSV is meaningful only for execute-statement result sets
fn check_format(operation: &Operation) -> Result<()> {
    let requested = match operation {
        Operation::DescribeColumns { format, .. }
        | Operation::ListIndexes { format, .. }
        | Operation::Explain { format, .. } => *format,
        _ => None,
    };

    if requested == Some(OutputFormat::Csv) {
        return Err(SqlwardError::invalid_input(format!(
            "csv output is only available for execute-statement, not {}",
            operation.name()
        )));
    }
    Ok(())
}
