//! sqlward CLI Entry Point
//!
//! One headless invocation per run: load the configuration, dispatch exactly
//! one operation, print the rendered text, release connections, exit.
//!
//! Rendered output goes to stdout; logs and errors go to stderr. Exit codes:
//! 0 success, 1 terminal failure, 2 confirmation required (re-run with
//! `--yes` after obtaining consent).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sqlward::{config, CommandResult, Configuration, Dispatcher, Operation, OutputFormat};

/// sqlward - safety-gated multi-engine SQL client
#[derive(Parser)]
#[command(name = "sqlward")]
#[command(about = "Safety-gated multi-engine SQL client")]
#[command(version)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Connection profile name (defaults to the configured default)
    #[arg(long, short = 'p', global = true)]
    profile: Option<String>,

    /// Output format: table, json, csv, or toon
    #[arg(long, short = 'f', global = true)]
    format: Option<String>,

    /// Record consent for a statement that requires confirmation
    #[arg(long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a SQL statement through the safety gate
    Query {
        /// Statement text
        statement: String,
    },

    /// List databases visible to the profile
    Databases,

    /// List tables in the active database
    Tables,

    /// Describe the columns of a table
    Columns {
        /// Table name
        table: String,
    },

    /// List the indexes of a table
    Indexes {
        /// Table name
        table: String,
    },

    /// Show the engine's execution plan for a statement
    Explain {
        /// Statement text
        statement: String,
    },

    /// Check connectivity and report server version
    Ping,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(result) => report(&result),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<CommandResult> {
    let path = match cli.config {
        Some(path) => path,
        None => config::default_config_path().context("no --config given and no default path")?,
    };
    let configuration = Configuration::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    let format: Option<OutputFormat> =
        cli.format.as_deref().map(str::parse).transpose().context("invalid --format")?;

    let operation = match cli.command {
        Commands::Query { statement } => {
            Operation::Execute { statement, format, confirmed: cli.yes }
        }
        Commands::Databases => Operation::ListDatabases,
        Commands::Tables => Operation::ListTables,
        Commands::Columns { table } => Operation::DescribeColumns { table, format },
        Commands::Indexes { table } => Operation::ListIndexes { table, format },
        Commands::Explain { statement } => Operation::Explain { statement, format },
        Commands::Ping => Operation::TestConnectivity,
    };

    let mut dispatcher = Dispatcher::new(configuration);
    let result = dispatcher.dispatch(cli.profile.as_deref(), operation).await;
    dispatcher.close_all().await;

    Ok(result)
}

/// Print the result and pick the exit code
fn report(result: &CommandResult) -> ExitCode {
    if result.succeeded {
        if let Some(text) = &result.rendered_text {
            println!("{text}");
        }
        return ExitCode::SUCCESS;
    }

    if let Some(text) = &result.error_text {
        eprintln!("{text}");
    }

    if result.confirmation_required {
        eprintln!("re-run with --yes to record consent");
        ExitCode::from(2)
    } else {
        ExitCode::from(1)
    }
}
