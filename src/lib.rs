//! sqlward - Safety-Gated Multi-Engine SQL Client Core
//!
//! sqlward accepts a SQL statement or introspection request, decides whether
//! it is safe to run, dispatches it to a backend engine family through a
//! uniform adapter contract, and renders the result in a chosen encoding.
//!
//! # Core Principles
//! - Policy before I/O: blacklist, confirmation, and auto-limit checks run
//!   before any connection is touched
//! - One adapter per engine family, one live connection per profile, owned
//!   until explicit teardown
//! - Nothing above the adapters fails: every outcome is a [`CommandResult`]
//! - Closed enums over open dispatch: engine families and output formats are
//!   compile-time-checked sets
//!
//! # Module Organization
//! - [`error`] - Error taxonomy and stable error codes
//! - [`safety`] - Statement classification and the safety gate
//! - [`output`] - Output encodings and the command result contract
//! - [`config`] - Profiles, safety policy, and the configuration loader
//! - [`engine`] - Backend adapter contract and the two engine families
//! - [`dispatch`] - Dispatcher facade and connection registry

#[cfg(not(any(feature = "mysql", feature = "postgres")))]
compile_error!("at least one engine family feature ('mysql' or 'postgres') must be enabled");

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod output;
pub mod safety;

// Re-export commonly used types for convenience
pub use config::{Configuration, ConnectionProfile, SafetyPolicy};
pub use dispatch::{Dispatcher, Operation};
pub use engine::{BackendAdapter, EngineFamily, RowSet, ServerInfo, StatementOutcome};
pub use error::{Result, SqlwardError};
pub use output::{render, CommandResult, OutputFormat};
pub use safety::{apply_default_limit, classify, evaluate, SafetyVerdict, StatementKind};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_exports() {
        // Verify that key types are accessible through the crate root
        let _family = EngineFamily::Postgres;
        let _format = OutputFormat::Table;
        assert_eq!(classify("SELECT 1"), StatementKind::Select);
    }
}
