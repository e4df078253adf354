//! Configuration Management
//!
//! Named connection profiles, the safety policy, and the defaults a caller
//! falls back to. The loader reads a JSON file; everything else in the crate
//! consumes the in-memory [`Configuration`] value and never touches the
//! filesystem.
//!
//! # Resolution
//! Operations name a profile explicitly or fall back to `default_profile`.
//! Every resolution failure enumerates the valid profile names so a caller
//! can correct the request without reading the file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::EngineFamily;
use crate::error::{Result, SqlwardError};
use crate::output::OutputFormat;

/// Blacklist, confirmation, and auto-limit policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyPolicy {
    /// LIMIT appended to unbounded SELECTs
    #[serde(default = "default_row_limit")]
    pub row_limit: u32,

    /// Keywords whose presence defers execution until the caller consents
    #[serde(default = "default_confirm_keywords")]
    pub confirm_keywords: Vec<String>,

    /// Phrases that block execution outright
    #[serde(default)]
    pub blacklist: Vec<String>,
}

fn default_row_limit() -> u32 {
    100
}

fn default_confirm_keywords() -> Vec<String> {
    ["DELETE", "UPDATE", "DROP", "TRUNCATE", "ALTER"].iter().map(ToString::to_string).collect()
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            row_limit: default_row_limit(),
            confirm_keywords: default_confirm_keywords(),
            blacklist: Vec::new(),
        }
    }
}

/// One named connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Engine family; the primary (MySQL) family when absent
    #[serde(default)]
    pub engine: EngineFamily,

    /// Hostname
    pub host: String,

    /// Port number
    pub port: u16,

    /// Username
    pub user: String,

    /// Password
    /// WARNING: sensitive, never logged or echoed in error messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password, as an alternative to
    /// storing it in the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Database name
    pub database: String,

    /// Schema qualifier (Postgres family only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Whether to negotiate TLS
    #[serde(default)]
    pub tls: bool,
}

impl ConnectionProfile {
    /// Resolve the password, preferring the literal field over the
    /// environment indirection
    pub fn resolve_password(&self) -> Result<String> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        if let Some(env_var) = &self.password_env {
            return std::env::var(env_var).map_err(|_| {
                SqlwardError::config_error(format!(
                    "environment variable {env_var} not found for password"
                ))
            });
        }
        Err(SqlwardError::config_error("profile has neither 'password' nor 'password_env'"))
    }

    /// Schema qualifier with the conventional default
    #[must_use]
    pub fn schema_or_default(&self) -> &str {
        self.schema.as_deref().unwrap_or("public")
    }
}

/// Full client configuration supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// Named connection profiles
    pub profiles: HashMap<String, ConnectionProfile>,

    /// Safety policy applied to statement execution
    #[serde(default)]
    pub safety: SafetyPolicy,

    /// Profile used when an operation names none
    pub default_profile: String,

    /// Output encoding used when an operation names none
    #[serde(default = "default_output_format")]
    pub default_format: OutputFormat,
}

fn default_output_format() -> OutputFormat {
    OutputFormat::Table
}

impl Configuration {
    /// Load and validate a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            SqlwardError::config_error(format!("could not read config file: {e}"))
        })?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| SqlwardError::config_error(format!("invalid config file: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Check the invariant that every profile referenced by name exists
    pub fn validate(&self) -> Result<()> {
        if self.profiles.is_empty() {
            return Err(SqlwardError::config_error("configuration defines no profiles"));
        }
        if !self.profiles.contains_key(&self.default_profile) {
            return Err(SqlwardError::config_error(format!(
                "default profile '{}' is not defined (valid profiles: {})",
                self.default_profile,
                self.profile_names().join(", ")
            )));
        }
        Ok(())
    }

    /// Resolve a profile by name, falling back to the configured default
    pub fn resolve_profile(&self, name: Option<&str>) -> Result<(&str, &ConnectionProfile)> {
        let name = name.unwrap_or(&self.default_profile);
        match self.profiles.get_key_value(name) {
            Some((key, profile)) => Ok((key.as_str(), profile)),
            None => Err(SqlwardError::config_error(format!(
                "unknown profile '{name}' (valid profiles: {})",
                self.profile_names().join(", ")
            ))),
        }
    }

    /// Sorted profile names, for error messages
    #[must_use]
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Default config file location (`~/.config/sqlward/config.json`)
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| SqlwardError::config_error("could not determine user config directory"))?;

    Ok(config_dir.join("sqlward").join("config.json"))
}
