//! Server configuration
//!
//! Settings come from the `docdb.toml` file (or the file given with
//! `-config <file>`), then environment overrides are applied.
//!
//! ## Environment Variables
//!
//! - `DOCDB_HOST` - Listen address
//! - `DOCDB_PORT` - Listen port
//! - `DOCDB_DATABASE` - Database used when a command has no `$db`
//! - `DOCDB_STORAGE_FORMAT` - `map` or `text`
//!
//! These can also be set in a `.env` file in the working directory.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::driver::{DriverOptions, StorageFormat, MAX_MESSAGE_SIZE};
use crate::storage::DEFAULT_ADMIN_USER;

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "docdb.toml";

/// Environment variable names
pub const ENV_HOST: &str = "DOCDB_HOST";
pub const ENV_PORT: &str = "DOCDB_PORT";
pub const ENV_DATABASE: &str = "DOCDB_DATABASE";
pub const ENV_STORAGE_FORMAT: &str = "DOCDB_STORAGE_FORMAT";

pub const DEFAULT_PORT: u16 = 9610;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address
    pub host: String,
    pub port: u16,
    /// Database used when a command carries no `$db`
    pub database: String,
    /// Layout of the document column in newly created tables
    pub storage_format: StorageFormat,
    /// Runtime worker threads; defaults to the available parallelism
    pub worker_threads: Option<usize>,
    /// Admin principal bootstrapped into every database
    pub admin_user: String,
    pub max_message_size: usize,
    pub session_timeout_minutes: i32,
    /// Used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            database: "docdb".to_string(),
            storage_format: StorageFormat::default(),
            worker_threads: None,
            admin_user: DEFAULT_ADMIN_USER.to_string(),
            max_message_size: MAX_MESSAGE_SIZE,
            session_timeout_minutes: 30,
            log_filter: "docdb=info".to_string(),
        }
    }
}

impl Config {
    /// Load the configuration. An explicit path must exist; otherwise
    /// `docdb.toml` is read when present and defaults are used when not.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        // A missing .env is fine
        let _ = dotenvy::dotenv();

        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                Self::from_file(path)?
            }
            None => {
                let path = Path::new(CONFIG_FILE_NAME);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Apply overrides looked up by variable name
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST).filter(|v| !v.is_empty()) {
            self.host = host;
        }

        if let Some(port_str) = lookup(ENV_PORT) {
            match port_str.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!("Ignoring invalid {}: {}", ENV_PORT, port_str),
            }
        }

        if let Some(database) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
            self.database = database;
        }

        if let Some(format) = lookup(ENV_STORAGE_FORMAT) {
            match format.parse::<StorageFormat>() {
                Ok(format) => self.storage_format = format,
                Err(e) => tracing::warn!("Ignoring {}: {}", ENV_STORAGE_FORMAT, e),
            }
        }
    }

    /// Address to bind, `host:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads.filter(|n| *n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            default_database: self.database.clone(),
            storage_format: self.storage_format,
            max_message_size: self.max_message_size,
            session_timeout_minutes: self.session_timeout_minutes,
        }
    }
}
