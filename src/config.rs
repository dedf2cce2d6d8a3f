//! Server configuration file.
//!
//! ```json
//! {
//!   "env": "local",
//!   "storage_path": "./storage",
//!   "schema_path": "./config/schema.json",
//!   "log_path": "./sheetdb.log",
//!   "port": 7432,
//!   "conn_timeout_secs": 300,
//!   "where_mode": "joined"
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::engine::{EngineConfig, WhereMode};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Deployment name; `local` switches logging to human-readable stdout
    #[serde(default = "default_env")]
    pub env: String,
    pub storage_path: PathBuf,
    pub schema_path: PathBuf,
    /// JSON log file used outside `local`; stdout when absent
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Idle connection timeout in seconds, 0 disables it
    #[serde(default)]
    pub conn_timeout_secs: u64,
    #[serde(default)]
    pub where_mode: WhereMode,
}

fn default_env() -> String {
    "prod".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7432
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("can't read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_local(&self) -> bool {
        self.env == "local"
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn conn_timeout(&self) -> Option<Duration> {
        (self.conn_timeout_secs > 0).then(|| Duration::from_secs(self.conn_timeout_secs))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            storage_path: self.storage_path.clone(),
            where_mode: self.where_mode,
        }
    }
}
