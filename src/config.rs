//! Node configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub blockchain: BlockchainConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the snapshot file and the backups directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Number of timestamped backups to keep
    #[serde(default = "default_backup_retention")]
    pub backup_retention: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Automation webhook receiving `{event, data}` posts
    #[serde(default)]
    pub n8n_webhook_url: Option<String>,

    /// Only reported in status; no direct model calls are made
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Timeout for the webhook connection test
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockchainConfig {
    /// Deployed agreement contract, used by the browser client
    #[serde(default)]
    pub contract_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Allowed CORS origin, `*` for any
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

// Defaults
fn default_port() -> u16 { 3001 }
fn default_data_dir() -> PathBuf { PathBuf::from("./data") }
fn default_backup_retention() -> usize { 10 }
fn default_test_timeout() -> u64 { 5 }
fn default_cors_origin() -> String { "*".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backup_retention: default_backup_retention(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            n8n_webhook_url: None,
            openai_api_key: None,
            test_timeout_secs: default_test_timeout(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_origin: default_cors_origin(),
        }
    }
}

impl AiConfig {
    /// Webhook URL, ignoring blank values
    pub fn webhook_url(&self) -> Option<&str> {
        non_blank(self.n8n_webhook_url.as_deref())
    }

    pub fn openai_configured(&self) -> bool {
        non_blank(self.openai_api_key.as_deref()).is_some()
    }

    pub fn enabled(&self) -> bool {
        self.webhook_url().is_some() || self.openai_configured()
    }
}

impl Config {
    /// Parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Non-fatal configuration gaps worth logging at startup.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.ai.enabled() {
            warnings.push(
                "No AI integration configured. Set N8N_WEBHOOK_URL or OPENAI_API_KEY".to_string(),
            );
        }
        if non_blank(self.blockchain.contract_address.as_deref()).is_none() {
            warnings.push("No contract address configured. Set CONTRACT_ADDRESS".to_string());
        }
        warnings
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
