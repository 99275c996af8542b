//! Engine configuration: the host list and poll settings
//!
//! Loaded from and saved to YAML. Unset fields fall back to working
//! defaults (port 22, five-second interval, the built-in metric set), and a
//! starter file can be generated for first-time setup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Connection parameters and metric selection for one monitored host.
///
/// Immutable once a worker starts; the manager owns the authoritative copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Stable identifier; defaults to the hostname when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub hostname: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Private key path; takes precedence over the password when both are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_filename: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Metric type names to enable, resolved against the registry.
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
}

impl HostConfig {
    /// The id used to key workers and histories.
    pub fn effective_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.hostname)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Poll interval in seconds (expected range 1-60).
    #[serde(default = "default_interval")]
    pub interval: u64,
    pub servers: Vec<HostConfig>,
}

fn default_port() -> u16 {
    22
}

fn default_interval() -> u64 {
    5
}

fn default_metrics() -> Vec<String> {
    vec!["cpu".to_string(), "memory".to_string(), "disk".to_string()]
}

impl MonitorConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).await?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path.as_ref(), content).await?;
        Ok(())
    }

    /// Starter configuration with one password host and one key-file host.
    pub fn sample() -> Self {
        Self {
            interval: default_interval(),
            servers: vec![
                HostConfig {
                    id: Some("server1".to_string()),
                    hostname: "server1.example.com".to_string(),
                    username: "root".to_string(),
                    password: Some("password".to_string()),
                    key_filename: None,
                    port: 22,
                    metrics: default_metrics(),
                },
                HostConfig {
                    id: Some("server2".to_string()),
                    hostname: "server2.example.com".to_string(),
                    username: "admin".to_string(),
                    password: None,
                    key_filename: Some("/path/to/key.pem".to_string()),
                    port: 2222,
                    metrics: default_metrics(),
                },
            ],
        }
    }

    /// Writes the sample configuration to `path` unless a file already
    /// exists there. Returns whether a file was written.
    pub async fn write_sample(path: impl AsRef<Path>) -> Result<bool, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Self::sample().save(path).await?;
        info!("created sample config at {}", path.display());
        Ok(true)
    }
}
