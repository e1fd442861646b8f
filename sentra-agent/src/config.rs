// sentra-agent/src/config.rs
// YAML configuration. A missing or unreadable file is fatal; every field
// has a sensible default so a minimal config only names the server.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub server: ServerSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub filters: FilterSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub spool: SpoolSection,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub id: String,
    /// Source names (auditd, syslog, bash_history) or explicit file paths.
    pub sources: Vec<String>,
    pub batch_size: usize,
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
}

impl Default for AgentSection {
    fn default() -> Self {
        AgentSection {
            id: default_agent_id(),
            sources: vec!["syslog".to_string()],
            batch_size: 50,
            flush_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterSection {
    pub severity_threshold: String,
    pub exclude_sources: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub include_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetrySection {
    fn default() -> Self {
        RetrySection {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpoolSection {
    pub directory: String,
    pub max_segment_bytes: u64,
    pub max_total_bytes: u64,
}

impl Default for SpoolSection {
    fn default() -> Self {
        SpoolSection {
            directory: "./spool".to_string(),
            max_segment_bytes: 1024 * 1024,
            max_total_bytes: 16 * 1024 * 1024,
        }
    }
}

fn default_port() -> u16 {
    9090
}

fn default_collection() -> String {
    "security_events".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_agent_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "agent-unknown".to_string())
}

impl AgentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<AgentConfig, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
