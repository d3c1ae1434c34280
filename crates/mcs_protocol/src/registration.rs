use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Transport a worker's server listens on (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    Streamable,
    ServerSentEvents,
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Streamable
    }
}

/// Registration tuple for one managed project (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRegistration {
    pub project_name: String,
    pub project_path: PathBuf,
    pub port: u16,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub modes: Vec<String>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default = "default_true")]
    pub auto_restart: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

/// Derived worker status (spec.md §3): a function of child-process liveness and
/// `auto_restart`, never stored directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Running,
    Crashed,
    Stopped,
}

/// A point-in-time snapshot of one worker, as returned by the supervisor and
/// embedded in the control file (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusRecord {
    pub project_name: String,
    pub project_path: PathBuf,
    pub port: u16,
    pub transport: Transport,
    pub host: String,
    pub status: WorkerStatus,
    pub pid: Option<u32>,
    pub uptime_seconds: Option<f64>,
    pub auto_restart: bool,
    pub memory_rss_mb: Option<f64>,
    pub restart_count: u32,
}
