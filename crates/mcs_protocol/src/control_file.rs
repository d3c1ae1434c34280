use serde::{Deserialize, Serialize};

use crate::registration::WorkerStatusRecord;

/// A pending command appended by an external CLI client (spec.md §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlCommand {
    pub action: ControlAction,
    pub project: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
}

/// The on-disk JSON bridge between the supervisor and external CLI clients
/// (spec.md §3, §6, §4.9).
///
/// Cooperative single-writer discipline: the supervisor is the sole writer of
/// authoritative snapshots (pid + servers + an empty commands list); external
/// CLI clients append entries to `commands` and wait for the next monitor tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFile {
    pub pid: u32,
    pub servers: Vec<WorkerStatusRecord>,
    #[serde(default)]
    pub commands: Vec<ControlCommand>,
}

impl ControlFile {
    pub fn new(pid: u32, servers: Vec<WorkerStatusRecord>) -> Self {
        Self {
            pid,
            servers,
            commands: Vec::new(),
        }
    }
}
