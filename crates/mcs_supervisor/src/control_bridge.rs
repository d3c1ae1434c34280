//! Out-of-process command/status channel via a JSON file (spec.md §4.9).
//!
//! Cooperative single-writer discipline: the supervisor is the sole writer
//! of authoritative snapshots; external CLI clients append command entries
//! and wait for the next monitor tick to see them applied.

use std::path::PathBuf;

use mcs_protocol::{ControlCommand, ControlFile, WorkerStatusRecord};
use tracing::warn;

pub struct ControlFileBridge {
    path: PathBuf,
}

impl ControlFileBridge {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn at_default_path() -> Self {
        Self::new(mcs_protocol::paths::control_file_path())
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Rewrite the file as an authoritative snapshot with an empty commands
    /// list (spec.md §4.9: "rewrites the file as an authoritative snapshot").
    pub fn write_snapshot(&self, pid: u32, servers: Vec<WorkerStatusRecord>) -> std::io::Result<()> {
        let file = ControlFile::new(pid, servers);
        let json = serde_json::to_string_pretty(&file)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)
    }

    /// Read the full control file, if present and decodable.
    pub fn read_control_file(&self) -> Option<ControlFile> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Append one command for the supervisor to pick up on its next tick
    /// (spec.md §4.9: "external CLI clients append command objects").
    pub fn append_command(&self, command: mcs_protocol::ControlCommand) -> std::io::Result<()> {
        let mut file = self.read_control_file().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no control file to append to")
        })?;
        file.commands.push(command);
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, json)
    }

    /// Read pending commands. Tolerates a partially-written file (a
    /// concurrent CLI append mid-write) by treating a decode error as "no
    /// commands this tick" rather than propagating the error (spec.md §5:
    /// "Readers tolerate partial writes by catching decode errors and
    /// retrying on the next tick").
    pub fn read_pending_commands(&self) -> Vec<ControlCommand> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str::<ControlFile>(&text) {
                Ok(file) => file.commands,
                Err(err) => {
                    warn!("control file decode error, retrying next tick: {err}");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// A reader-side helper: a control file whose `pid` no longer exists is
/// stale and should be deleted (spec.md §4.9: "any reader that sees a
/// supervisor_pid whose process does not exist... must treat the file as
/// stale and delete it").
pub fn is_stale(control_file: &ControlFile) -> bool {
    !crate::handle::process_exists(control_file.pid)
}
