//! YAML project-registration loader, read once at startup before
//! `start_all` (SPEC_FULL.md §B: "a thin `serde_yaml`-backed loader, not
//! part of the supervisor's own logic").

use std::path::PathBuf;

use anyhow::{Context, Result};
use mcs_protocol::{ProjectRegistration, Transport};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    projects: Vec<ProjectEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectEntry {
    pub name: String,
    pub path: PathBuf,
    pub port: Option<u16>,
    #[serde(default)]
    pub transport: Option<Transport>,
    pub host: Option<String>,
    pub context: Option<String>,
    #[serde(default)]
    pub modes: Vec<String>,
    pub log_level: Option<String>,
    pub auto_restart: Option<bool>,
}

impl ProjectEntry {
    pub fn into_registration(self, port: u16) -> ProjectRegistration {
        ProjectRegistration {
            project_name: self.name,
            project_path: self.path,
            port,
            transport: self.transport.unwrap_or_default(),
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            context: self.context,
            modes: self.modes,
            log_level: self.log_level,
            auto_restart: self.auto_restart.unwrap_or(true),
        }
    }
}

pub fn load_projects_yaml(path: &std::path::Path) -> Result<Vec<ProjectEntry>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: ConfigFile = serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(file.projects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_projects_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.yaml");
        std::fs::write(
            &path,
            "projects:\n  - name: alpha\n    path: /tmp/alpha\n  - name: beta\n    path: /tmp/beta\n    port: 9201\n    auto_restart: false\n",
        )
        .unwrap();

        let entries = load_projects_yaml(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "alpha");
        assert_eq!(entries[0].port, None);
        assert_eq!(entries[1].port, Some(9201));
        assert_eq!(entries[1].auto_restart, Some(false));
    }
}
