use std::path::PathBuf;
use std::sync::Once;

use crate::defaults::{CACHE_STATS_FILE_NAME, CONTROL_FILE_NAME, PROJECT_MANAGED_SUBDIR};

static CREATE_DIR_WARNED: Once = Once::new();

/// Resolve the managed home directory.
///
/// Priority:
/// 1) `MCS_HOME`
/// 2) `HOME`/`USERPROFILE`-relative `.mcs`
/// 3) `./.mcs`
pub fn mcs_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("MCS_HOME") {
        return PathBuf::from(override_path);
    }
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        return PathBuf::from(home).join(".mcs");
    }
    PathBuf::from(".").join(".mcs")
}

fn ensure_dir(dir: &PathBuf) {
    if let Err(err) = std::fs::create_dir_all(dir) {
        CREATE_DIR_WARNED.call_once(|| {
            eprintln!(
                "Warning: failed to create directory {}: {}. Set MCS_HOME to override.",
                dir.display(),
                err
            );
        });
    }
}

/// `<home>/logs`, the root for supervisor and per-project worker log captures.
pub fn logs_dir() -> PathBuf {
    let dir = mcs_home().join("logs");
    ensure_dir(&dir);
    dir
}

/// `<home>/logs/multi-server`, where worker stdout/stderr are captured (spec.md §6).
pub fn worker_logs_dir() -> PathBuf {
    let dir = logs_dir().join("multi-server");
    ensure_dir(&dir);
    dir
}

/// The control file path: `<home>/multi_server.json`.
pub fn control_file_path() -> PathBuf {
    mcs_home().join(CONTROL_FILE_NAME)
}

/// The managed subdirectory inside a project directory: `<project>/.mcs`.
pub fn project_managed_dir(project_path: &std::path::Path) -> PathBuf {
    project_path.join(PROJECT_MANAGED_SUBDIR)
}

/// The cache statistics file for a project: `<project>/.mcs/cache_stats.json`.
pub fn cache_stats_path(project_path: &std::path::Path) -> PathBuf {
    project_managed_dir(project_path).join(CACHE_STATS_FILE_NAME)
}

/// The fingerprint (document-symbols) cache file for a project.
pub fn fingerprint_cache_path(project_path: &std::path::Path) -> PathBuf {
    project_managed_dir(project_path).join("fingerprint_cache.json")
}

/// The raw-parse fingerprint cache file, kept alongside the document-symbols cache.
pub fn raw_cache_path(project_path: &std::path::Path) -> PathBuf {
    project_managed_dir(project_path).join("raw_cache.json")
}
