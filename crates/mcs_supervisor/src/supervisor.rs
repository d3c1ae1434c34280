//! The supervisor: owns every worker handle, runs the monitor loop, and
//! drains the control file (spec.md §4.7).

use std::collections::HashMap;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mcs_protocol::defaults::{
    DEFAULT_BASE_PORT, DEFAULT_LOG_TAIL_LINES, DEFAULT_STOP_TIMEOUT_SECS,
    MONITOR_GRACE_PERIOD_SECS, MONITOR_TICK_SECS, PORT_SEARCH_WINDOW,
};
use mcs_protocol::{
    CacheStats, CacheStatsSource, ControlAction, McsError, McsResult, ProjectRegistration,
    ServerStatsResponse, SystemStatsResponse, Transport, WorkerStatusRecord,
};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::control_bridge::ControlFileBridge;
use crate::handle::WorkerHandle;
use crate::system_info;

/// Owns every managed worker, keyed by project name (spec.md §3, §4.7).
pub struct Supervisor {
    workers: Mutex<HashMap<String, WorkerHandle>>,
    worker_binary: PathBuf,
    projects_root: PathBuf,
    control_bridge: ControlFileBridge,
    shutdown: Arc<AtomicBool>,
    started_at: Mutex<Option<std::time::Instant>>,
}

impl Supervisor {
    pub fn new(worker_binary: PathBuf, projects_root: PathBuf) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            worker_binary,
            projects_root,
            control_bridge: ControlFileBridge::at_default_path(),
            shutdown: Arc::new(AtomicBool::new(false)),
            started_at: Mutex::new(None),
        }
    }

    /// Subdirectories of the configured projects root not already managed
    /// (spec.md §4.8 `GET /admin/available-projects`).
    pub fn available_projects(&self) -> Vec<String> {
        let managed: std::collections::HashSet<PathBuf> = {
            let workers = self.workers.lock();
            workers.values().map(|h| h.registration.project_path.clone()).collect()
        };

        let Ok(entries) = std::fs::read_dir(&self.projects_root) else {
            return Vec::new();
        };

        let mut paths: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| !managed.contains(path))
            .map(|path| path.display().to_string())
            .collect();
        paths.sort();
        paths
    }

    /// Register a project without starting it. Rejects duplicate names and
    /// ports already in use (spec.md §4.7 `add_server`).
    pub fn add_server(&self, registration: ProjectRegistration) -> McsResult<()> {
        let mut workers = self.workers.lock();
        if workers.contains_key(&registration.project_name) {
            return Err(McsError::Validation(format!(
                "project already registered: {}",
                registration.project_name
            )));
        }
        if workers.values().any(|h| h.registration.port == registration.port) {
            return Err(McsError::Validation(format!(
                "port already in use: {}",
                registration.port
            )));
        }
        let name = registration.project_name.clone();
        workers.insert(name, WorkerHandle::new(registration, self.worker_binary.clone()));
        Ok(())
    }

    pub fn start_server(&self, name: &str) -> McsResult<()> {
        let mut workers = self.workers.lock();
        let handle = workers
            .get_mut(name)
            .ok_or_else(|| McsError::NotFound(name.to_string()))?;
        handle.start()
    }

    pub fn stop_server(&self, name: &str) -> McsResult<()> {
        let mut workers = self.workers.lock();
        let handle = workers
            .get_mut(name)
            .ok_or_else(|| McsError::NotFound(name.to_string()))?;
        handle.stop(Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS))
    }

    /// User-triggered restart: stop, then start from scratch. Distinct from
    /// the monitor loop's `restart_with_backoff`, which only fires on an
    /// unexpected crash (spec.md §4.7).
    pub fn restart_server(&self, name: &str) -> McsResult<()> {
        let mut workers = self.workers.lock();
        let handle = workers
            .get_mut(name)
            .ok_or_else(|| McsError::NotFound(name.to_string()))?;
        handle.stop(Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS))?;
        handle.restart_count = 0;
        handle.start()
    }

    pub fn remove_server(&self, name: &str) -> McsResult<()> {
        let mut workers = self.workers.lock();
        let mut handle = workers
            .remove(name)
            .ok_or_else(|| McsError::NotFound(name.to_string()))?;
        handle.stop(Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS))?;
        Ok(())
    }

    /// Snapshot every managed worker (spec.md §4.7 `list_servers`).
    pub fn list_servers(&self) -> Vec<WorkerStatusRecord> {
        let mut workers = self.workers.lock();
        let mut records: Vec<WorkerStatusRecord> = workers
            .values_mut()
            .map(|handle| {
                let alive = handle.is_alive();
                let pid = handle.pid();
                WorkerStatusRecord {
                    project_name: handle.registration.project_name.clone(),
                    project_path: handle.registration.project_path.clone(),
                    port: handle.registration.port,
                    transport: handle.registration.transport,
                    host: handle.registration.host.clone(),
                    status: handle.status(),
                    pid: if alive { pid } else { None },
                    uptime_seconds: handle.uptime().map(|d| d.as_secs_f64()),
                    auto_restart: handle.registration.auto_restart,
                    memory_rss_mb: pid.and_then(system_info::process_tree_rss_mb),
                    restart_count: handle.restart_count,
                }
            })
            .collect();
        records.sort_by(|a, b| a.project_name.cmp(&b.project_name));
        records
    }

    /// Find an unused port starting from `max(used ports) + 1` or the
    /// default base port, confirmed by a short-lived bind (spec.md §4.7
    /// `find_free_port`, §6 port window).
    pub fn find_free_port(&self) -> McsResult<u16> {
        let workers = self.workers.lock();
        let start = workers
            .values()
            .map(|h| h.registration.port)
            .max()
            .map(|p| p.saturating_add(1))
            .unwrap_or(DEFAULT_BASE_PORT);
        let used: std::collections::HashSet<u16> =
            workers.values().map(|h| h.registration.port).collect();
        drop(workers);

        for offset in 0..PORT_SEARCH_WINDOW {
            let candidate = start.saturating_add(offset);
            if candidate == 0 || used.contains(&candidate) {
                continue;
            }
            if TcpListener::bind(("127.0.0.1", candidate)).is_ok() {
                return Ok(candidate);
            }
        }
        Err(McsError::Capacity {
            start,
            end: start.saturating_add(PORT_SEARCH_WINDOW),
        })
    }

    /// Derive a unique project name, find a free port, register, and start
    /// (spec.md §4.7 `add_and_start_server`; SPEC_FULL.md §C: an unspecified
    /// transport/host is inherited from the first already-registered
    /// project rather than defaulted).
    pub fn add_and_start_server(
        &self,
        project_path: PathBuf,
        transport: Option<Transport>,
        host: Option<String>,
        context: Option<String>,
        modes: Vec<String>,
        log_level: Option<String>,
    ) -> McsResult<String> {
        let base = mcs_protocol::naming::derive_base_name(&project_path)
            .ok_or_else(|| McsError::Validation(format!("cannot derive a project name from {}", project_path.display())))?;

        let existing: std::collections::HashSet<String> = {
            let workers = self.workers.lock();
            workers.keys().cloned().collect()
        };
        let name = mcs_protocol::naming::unique_name(&base, &existing);

        let (inherited_transport, inherited_host) = self.first_registered_transport_host();
        let port = self.find_free_port()?;

        let registration = ProjectRegistration {
            project_name: name.clone(),
            project_path,
            port,
            transport: transport.or(inherited_transport).unwrap_or_default(),
            host: host.or(inherited_host).unwrap_or_else(|| "0.0.0.0".to_string()),
            context,
            modes,
            log_level,
            auto_restart: true,
        };

        self.add_server(registration)?;
        self.start_server(&name)?;
        Ok(name)
    }

    fn first_registered_transport_host(&self) -> (Option<Transport>, Option<String>) {
        let workers = self.workers.lock();
        let mut names: Vec<&String> = workers.keys().collect();
        names.sort();
        names
            .first()
            .and_then(|name| workers.get(*name))
            .map(|h| (Some(h.registration.transport), Some(h.registration.host.clone())))
            .unwrap_or((None, None))
    }

    /// Tail a worker's captured stdout or stderr (spec.md §4.8 `GET
    /// /admin/servers/{name}/logs`).
    pub fn get_server_logs(&self, name: &str, stderr: bool, lines: Option<usize>) -> McsResult<Vec<String>> {
        let path = {
            let workers = self.workers.lock();
            let handle = workers
                .get(name)
                .ok_or_else(|| McsError::NotFound(name.to_string()))?;
            if stderr {
                handle.stderr_path().clone()
            } else {
                handle.stdout_path().clone()
            }
        };
        let n = lines.unwrap_or(DEFAULT_LOG_TAIL_LINES);
        let contents = std::fs::read_to_string(&path).unwrap_or_default();
        let all_lines: Vec<&str> = contents.lines().collect();
        let start = all_lines.len().saturating_sub(n);
        Ok(all_lines[start..].iter().map(|s| s.to_string()).collect())
    }

    /// Per-project statistics: tree RSS plus the persisted cache-stats file,
    /// falling back to a plain file count when no cache has been written yet
    /// (spec.md §4.3, §4.8 `GET /admin/servers/{name}/stats`).
    pub fn get_server_stats(&self, name: &str) -> McsResult<ServerStatsResponse> {
        let (pid, project_path) = {
            let mut workers = self.workers.lock();
            let handle = workers
                .get_mut(name)
                .ok_or_else(|| McsError::NotFound(name.to_string()))?;
            let alive = handle.is_alive();
            (if alive { handle.pid() } else { None }, handle.registration.project_path.clone())
        };

        let memory_tree_rss_mb = pid.and_then(system_info::process_tree_rss_mb);
        let cache = read_cache_stats(&project_path);
        Ok(ServerStatsResponse {
            memory_tree_rss_mb,
            cache,
        })
    }

    pub fn get_system_stats(&self) -> SystemStatsResponse {
        SystemStatsResponse {
            memory: system_info::system_memory(),
            cpu_count: system_info::cpu_count(),
            load_average: system_info::load_average(),
        }
    }

    /// Start every registered project and spawn the monitor loop thread
    /// (spec.md §4.7: grace period, then periodic tick).
    pub fn start_all(self: &Arc<Self>) {
        let names: Vec<String> = {
            let workers = self.workers.lock();
            workers.keys().cloned().collect()
        };
        for name in &names {
            if let Err(err) = self.start_server(name) {
                warn!(project = %name, "failed to start worker: {err}");
            }
        }
        *self.started_at.lock() = Some(std::time::Instant::now());

        let pid = std::process::id();
        if let Err(err) = self.control_bridge.write_snapshot(pid, self.list_servers()) {
            warn!("failed to write initial control file: {err}");
        }

        let this = Arc::clone(self);
        std::thread::spawn(move || this.run_monitor_loop());
    }

    fn run_monitor_loop(&self) {
        std::thread::sleep(Duration::from_secs(MONITOR_GRACE_PERIOD_SECS));
        while !self.shutdown.load(Ordering::SeqCst) {
            self.monitor_tick();
            self.drain_control_file();
            std::thread::sleep(Duration::from_secs(MONITOR_TICK_SECS));
        }
    }

    /// One pass: snapshot the worker set under the lock, then release it
    /// before acting on each worker individually (spec.md §4.7 monitor
    /// loop: restart dead auto-restart workers, reset stable counters).
    fn monitor_tick(&self) {
        let names: Vec<String> = {
            let workers = self.workers.lock();
            workers.keys().cloned().collect()
        };

        for name in names {
            let should_restart = {
                let mut workers = self.workers.lock();
                let Some(handle) = workers.get_mut(&name) else {
                    continue;
                };
                let alive = handle.is_alive();
                if alive {
                    handle.maybe_reset_restart_count();
                }
                !alive && handle.registration.auto_restart
            };

            if should_restart {
                let mut workers = self.workers.lock();
                if let Some(handle) = workers.get_mut(&name) {
                    info!(project = %name, "worker found dead, restarting");
                    if let Err(err) = handle.restart_with_backoff() {
                        warn!(project = %name, "{err}");
                    }
                }
            }
        }
    }

    /// Apply any commands an external CLI client appended to the control
    /// file, then rewrite it as a fresh authoritative snapshot (spec.md
    /// §4.9).
    fn drain_control_file(&self) {
        for command in self.control_bridge.read_pending_commands() {
            let result = match command.action {
                ControlAction::Start => self.start_server(&command.project),
                ControlAction::Stop => self.stop_server(&command.project),
                ControlAction::Restart => self.restart_server(&command.project),
            };
            if let Err(err) = result {
                warn!(project = %command.project, action = ?command.action, "control file command failed: {err}");
            }
        }

        let pid = std::process::id();
        if let Err(err) = self.control_bridge.write_snapshot(pid, self.list_servers()) {
            warn!("failed to rewrite control file: {err}");
        }
    }

    /// Stop every worker, mark the monitor loop for exit, and remove the
    /// control file (spec.md §4.7 `shutdown`).
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let names: Vec<String> = {
            let workers = self.workers.lock();
            workers.keys().cloned().collect()
        };
        for name in names {
            if let Err(err) = self.stop_server(&name) {
                warn!(project = %name, "error stopping worker during shutdown: {err}");
            }
        }
        self.control_bridge.remove();
    }
}

fn read_cache_stats(project_path: &Path) -> CacheStatsSource {
    let path = mcs_protocol::paths::cache_stats_path(project_path);
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<CacheStats>(&contents) {
            Ok(stats) => CacheStatsSource::Cache(stats),
            Err(_) => fallback_file_count(project_path),
        },
        Err(_) => fallback_file_count(project_path),
    }
}

fn fallback_file_count(project_path: &Path) -> CacheStatsSource {
    let indexed_files = ignore::WalkBuilder::new(project_path)
        .hidden(false)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == "bsl" || ext == "os")
                .unwrap_or(false)
        })
        .count() as u64;
    CacheStatsSource::Filesystem { indexed_files }
}
