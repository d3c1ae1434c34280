//! One worker's child process, log files, and restart bookkeeping
//! (spec.md §4.6).

use std::path::PathBuf;
use std::process::{Child, Command, OpenOptions, Stdio};
use std::time::{Duration, Instant};

use mcs_protocol::defaults::{MAX_RESTART_ATTEMPTS, MAX_RESTART_BACKOFF_SECS};
use mcs_protocol::{McsError, McsResult, ProjectRegistration, Transport, WorkerStatus};
use tracing::{info, warn};

/// Internal lifecycle state. `WorkerStatus` (spec.md §3) is derived from
/// this plus `auto_restart`; `Crashed` and `Stopped` are otherwise
/// indistinguishable from liveness alone, which is why this is tracked
/// explicitly rather than only checking whether the child is alive
/// (spec.md §9 Open Question).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Crashed,
    Stopped,
}

/// One managed project's worker process, owned exclusively by the
/// supervisor (spec.md §3: "Worker Handle").
pub struct WorkerHandle {
    pub registration: ProjectRegistration,
    worker_binary: PathBuf,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    child: Option<Child>,
    start_time: Option<Instant>,
    pub restart_count: u32,
    lifecycle: Lifecycle,
}

impl WorkerHandle {
    pub fn new(registration: ProjectRegistration, worker_binary: PathBuf) -> Self {
        let logs_dir = mcs_protocol::paths::worker_logs_dir();
        let stdout_path = logs_dir.join(format!("{}.stdout.log", registration.project_name));
        let stderr_path = logs_dir.join(format!("{}.stderr.log", registration.project_name));
        Self {
            registration,
            worker_binary,
            stdout_path,
            stderr_path,
            child: None,
            start_time: None,
            restart_count: 0,
            lifecycle: Lifecycle::Created,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.id())
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.start_time.map(|t| t.elapsed())
    }

    pub fn stdout_path(&self) -> &PathBuf {
        &self.stdout_path
    }

    pub fn stderr_path(&self) -> &PathBuf {
        &self.stderr_path
    }

    /// Launch the child with the argv shape documented in spec.md §4.6/§6.
    /// stdin is closed; stdout/stderr append to per-project log files.
    pub fn start(&mut self) -> McsResult<()> {
        let stdout_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.stdout_path)?;
        let stderr_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.stderr_path)?;

        let mut cmd = Command::new(&self.worker_binary);
        cmd.arg("--project")
            .arg(&self.registration.project_path)
            .arg("--transport")
            .arg(transport_arg(self.registration.transport))
            .arg("--host")
            .arg(&self.registration.host)
            .arg("--port")
            .arg(self.registration.port.to_string());

        if let Some(context) = &self.registration.context {
            cmd.arg("--context").arg(context);
        }
        for mode in &self.registration.modes {
            cmd.arg("--mode").arg(mode);
        }
        if let Some(level) = &self.registration.log_level {
            cmd.arg("--log-level").arg(level);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file));

        let child = cmd.spawn()?;
        info!(
            project = %self.registration.project_name,
            pid = child.id(),
            "worker started"
        );
        self.child = Some(child);
        self.start_time = Some(Instant::now());
        self.lifecycle = Lifecycle::Running;
        Ok(())
    }

    /// Graceful stop: SIGTERM, wait up to `timeout`, then force-kill and
    /// wait again (spec.md §4.6, §5 "Cancellation and timeouts").
    pub fn stop(&mut self, timeout: Duration) -> McsResult<()> {
        let Some(mut child) = self.child.take() else {
            self.lifecycle = Lifecycle::Stopped;
            self.start_time = None;
            return Ok(());
        };

        send_terminate(&child);

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_status)) => break,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        warn!(
                            project = %self.registration.project_name,
                            "graceful stop timed out, force-killing"
                        );
                        let _ = child.kill();
                        let force_deadline = Instant::now()
                            + Duration::from_secs(mcs_protocol::defaults::FORCE_KILL_JOIN_TIMEOUT_SECS);
                        loop {
                            match child.try_wait() {
                                Ok(Some(_)) | Err(_) => break,
                                Ok(None) if Instant::now() >= force_deadline => break,
                                Ok(None) => std::thread::sleep(Duration::from_millis(100)),
                            }
                        }
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(_) => break,
            }
        }

        self.lifecycle = Lifecycle::Stopped;
        self.start_time = None;
        Ok(())
    }

    /// Non-blocking liveness check. On transition from alive to exited,
    /// records the crash (spec.md §4.6 status transition: "running → (child
    /// exits) crashed").
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(_status)) => {
                self.child = None;
                self.start_time = None;
                if self.lifecycle == Lifecycle::Running {
                    self.lifecycle = Lifecycle::Crashed;
                }
                false
            }
            Err(_) => {
                self.child = None;
                self.start_time = None;
                self.lifecycle = Lifecycle::Crashed;
                false
            }
        }
    }

    pub fn status(&self) -> WorkerStatus {
        match self.lifecycle {
            Lifecycle::Running => WorkerStatus::Running,
            Lifecycle::Crashed => WorkerStatus::Crashed,
            Lifecycle::Created | Lifecycle::Stopped => WorkerStatus::Stopped,
        }
    }

    /// Reset the restart counter after `STABLE_PERIOD` of continuous
    /// uptime (spec.md §4.6, §4.7 monitor loop).
    pub fn maybe_reset_restart_count(&mut self) {
        if let Some(uptime) = self.uptime() {
            if uptime >= Duration::from_secs(mcs_protocol::defaults::STABLE_PERIOD_SECS) {
                self.restart_count = 0;
            }
        }
    }

    /// Bounded-retry restart with exponential backoff (spec.md §4.6, §8
    /// "Restart backoff" law): backoff before attempt `n` (0-based) is
    /// `2^n` seconds capped at 30; after `MAX_RESTART_ATTEMPTS` failures,
    /// `auto_restart` is forced off and the handle is left `Stopped`.
    pub fn restart_with_backoff(&mut self) -> McsResult<()> {
        self.restart_with_backoff_using(|d| std::thread::sleep(d), |d| std::thread::sleep(d))
    }

    fn restart_with_backoff_using(
        &mut self,
        mut backoff_sleep: impl FnMut(Duration),
        mut settle_sleep: impl FnMut(Duration),
    ) -> McsResult<()> {
        for attempt in 0..MAX_RESTART_ATTEMPTS {
            backoff_sleep(backoff_for_attempt(attempt));
            self.restart_count += 1;
            if self.start().is_ok() {
                settle_sleep(Duration::from_millis(50));
                if self.is_alive() {
                    return Ok(());
                }
            }
        }
        self.lifecycle = Lifecycle::Stopped;
        self.registration.auto_restart = false;
        Err(McsError::Validation(format!(
            "worker {} exhausted {MAX_RESTART_ATTEMPTS} restart attempts",
            self.registration.project_name
        )))
    }
}

fn backoff_for_attempt(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt).min(MAX_RESTART_BACKOFF_SECS);
    Duration::from_secs(secs)
}

fn transport_arg(transport: Transport) -> &'static str {
    match transport {
        Transport::Streamable => "streamable",
        Transport::ServerSentEvents => "server-sent-events",
    }
}

#[cfg(unix)]
fn send_terminate(child: &Child) {
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.kill();
}

/// Probe whether a process exists via a no-op signal (spec.md §4.9:
/// "probed by a no-op signal").
#[cfg(unix)]
pub fn process_exists(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
pub fn process_exists(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_protocol::Transport;

    fn registration(name: &str) -> ProjectRegistration {
        ProjectRegistration {
            project_name: name.to_string(),
            project_path: PathBuf::from("/tmp/does-not-matter"),
            port: 9200,
            transport: Transport::Streamable,
            host: "127.0.0.1".to_string(),
            context: None,
            modes: Vec::new(),
            log_level: None,
            auto_restart: true,
        }
    }

    #[test]
    fn backoff_sequence_is_one_two_four_capped_at_thirty() {
        assert_eq!(backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(4));
        assert_eq!(backoff_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn restart_exhaustion_disables_auto_restart_after_three_attempts() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("MCS_HOME", dir.path());

        let mut handle = WorkerHandle::new(registration("alpha"), PathBuf::from("/nonexistent/mcs-worker-binary"));
        let mut recorded_backoffs = Vec::new();

        let result = handle.restart_with_backoff_using(
            |d| recorded_backoffs.push(d),
            |_d| {},
        );

        assert!(result.is_err());
        assert_eq!(handle.restart_count, 3);
        assert!(!handle.registration.auto_restart);
        assert_eq!(handle.status(), WorkerStatus::Stopped);
        assert_eq!(
            recorded_backoffs,
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn status_starts_stopped_before_first_start() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("MCS_HOME", dir.path());
        let handle = WorkerHandle::new(registration("alpha"), PathBuf::from("/bin/true"));
        assert_eq!(handle.status(), WorkerStatus::Stopped);
    }
}
