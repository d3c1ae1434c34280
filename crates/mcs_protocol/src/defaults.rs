//! Canonical default values shared across the supervisor, worker, and admin API.

/// Control file name, fixed (not configurable) under the managed home directory.
pub const CONTROL_FILE_NAME: &str = "multi_server.json";

/// Cache statistics file name, written per project under its managed subdirectory.
pub const CACHE_STATS_FILE_NAME: &str = "cache_stats.json";

/// Managed scratch subdirectory created inside each project directory.
pub const PROJECT_MANAGED_SUBDIR: &str = ".mcs";

/// Lower bound of the default port-assignment window (IANA ephemeral-safe range start).
pub const DEFAULT_BASE_PORT: u16 = 9200;

/// Width of the free-port search window.
pub const PORT_SEARCH_WINDOW: u16 = 100;

/// Extra headroom added on top of the registered-project count when reasoning about the
/// usable port range (see spec.md §6).
pub const DEFAULT_PORT_HEADROOM: u16 = 5;

/// Uptime after which a worker's restart counter resets to zero.
pub const STABLE_PERIOD_SECS: u64 = 60;

/// Maximum restart attempts before auto_restart is forced off.
pub const MAX_RESTART_ATTEMPTS: u32 = 3;

/// Backoff cap for restart attempts, in seconds.
pub const MAX_RESTART_BACKOFF_SECS: u64 = 30;

/// Default graceful-stop timeout before force-kill.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;

/// Timeout waiting for a force-killed child to actually exit.
pub const FORCE_KILL_JOIN_TIMEOUT_SECS: u64 = 5;

/// Supervisor monitor loop tick interval.
pub const MONITOR_TICK_SECS: u64 = 5;

/// Grace period after `start_all` before the monitor loop begins restarting dead workers.
pub const MONITOR_GRACE_PERIOD_SECS: u64 = 10;

/// Default bounded concurrency for the project indexer's parse worker pool.
pub const DEFAULT_PARSE_CONCURRENCY: usize = 500;

/// Per-file parse timeout.
pub const PARSE_TIMEOUT_SECS: u64 = 30;

/// Watchdog: warn if no parse progress occurs for this long.
pub const WATCHDOG_STALL_SECS: u64 = 60;

/// Persist the fingerprint cache at least this often during a long indexing run.
pub const SAVE_EVERY_N_FILES: usize = 200;

/// Default admin log-tail size.
pub const DEFAULT_LOG_TAIL_LINES: usize = 200;

/// Default admin HTTP API port (spec.md §6: "Optional admin port is exposed
/// separately when positive").
pub const DEFAULT_ADMIN_PORT: u16 = 9100;
