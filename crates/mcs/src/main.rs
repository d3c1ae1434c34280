//! CLI launcher wiring the supervisor, admin API, and control file bridge
//! (spec.md §4.7, §4.9; SPEC_FULL.md §A: "analogous to the teacher's
//! launcher binary").

mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mcs_logging::LogConfig;
use mcs_protocol::{ControlAction, ControlCommand};
use mcs_supervisor::{control_bridge, ControlFileBridge, Supervisor};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mcs", about = "Multi-tenant project supervisor and indexer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the supervisor, admin API, and monitor loop.
    Serve(ServeArgs),
    /// Send a command to an already-running supervisor via the control file.
    Control {
        action: ControlActionArg,
        project: String,
    },
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// YAML file of projects to register before `start_all`.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "0.0.0.0")]
    admin_host: String,

    #[arg(long, default_value_t = mcs_protocol::defaults::DEFAULT_ADMIN_PORT)]
    admin_port: u16,

    /// Path to the `mcs-worker` binary; defaults to a sibling of this executable.
    #[arg(long)]
    worker_binary: Option<PathBuf>,

    /// Directory scanned by `GET /admin/available-projects`.
    #[arg(long)]
    projects_root: Option<PathBuf>,

    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Debug)]
enum ControlActionArg {
    Start,
    Stop,
    Restart,
}

impl From<ControlActionArg> for ControlAction {
    fn from(action: ControlActionArg) -> Self {
        match action {
            ControlActionArg::Start => ControlAction::Start,
            ControlActionArg::Stop => ControlAction::Stop,
            ControlActionArg::Restart => ControlAction::Restart,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Control { action, project } => {
            let code = run_control(action.into(), project);
            std::process::exit(code);
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    mcs_logging::init_logging(LogConfig {
        app_name: "mcs",
        verbose: args.verbose,
        quiet_console: false,
    })
    .context("failed to initialize logging")?;

    let worker_binary = args.worker_binary.unwrap_or_else(default_worker_binary_path);
    let projects_root = args
        .projects_root
        .unwrap_or_else(|| mcs_protocol::paths::mcs_home().join("projects"));
    std::fs::create_dir_all(&projects_root).ok();

    info!(
        worker_binary = %worker_binary.display(),
        projects_root = %projects_root.display(),
        "starting supervisor"
    );

    let supervisor = Arc::new(Supervisor::new(worker_binary, projects_root));

    if let Some(config_path) = &args.config {
        let entries = config::load_projects_yaml(config_path)
            .with_context(|| format!("failed to load project config {}", config_path.display()))?;
        for entry in entries {
            let port = match entry.port {
                Some(port) => port,
                None => supervisor.find_free_port()?,
            };
            supervisor.add_server(entry.into_registration(port))?;
        }
    }

    supervisor.start_all();

    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handler(supervisor.clone(), shutdown.clone())?;

    tokio::select! {
        result = mcs_admin::serve(supervisor.clone(), &args.admin_host, args.admin_port) => {
            result.context("admin server exited")?;
        }
        _ = wait_for_shutdown(shutdown) => {
            info!("shutdown signal received, exiting");
        }
    }

    Ok(())
}

async fn wait_for_shutdown(flag: Arc<AtomicBool>) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

fn default_worker_binary_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("mcs-worker")))
        .unwrap_or_else(|| PathBuf::from("mcs-worker"))
}

/// Mirrors the launcher's own signal-handling style: a dedicated thread
/// blocking on `signal_hook::iterator::Signals`, flipping a shared flag on
/// SIGINT/SIGTERM (spec.md §4.7 "Signal handling").
#[cfg(unix)]
fn install_signal_handler(supervisor: Arc<Supervisor>, shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "received signal, shutting down");
            supervisor.shutdown();
            shutdown.store(true, Ordering::SeqCst);
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handler(_supervisor: Arc<Supervisor>, _shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

/// CLI-side control-file client (spec.md §4.9, §6: exit codes 0 success, 1
/// command rejected, 2 no running supervisor).
fn run_control(action: ControlAction, project: String) -> i32 {
    let bridge = ControlFileBridge::at_default_path();
    let Some(file) = bridge.read_control_file() else {
        eprintln!("no running supervisor");
        return 2;
    };
    if control_bridge::is_stale(&file) {
        eprintln!("no running supervisor (stale control file)");
        bridge.remove();
        return 2;
    }
    match bridge.append_command(ControlCommand { action, project }) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("failed to send command: {err}");
            1
        }
    }
}
