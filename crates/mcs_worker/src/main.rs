//! Per-project worker binary: indexes one project directory and sits behind
//! a listening socket standing in for the out-of-scope language-protocol
//! surface (spec.md §1, §4.6, §6: argv shape documented there).
//!
//! The supervisor only spawns and monitors this process; it never speaks to
//! it over the socket. Indexing happens once at startup, then incrementally
//! via `reindex-file` sent as a line of JSON on stdin (a minimal stand-in for
//! the real worker's edit-apply surface).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mcs_indexer::{IndexerConfig, ProjectIndexer};
use mcs_logging::LogConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};

const LANGUAGE: &str = "bsl";

/// Argv shape exactly as documented in spec.md §4.6/§6.
#[derive(Parser, Debug)]
#[command(name = "mcs-worker")]
struct Args {
    #[arg(long)]
    project: PathBuf,

    #[arg(long, default_value = "streamable")]
    transport: String,

    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long)]
    port: u16,

    #[arg(long)]
    context: Option<String>,

    #[arg(long = "mode")]
    modes: Vec<String>,

    #[arg(long = "log-level")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    mcs_logging::init_logging(LogConfig {
        app_name: "mcs-worker",
        verbose: args.log_level.as_deref() == Some("debug"),
        quiet_console: false,
    })
    .context("failed to initialize logging")?;

    info!(
        project = %args.project.display(),
        transport = %args.transport,
        host = %args.host,
        port = args.port,
        context = ?args.context,
        modes = ?args.modes,
        "starting worker"
    );

    if !args.project.is_dir() {
        anyhow::bail!("project path is not a directory: {}", args.project.display());
    }

    let indexer = Arc::new(ProjectIndexer::new(
        args.project.clone(),
        LANGUAGE,
        IndexerConfig::default(),
    ));

    let run_stats = indexer.run().await;
    info!(
        scanned = run_stats.scanned,
        parsed = run_stats.parsed,
        skipped = run_stats.skipped_unchanged,
        failed = run_stats.failed,
        removed = run_stats.removed,
        "initial index complete"
    );

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "listening");

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    let stdin = tokio::io::stdin();
    let mut stdin_lines = BufReader::new(stdin).lines();
    // stdin is closed (Stdio::null()) whenever the supervisor spawns this
    // process (spec.md §6: "stdin is closed"), so `next_line` returns
    // `Ok(None)` immediately forever; once that happens stop polling it
    // rather than spin the select loop.
    let mut stdin_open = true;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((_socket, peer)) => {
                        // No language protocol implemented; the connection
                        // is accepted and immediately dropped.
                        info!(%peer, "accepted connection");
                    }
                    Err(err) => warn!("accept error: {err}"),
                }
            }
            line = stdin_lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => handle_stdin_command(&indexer, &line),
                    Ok(None) => stdin_open = false,
                    Err(err) => {
                        warn!("stdin read error: {err}");
                        stdin_open = false;
                    }
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, saving cache and exiting");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received interrupt, saving cache and exiting");
                break;
            }
        }
    }

    indexer.save(true);
    Ok(())
}

/// A minimal incremental-edit trigger: a line of JSON `{"reindex": "<relative path>"}`
/// re-parses one file synchronously (spec.md §4.4 "Incremental editing").
fn handle_stdin_command(indexer: &Arc<ProjectIndexer>, line: &str) {
    #[derive(serde::Deserialize)]
    struct ReindexCommand {
        reindex: String,
    }

    let Ok(cmd) = serde_json::from_str::<ReindexCommand>(line) else {
        return;
    };
    let path = indexer.project_path().join(&cmd.reindex);
    if let Err(err) = indexer.reindex_file_sync(&path) {
        warn!(file = %cmd.reindex, "reindex failed: {err}");
    }
}
