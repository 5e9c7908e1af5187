//! Face Daemon
//!
//! Standalone server process for the robot face session controller.
//! The speech pipeline connects over TCP (or a Unix socket) and streams
//! newline-delimited JSON; the daemon turns it into expression, blink and
//! text updates for the renderer.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (127.0.0.1:8888)
//! face-daemon
//!
//! # Listen on a Unix socket instead
//! face-daemon --socket-path /tmp/face.sock
//!
//! # Emit presenter events as JSON Lines on stdout for a renderer to consume
//! face-daemon --presenter jsonl | my-renderer
//!
//! # With verbose logging
//! RUST_LOG=debug face-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `FACE_CONFIG`: Config file path (default: `~/.config/robot-face/face.toml`)
//! - `FACE_LISTEN`, `FACE_SOCKET`: Listen address or socket path
//! - `FACE_*`: Any other setting, see the config module
//! - `FACE_LOG_LEVEL`: Log level (same as `--log-level`)
//! - `RUST_LOG`: Log filter (overrides `--log-level`)
//!
//! # Files
//!
//! - PID file: `$XDG_RUNTIME_DIR/robot-face/face.pid` (or `/tmp/robot-face-$UID/face.pid`)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown (removes PID file and socket)

mod pidfile;
mod server;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use face_conductor::config::{default_config_path, load_config_from_path, ConfigOverrides};
use face_conductor::{
    transport, ChannelPresenter, Conductor, LogPresenter, Presenter, TransitionPolicy,
};

use crate::pidfile::{default_pid_path, remove_pid_file, write_pid_file};
use crate::server::{DaemonServer, ServerConfig};

/// Where presenter calls go
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PresenterKind {
    /// Log each change with tracing
    Log,
    /// One JSON object per change on stdout
    Jsonl,
}

/// Robot face session daemon
#[derive(Parser, Debug)]
#[command(name = "face-daemon", version, about)]
struct Args {
    /// Config file path
    #[arg(short, long, env = "FACE_CONFIG")]
    config: Option<PathBuf>,

    /// TCP listen address (e.g. 127.0.0.1:8888)
    #[arg(long, env = "FACE_LISTEN", conflicts_with = "socket_path")]
    listen: Option<String>,

    /// Unix socket path
    #[arg(long, env = "FACE_SOCKET")]
    socket_path: Option<PathBuf>,

    /// Overlapping transition handling: drop or latest
    #[arg(long, value_parser = parse_policy)]
    transition_policy: Option<TransitionPolicy>,

    /// Fixed blink seed for reproducible timing
    #[arg(long)]
    blink_seed: Option<u64>,

    /// Presenter backend
    #[arg(long, value_enum, default_value_t = PresenterKind::Log)]
    presenter: PresenterKind,

    /// PID file path
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "FACE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn parse_policy(value: &str) -> Result<TransitionPolicy, String> {
    TransitionPolicy::parse(value).ok_or_else(|| format!("unknown transition policy '{value}'"))
}

/// Initialize logging; RUST_LOG wins over --log-level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("face_daemon={level},face_conductor={level}")));

    // stdout belongs to the jsonl presenter
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the presenter, plus the stdout writer task for jsonl
fn build_presenter(kind: PresenterKind) -> (Box<dyn Presenter + Send>, Option<JoinHandle<()>>) {
    match kind {
        PresenterKind::Log => (Box::new(LogPresenter), None),
        PresenterKind::Jsonl => {
            let (presenter, mut events) = ChannelPresenter::new();
            let writer = tokio::spawn(async move {
                let mut stdout = tokio::io::stdout();
                while let Some(event) = events.recv().await {
                    let mut line = match serde_json::to_string(&event) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode presenter event");
                            continue;
                        }
                    };
                    line.push('\n');
                    if let Err(e) = stdout.write_all(line.as_bytes()).await {
                        error!(error = %e, "stdout closed, dropping presenter output");
                        break;
                    }
                    // Flush errors surface on the next write
                    let _ = stdout.flush().await;
                }
            });
            (Box::new(presenter), Some(writer))
        }
    }
}

/// Resolve once SIGINT or SIGTERM arrives
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Starting face daemon");
    info!("PID: {}", std::process::id());

    // Configuration: file, then environment, then CLI
    let mut config = load_config_from_path(args.config.clone().or_else(default_config_path))?;
    let mut overrides = ConfigOverrides::new();
    if let Some(addr) = args.listen.clone() {
        overrides = overrides.with_listen_addr(addr);
    }
    if let Some(path) = args.socket_path.clone() {
        overrides = overrides.with_socket_path(path);
    }
    if let Some(policy) = args.transition_policy {
        overrides = overrides.with_transition_policy(policy);
    }
    if let Some(seed) = args.blink_seed {
        overrides = overrides.with_blink_seed(seed);
    }
    overrides.apply(&mut config);
    config.validate()?;
    info!(
        source = %config.source(),
        listen = %config.transport.describe(),
        policy = ?config.session.transition_policy,
        "Configuration loaded"
    );

    // Get PID file path and write it
    let pid_path = args.pid_file.clone().unwrap_or_else(default_pid_path);
    write_pid_file(&pid_path)?;

    let acceptor = match transport::bind(&config.transport).await {
        Ok(acceptor) => acceptor,
        Err(e) => {
            error!(error = %e, "Failed to start listener");
            remove_pid_file(&pid_path);
            return Err(anyhow::anyhow!(
                "Failed to listen on {}: {e}. Check if another daemon is running.",
                config.transport.describe()
            ));
        }
    };

    let (presenter, writer) = build_presenter(args.presenter);
    let (handle, session_task) = Conductor::spawn(config.conductor_config(), presenter);
    info!("Session started and ready");

    let mut server = DaemonServer::new(
        acceptor,
        handle.clone(),
        ServerConfig::from(&config.transport),
    );

    info!(listen = %server.local_description(), "Listening for connections");

    // Spawn a task to handle shutdown signals
    let shutdown = server.shutdown_notifier();
    let connections = server.connections();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!(active_connections = connections.len(), "Stopping server");
        shutdown.notify_one();
    });

    let served = server.run().await;
    drop(server);

    // Graceful shutdown
    info!("Performing graceful shutdown...");
    if handle.shutdown().await.is_err() {
        warn!("Session had already stopped");
    }
    drop(handle);
    match session_task.await {
        // Dropping the presenter closes the jsonl channel
        Ok(presenter) => drop(presenter),
        Err(e) => error!(error = %e, "Session task failed"),
    }
    if let Some(writer) = writer {
        if let Err(e) = writer.await {
            warn!(error = %e, "Presenter writer failed");
        }
    }

    // Clean up PID file
    remove_pid_file(&pid_path);

    served?;
    info!("Face daemon stopped cleanly");
    Ok(())
}
