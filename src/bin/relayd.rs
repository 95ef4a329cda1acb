//! relayd - drive a Claude Code session in tmux and mirror its conversation
//!
//! # Usage
//!
//! ```bash
//! # Start an instance and bridge it to stdio.
//! # stdin lines are typed into the session; events are printed as JSON lines.
//! relayd run --session demo --cwd ~/project
//!
//! # Reconcile a transcript and print the conversation plus tool bookkeeping
//! relayd replay ~/.claude/projects/-home-me-project/<session>.jsonl
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to change verbosity.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use relay_core::SessionId;
use relay_protocol::{parse_jsonl, OutboundEvent};
use relay_tmux::TmuxCli;
use relayd::{EventReconciler, RelayConfig, SessionCoordinator};

/// Line that sends Ctrl-C to the session instead of typing text.
const INTERRUPT_COMMAND: &str = ":interrupt";

/// relay - remote control for Claude Code sessions in tmux
#[derive(Parser, Debug)]
#[command(name = "relayd", version, about)]
struct Args {
    /// Config file (defaults to $RELAY_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start one instance and bridge it to stdin/stdout
    Run {
        /// Instance id (also names the tmux session)
        #[arg(long)]
        session: String,
        /// Working directory for the assistant
        #[arg(long, default_value = ".")]
        cwd: PathBuf,
    },
    /// Reconcile a JSONL transcript and print the result as JSON
    Replay {
        /// History file, one record per line
        file: PathBuf,
        /// Live deltas to apply after the history, one per line
        #[arg(long)]
        deltas: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    match args.command {
        Command::Run { session, cwd } => run_session(args.config.as_deref(), &session, &cwd),
        Command::Replay { file, deltas } => replay(&file, deltas.as_deref()),
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relayd=info".parse()?)
                .add_directive("relay_core=info".parse()?)
                .add_directive("relay_protocol=info".parse()?)
                .add_directive("relay_tmux=info".parse()?),
        )
        .init();
    Ok(())
}

// ============================================================================
// run
// ============================================================================

fn run_session(config_path: Option<&Path>, session: &str, cwd: &Path) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let result = runtime.block_on(run_session_async(config_path, session, cwd));
    // A pending stdin read would otherwise block runtime drop until the next line
    runtime.shutdown_background();
    result
}

async fn run_session_async(config_path: Option<&Path>, session: &str, cwd: &Path) -> Result<()> {
    let config = RelayConfig::load(config_path).context("Failed to load configuration")?;
    let id = SessionId::parse(session).context("Invalid session id")?;
    let cwd = std::fs::canonicalize(cwd)
        .with_context(|| format!("Working directory {} is not accessible", cwd.display()))?;

    let tmux = TmuxCli::new(config.tmux.clone());
    if !tmux.is_available().await {
        bail!("tmux binary {:?} is not available", tmux.config().binary);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        session = %id,
        cwd = %cwd.display(),
        "relayd starting"
    );

    let coordinator = Arc::new(SessionCoordinator::new(config, Arc::new(tmux)));
    let cancel_token = CancellationToken::new();

    let printer = spawn_printer(&coordinator, cancel_token.clone());

    coordinator
        .create_session(id.clone())
        .context("Failed to register session")?;
    if !coordinator.start(&id, &cwd).await {
        coordinator.shutdown().await;
        bail!("Failed to start session {id}");
    }
    info!(session = %id, status = %coordinator.status(&id).await, "Session ready");

    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Error waiting for Ctrl-C");
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    forward_stdin(&coordinator, &id, &cancel_token).await;

    cancel_token.cancel();
    coordinator.shutdown().await;
    if let Err(e) = printer.await {
        warn!(error = %e, "Event printer task failed");
    }

    info!("relayd stopped");
    Ok(())
}

/// Prints outbound events as JSON lines; cancels when the session stops.
fn spawn_printer(
    coordinator: &SessionCoordinator,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut events = coordinator.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => break,

                received = events.recv() => match received {
                    Ok(message) => {
                        match message.to_json_line() {
                            Ok(line) => println!("{line}"),
                            Err(e) => warn!(error = %e, "Failed to serialize event"),
                        }
                        if message.event == (OutboundEvent::StatusChanged { is_running: false }) {
                            info!(session = %message.session_id, "Session ended");
                            cancel_token.cancel();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Output printer lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("Event printer stopped");
    })
}

/// Types stdin lines into the session until EOF or cancellation.
async fn forward_stdin(
    coordinator: &SessionCoordinator,
    id: &SessionId,
    cancel_token: &CancellationToken,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => break,

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let accepted = if line.trim() == INTERRUPT_COMMAND {
                        coordinator.interrupt(id).await
                    } else {
                        coordinator.send(id, line).await
                    };
                    if !accepted {
                        warn!(session = %id, "Input was not delivered");
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read stdin");
                    break;
                }
            },
        }
    }
}

// ============================================================================
// replay
// ============================================================================

fn replay(file: &Path, deltas: Option<&Path>) -> Result<()> {
    let history = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut reconciler = EventReconciler::new();
    reconciler.reconcile_history(&parse_jsonl(&history));

    if let Some(path) = deltas {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        reconciler.reconcile_delta(&parse_jsonl(&text));
    }

    let output = serde_json::json!({
        "messages": reconciler.displayed_messages(),
        "tools": reconciler.tracker().snapshot(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize conversation")?
    );
    Ok(())
}
