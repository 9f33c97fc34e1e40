//! netcat-engine: headless daemon for the netcat protocol tester.
//!
//! Reads JSON commands from stdin, one per line, and writes one JSON line per
//! response and per event to stdout.  Logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! netcat-engine [OPTIONS]
//!
//! Options:
//!   --config <PATH>           Engine config file [default: netcat.toml]
//!   --log-level <LEVEL>       Log filter, overrides the config file
//!   --write-default-config    Write the default config to --config and exit
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable        | Description                                  |
//! |-----------------|----------------------------------------------|
//! | `NETCAT_CONFIG` | Same as `--config`                           |
//! | `NETCAT_LOG`    | Same as `--log-level`                        |
//! | `RUST_LOG`      | Full `tracing` filter; wins over both above  |
//!
//! # Task layout
//!
//! ```text
//! stdin ──► main loop ──spawn──► [command task] ──┐
//!                                                 ├──► [stdout writer]
//! EventBus ──► [event pump] ──────────────────────┘
//! ```
//!
//! Each command runs in its own task so a slow connect never holds up the
//! next line.  Responses carry the request `id`, so they may complete out of
//! order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use netcat_engine::infrastructure::command_bridge::{handle_line, EventLine};
use netcat_engine::infrastructure::storage::{load_config, save_config, EngineConfig};
use netcat_engine::{BusError, SessionRegistry};

/// Time allowed for queued output to reach stdout on exit.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multi-session TCP/UDP protocol tester.
#[derive(Debug, Parser)]
#[command(
    name = "netcat-engine",
    about = "Multi-session TCP/UDP protocol tester driven by JSON lines on stdin",
    version
)]
struct Cli {
    /// Path of the TOML engine configuration.
    ///
    /// A missing file is not an error: built-in defaults are used.
    #[arg(long, default_value = "netcat.toml", env = "NETCAT_CONFIG")]
    config: PathBuf,

    /// Default log filter, e.g. `debug` or `netcat_engine=trace`.
    #[arg(long, env = "NETCAT_LOG")]
    log_level: Option<String>,

    /// Write the default configuration to `--config` and exit.
    #[arg(long)]
    write_default_config: bool,
}

impl Cli {
    /// Filter used when `RUST_LOG` is unset: the CLI flag, then the config
    /// file.
    fn log_filter(&self, config: &EngineConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config.log_level.clone())
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.write_default_config {
        save_config(&EngineConfig::default(), &cli.config)
            .with_context(|| format!("writing {}", cli.config.display()))?;
        println!("wrote default config to {}", cli.config.display());
        return Ok(());
    }

    let config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_filter(&config))),
        )
        .init();

    info!(
        config = %cli.config.display(),
        message_capacity = config.message_capacity,
        "netcat engine starting"
    );

    let registry = Arc::new(SessionRegistry::new(config));

    // ── stdout writer ─────────────────────────────────────────────────────────
    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(out_rx));

    // ── Event pump ────────────────────────────────────────────────────────────
    let pump = tokio::spawn(pump_events(Arc::clone(&registry), out_tx.clone()));

    // ── Command loop ──────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let registry = Arc::clone(&registry);
                    let out = out_tx.clone();
                    tokio::spawn(async move {
                        let result = handle_line(&registry, &line).await;
                        match serde_json::to_string(&result) {
                            Ok(json) => {
                                let _ = out.send(json);
                            }
                            Err(e) => error!(error = %e, "failed to serialize response"),
                        }
                    });
                }
                Ok(None) => {
                    info!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    break;
                }
            },
            signal = &mut ctrl_c => {
                match signal {
                    Ok(()) => info!("received Ctrl+C, shutting down"),
                    Err(e) => error!(error = %e, "failed to listen for Ctrl+C signal"),
                }
                break;
            }
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    registry.shutdown().await;
    pump.abort();
    drop(out_tx);
    if tokio::time::timeout(DRAIN_TIMEOUT, writer).await.is_err() {
        warn!("timed out flushing stdout");
    }

    info!("netcat engine stopped");
    Ok(())
}

async fn write_lines(mut rx: mpsc::UnboundedReceiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = rx.recv().await {
        let written = async {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        }
        .await;
        if let Err(e) = written {
            error!(error = %e, "stdout closed");
            return;
        }
    }
}

async fn pump_events(registry: Arc<SessionRegistry>, out: mpsc::UnboundedSender<String>) {
    let mut events = registry.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&EventLine { event }) {
                Ok(json) => {
                    if out.send(json).is_err() {
                        return;
                    }
                }
                Err(e) => error!(error = %e, "failed to serialize event"),
            },
            Err(BusError::Lagged(missed)) => {
                warn!(missed, "event output fell behind; oldest events dropped")
            }
            Err(BusError::Closed) => return,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
