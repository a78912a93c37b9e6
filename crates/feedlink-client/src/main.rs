//! feedlink relay client
//!
//! Connects to a decoder line feed, wraps every line in a JSON envelope and
//! forwards it to an aggregation service, reconnecting both sides on failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use feedlink_core::config::{Config, OverflowPolicy, StallPolicy, load_config};
use feedlink_core::tracing_init::{default_filter, init_tracing};
use tracing::{error, info};

use feedlink_client::relay::{RelayConfig, RelayExit, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "feedlink-client")]
#[command(version, about = "feedlink relay client - decoder feed to aggregator")]
struct Args {
    /// Settings file (defaults to `<config dir>/feedlink/settings.json` when present)
    #[arg(long, env = "FEEDLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Source identity stamped on every envelope
    #[arg(long, env = "FEEDLINK_SRC_NAME")]
    src_name: Option<String>,

    /// Decoder feed host
    #[arg(long, env = "FEEDLINK_UPSTREAM_HOST")]
    upstream_host: Option<String>,

    /// Decoder feed port
    #[arg(long, env = "FEEDLINK_UPSTREAM_PORT")]
    upstream_port: Option<u16>,

    /// Aggregator host
    #[arg(long, env = "FEEDLINK_DOWNSTREAM_HOST")]
    downstream_host: Option<String>,

    /// Aggregator port
    #[arg(long, env = "FEEDLINK_DOWNSTREAM_PORT")]
    downstream_port: Option<u16>,

    /// Fixed delay before every reconnect, in milliseconds
    #[arg(long, env = "FEEDLINK_CONNECT_DELAY_MS")]
    connect_delay_ms: Option<u64>,

    /// Upper bound on one connect attempt, in milliseconds
    #[arg(long, env = "FEEDLINK_CONNECT_TIMEOUT_MS")]
    connect_timeout_ms: Option<u64>,

    /// Watchdog period, in milliseconds
    #[arg(long, env = "FEEDLINK_WATCHDOG_TICK_MS")]
    watchdog_tick_ms: Option<u64>,

    /// Upstream liveness timeout, in milliseconds
    #[arg(long, env = "FEEDLINK_UPSTREAM_TIMEOUT_MS")]
    upstream_timeout_ms: Option<u64>,

    /// Downstream liveness timeout, in milliseconds (default: twice the keepalive interval)
    #[arg(long, env = "FEEDLINK_DOWNSTREAM_TIMEOUT_MS")]
    downstream_timeout_ms: Option<u64>,

    /// Interval between pings sent to the aggregator, in milliseconds
    #[arg(long, env = "FEEDLINK_KEEPALIVE_INTERVAL_MS")]
    keepalive_interval_ms: Option<u64>,

    /// Maximum number of envelopes buffered while the aggregator is unreachable
    #[arg(long, env = "FEEDLINK_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// What to discard when the queue is full: drop-newest or drop-oldest
    #[arg(long, env = "FEEDLINK_OVERFLOW_POLICY")]
    overflow_policy: Option<OverflowPolicy>,

    /// What to do after a stall: reconnect, or exit with code 75
    #[arg(long, env = "FEEDLINK_STALL_POLICY")]
    stall_policy: Option<StallPolicy>,

    /// Start the process but do not run the relay
    #[arg(long, env = "FEEDLINK_DISABLE")]
    disable: bool,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long, env = "FEEDLINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation)
    #[arg(long, env = "FEEDLINK_LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Layer command-line and environment values over the loaded settings.
    fn apply(self, config: &mut Config) {
        let relay = &mut config.relay;
        if let Some(v) = self.src_name {
            relay.src_name = v;
        }
        if let Some(v) = self.upstream_host {
            relay.upstream_host = v;
        }
        if let Some(v) = self.upstream_port {
            relay.upstream_port = v;
        }
        if let Some(v) = self.downstream_host {
            relay.downstream_host = v;
        }
        if let Some(v) = self.downstream_port {
            relay.downstream_port = v;
        }
        if let Some(v) = self.connect_delay_ms {
            relay.connect_delay_ms = v;
        }
        if let Some(v) = self.connect_timeout_ms {
            relay.connect_timeout_ms = v;
        }
        if let Some(v) = self.watchdog_tick_ms {
            relay.watchdog_tick_ms = v;
        }
        if let Some(v) = self.upstream_timeout_ms {
            relay.upstream_timeout_ms = v;
        }
        if self.downstream_timeout_ms.is_some() {
            relay.downstream_timeout_ms = self.downstream_timeout_ms;
        }
        if let Some(v) = self.keepalive_interval_ms {
            relay.keepalive_interval_ms = v;
        }
        if let Some(v) = self.queue_capacity {
            relay.queue_capacity = v;
        }
        if let Some(v) = self.overflow_policy {
            relay.overflow_policy = v;
        }
        if let Some(v) = self.stall_policy {
            relay.stall_policy = v;
        }
        if self.disable {
            relay.enabled = false;
        }
        if let Some(v) = self.log_level {
            config.logging.level = v;
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);

    init_tracing(&default_filter(&config.logging.level), config.logging.json);

    let relay_config = RelayConfig::from_settings(&config.relay)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        src = %relay_config.src_name,
        upstream = %relay_config.upstream,
        downstream = %relay_config.downstream,
        "Starting feedlink-client"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let sigterm_future = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_future = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C shutdown signal");
            }
            _ = sigterm_future => {
                info!("Received SIGTERM shutdown signal");
            }
        }
        shutdown_tx.send_replace(true);
    });

    // Notify systemd that the relay is up (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    let supervisor = Supervisor::new(relay_config);
    let exit = supervisor.run(shutdown_rx).await;
    match exit {
        RelayExit::Stalled(role) => {
            error!(role = %role, code = exit.exit_code(), "Relay exiting after stall");
        }
        RelayExit::Disabled | RelayExit::Shutdown => info!("feedlink-client stopped"),
    }
    Ok(ExitCode::from(exit.exit_code()))
}
