// CLI entry point for the Duel Lobby relay.
//
// Starts a standalone relay that game clients send datagrams to. See
// `server.rs` for the receive loop and `dispatch.rs` for record handling.
//
// Log verbosity follows `RUST_LOG` (default `info`); `RUST_LOG=debug` also
// shows every dropped record and why.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use duel_lobby_relay::room::DEFAULT_MAX_CODE_ATTEMPTS;
use duel_lobby_relay::server::{RelayConfig, start_relay};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Room and relay server for two-player matches
#[derive(Parser, Debug)]
#[command(name = "duel-relay", version, about)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// UDP port to listen on
    #[arg(long, short, default_value_t = 3000)]
    port: u16,

    /// Random code draws before room creation scans for a free code
    #[arg(long, default_value_t = DEFAULT_MAX_CODE_ATTEMPTS)]
    max_code_attempts: u32,

    /// Fixed seed for room codes (reproducible runs)
    #[arg(long)]
    seed: Option<u64>,
}

impl From<Cli> for RelayConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            max_code_attempts: cli.max_code_attempts,
            seed: cli.seed,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from(Cli::parse());
    let bind = format!("{}:{}", config.host, config.port);
    let (handle, addr) = start_relay(config).with_context(|| format!("failed to bind {bind}"))?;

    // SIGINT/SIGTERM only raise the flag; the relay shuts down from here.
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("failed to install signal handler")?;
    }

    info!(%addr, "relay listening, stop with Ctrl+C");
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("shutting down");
    handle.stop();
    Ok(())
}
