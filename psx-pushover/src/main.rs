use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use psx_pushover::{
    cli::Cli,
    handlers::register_psx_handlers,
    notifier,
    protocol::{AllowList, LineParser},
    pushover::PushoverClient,
    store::Store,
    supervisor::Supervisor,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs go to stderr; stdout carries only the banner and printouts.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("psx_pushover=info,warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("PSX Pushover connector v{VERSION}\n");
    init_tracing();

    let cli = Cli::parse();
    let pushover = PushoverClient::new(cli.pushover_config())
        .context("failed to build Pushover client")?;
    let drain_timeout = pushover.config().timeout;
    let (notifier, delivery) = notifier::spawn(pushover, cli.queue_capacity);

    let mut store = Store::new();
    register_psx_handlers(&mut store, notifier);

    let supervisor = Supervisor::new(
        cli.server_addr(),
        store,
        LineParser::new(AllowList::psx_default()),
        cli.retry_policy(),
    );
    info!(addr = supervisor.addr(), "PSX bridge starting");

    // Dropping the store drops the last notifier handle, so the worker
    // finishes what is queued and exits.
    drop(supervisor.run_until_ctrl_c().await);
    println!("\nStopped by keyboard interrupt (Ctrl-C)");

    if tokio::time::timeout(drain_timeout, delivery).await.is_err() {
        warn!("pending notifications abandoned at shutdown");
    }

    Ok(())
}
