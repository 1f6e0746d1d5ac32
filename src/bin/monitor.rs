use anyhow::Context;
use clap::{Arg, Command};
use std::path::PathBuf;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wrapped_custody::{
    factory::{Clock, Request, RequestKind, SystemClock},
    storage::FactoryStore,
    CustodyConfig,
};

/// Scan the store once and report stale pending requests
fn scan(config: &CustodyConfig) -> anyhow::Result<usize> {
    let store = FactoryStore::open_read_only(config.store_path())
        .context("Failed to open factory store")?;

    let Some(factory) = store.load_factory()? else {
        warn!("No factory deployed in {}", config.store_path().display());
        return Ok(0);
    };

    let now = SystemClock.now();
    let mut stale = 0;

    for (kind, ledger) in [
        (RequestKind::Mint, factory.mint_requests()),
        (RequestKind::Burn, factory.burn_requests()),
    ] {
        for request in ledger.stale(now, config.stale_after_secs) {
            report(kind, request, now);
            stale += 1;
        }
    }

    if factory.is_paused() {
        warn!("Factory is paused");
    }

    info!(
        "Scan complete: {} pending mint, {} pending burn, {} stale",
        factory.mint_requests().pending().count(),
        factory.burn_requests().pending().count(),
        stale
    );
    Ok(stale)
}

fn report(kind: RequestKind, request: &Request, now: u64) {
    warn!(
        "Stale {} request {} from {:?}: {} to {} pending for {}s (hash {:?})",
        kind,
        request.nonce,
        request.requester,
        request.amount,
        request.deposit,
        now.saturating_sub(request.timestamp),
        request.request_hash
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("custody-monitor")
        .version(wrapped_custody::VERSION)
        .about("Reports custody requests left pending too long")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .short('d')
                .help("Data directory holding the factory store"),
        )
        .arg(
            Arg::new("stale-after")
                .long("stale-after")
                .help("Age in seconds after which a pending request is reported"),
        )
        .arg(
            Arg::new("poll-interval")
                .long("poll-interval")
                .help("Seconds between scans"),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => CustodyConfig::from_file(path)?,
        None => CustodyConfig::default(),
    };
    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        config.data_dir = PathBuf::from(data_dir);
    }
    if let Some(stale_after) = matches.get_one::<String>("stale-after") {
        config.stale_after_secs = stale_after
            .parse()
            .context("--stale-after must be a number of seconds")?;
    }
    if let Some(poll_interval) = matches.get_one::<String>("poll-interval") {
        config.poll_interval_secs = poll_interval
            .parse()
            .context("--poll-interval must be a number of seconds")?;
    }
    config.validate()?;

    info!("Custody monitor starting");
    info!("Store: {}", config.store_path().display());
    info!(
        "Reporting requests pending longer than {}s, scanning every {}s",
        config.stale_after_secs, config.poll_interval_secs
    );

    let mut ticker = interval(Duration::from_secs(config.poll_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // rocksdb reads block, keep them off the runtime threads
                let scan_config = config.clone();
                match tokio::task::spawn_blocking(move || scan(&scan_config)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!("Scan failed: {:#}", e),
                    Err(e) => error!("Scan task panicked: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
