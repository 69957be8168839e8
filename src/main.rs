//! Realtime Bench - low-latency submission endpoint benchmark
//!
//! Selects one test network, pre-signs a batch of operations and submits them
//! one by one through the network's realtime endpoint, reporting the latency
//! of the submission alone. The pool refills itself in the background.

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::Parser;
use realtime_bench::config::Config;
use realtime_bench::dispatcher::{Dispatcher, DispatcherSettings};
use realtime_bench::endpoints;
use realtime_bench::rpc_manager::HttpClientFactory;
use realtime_bench::tx_builder::Eip1559Signer;
use realtime_bench::types::NetworkId;
use realtime_bench::wallet::WalletManager;
use realtime_bench::PoolError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Network to benchmark (megaeth, rise, abstract)
    #[arg(short, long, default_value = "select")]
    network: NetworkId,

    /// Number of operations to submit
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Delay between submissions in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    interval_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Metrics port (overrides the config file)
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    info!("🚀 Starting Realtime Bench");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    info!("📋 Loading configuration from: {}", args.config);
    let config = load_config(&args.config)?;

    if args.network.is_sentinel() {
        anyhow::bail!(
            "{} (use --network with one of: {})",
            PoolError::NoNetworkSelected,
            NetworkId::ALL
                .iter()
                .filter(|n| !n.is_sentinel())
                .map(|n| n.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let wallet = WalletManager::from_config(&config.wallet).context("Failed to load wallet")?;
    info!("💼 Wallet address: {}", wallet.address());

    if config.monitoring.enable_metrics {
        let port = args.metrics_port.unwrap_or(config.monitoring.metrics_port);
        info!("📊 Starting metrics server on port {}", port);
        tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let signer = Arc::new(Eip1559Signer::new(wallet.signer()));
    let factory = config.rpc.urls.iter().fold(
        HttpClientFactory::new(signer, config.rpc.timeout()),
        |factory, (network, url)| factory.with_rpc_override(*network, url.clone()),
    );
    let mut dispatcher = Dispatcher::new(
        Arc::new(factory),
        DispatcherSettings {
            batch_size: config.pool.batch_size,
            history_capacity: config.pool.history_capacity,
        },
    );

    info!("🌐 Selecting network: {}", args.network);
    let status = dispatcher
        .select_network(args.network)
        .await
        .with_context(|| format!("Failed to prepare pool for {}", args.network))?;
    if let Some(status) = status {
        info!(
            "✅ Pool ready: {} operations from sequence {}",
            status.length, status.base_sequence
        );
    }

    run_benchmark(&mut dispatcher, args.count, Duration::from_millis(args.interval_ms)).await;
    print_summary(&dispatcher);
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        "realtime_bench=debug,info"
    } else {
        "realtime_bench=info,warn,error"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        dotenvy::dotenv().ok();
        Ok(Config::default())
    }
}

/// Submit `count` operations, one per interval tick
async fn run_benchmark(dispatcher: &mut Dispatcher, count: usize, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut sent = 0;

    while sent < count {
        tokio::select! {
            _ = ticker.tick() => {
                sent += 1;
                match dispatcher.dispatch().await {
                    Ok(record) => {
                        println!("[{}/{}] {}", sent, count, record);
                        if let Some(link) = record.explorer_link() {
                            println!("        {}", link);
                        }
                    }
                    Err(e @ PoolError::Exhausted { .. }) => {
                        warn!("{}; waiting for refill", e);
                        dispatcher.wait_for_refill().await;
                    }
                    Err(e) => error!("❌ {}", e),
                }
                for notice in dispatcher.take_notices() {
                    warn!("⚠️ {}", notice);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Received shutdown signal");
                break;
            }
        }
    }
}

fn print_summary(dispatcher: &Dispatcher) {
    let network = dispatcher.selected_network();
    let history = dispatcher.history();
    info!("📊 Summary for {}:", network);
    info!("   Successful submissions: {}", dispatcher.successful_dispatches());
    if let Some(mean) = history.mean_elapsed_ms(network) {
        info!("   Mean submission latency: {:.1}ms", mean);
    }
    info!("   Refills triggered: {}", dispatcher.refills_triggered());
    if let Some(status) = dispatcher.pool_status() {
        info!(
            "   Pool: {} of {} used, {} available",
            status.cursor, status.length, status.available
        );
    }
    info!("👋 Shutting down gracefully...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_rejected() {
        assert!(Args::try_parse_from(["realtime-bench", "--interval-ms", "0"]).is_err());
        let args = Args::try_parse_from(["realtime-bench", "--interval-ms", "1"]).unwrap();
        assert_eq!(args.interval_ms, 1);
    }
}
