//! Poolgate binary entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use poolgate::config::ConfigLoader;
use poolgate::listener::ProxyListener;
use poolgate::manager::StaticBackendManager;
use poolgate::monitor;
use poolgate::pool::ContainerPool;
use poolgate::stats::StatsServer;

/// TLS-terminating TCP reverse proxy over a container pool.
#[derive(Debug, Parser)]
#[command(name = "poolgate", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "poolgate.toml")]
    config: PathBuf,

    /// Log filter override, e.g. "debug" or "poolgate=trace".
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ConfigLoader::new().load_or_default(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    let filter = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    info!(
        config = %cli.config.display(),
        listener = %config.listener.socket_addr(),
        "starting poolgate"
    );

    if config.manager.backends.is_empty() {
        error!("no backends configured; set [manager] backends in the configuration file");
        return ExitCode::FAILURE;
    }

    let manager = Arc::new(StaticBackendManager::new(config.manager.backends.clone()));
    let monitor = monitor::from_mode(config.monitor.mode);

    let pool = match ContainerPool::new(manager, config.pool.clone(), Arc::clone(&monitor)) {
        Ok(pool) => Arc::new(pool),
        Err(error) => {
            error!(%error, "cannot create container pool");
            return ExitCode::FAILURE;
        }
    };

    for error in pool.initialise().await {
        warn!(%error, "initial provisioning failure");
    }

    if config.stats.enabled {
        let stats = StatsServer::new(config.stats.clone(), Arc::clone(&pool));
        tokio::spawn(async move {
            if let Err(error) = stats.run().await {
                error!(%error, "statistics endpoint failed");
            }
        });
    }

    let listener = ProxyListener::new(config.listener.clone(), Arc::clone(&pool), Arc::clone(&monitor));
    let result = listener.run().await;

    monitor.close();
    for error in pool.shutdown().await {
        warn!(%error, "teardown failure");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "listener failed");
            ExitCode::FAILURE
        }
    }
}
