use anyhow::{Context, Result};
use clap::{Arg, Command};
use sheetdb::{
    config::Config,
    engine::{Engine, Schema},
    server::serve,
};
use std::{fs::OpenOptions, sync::Arc, sync::Mutex};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Main entry point for the sheetdb server.
///
/// This function:
/// 1. Parses command-line arguments for the config file and listen address
/// 2. Loads the configuration and initializes structured logging
/// 3. Loads the schema and opens the engine, creating missing tables
/// 4. Serves TCP clients until Ctrl-C or SIGTERM
///
/// # Arguments
/// - `--config FILE`: JSON config file (or the `CONFIG_PATH` environment variable)
/// - `--listen ADDR`: overrides the configured `host:port`
///
/// # Example Usage
/// ```bash
/// cargo run -- --config ./config/local.json --listen 127.0.0.1:7432
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("sheetdb")
        .about("Sheet-backed database server with a tiny SQL dialect")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .env("CONFIG_PATH")
                .required(true)
                .help("JSON config file"),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .value_name("ADDR")
                .help("Listen address, overrides host and port from the config"),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .context("missing --config")?;
    let config = Config::load(config_path)?;
    init_logging(&config)?;

    let listen = matches
        .get_one::<String>("listen")
        .cloned()
        .unwrap_or_else(|| config.listen_addr());

    let schema = Schema::load(&config.schema_path)?;
    let engine = Arc::new(
        Engine::open(config.engine_config(), schema).context("can't open storage")?,
    );

    tokio::select! {
        res = serve(engine, &listen, config.conn_timeout()) => res,
        _ = shutdown_signal() => {
            info!("shutting down");
            Ok(())
        }
    }
}

/// `local` logs human-readable lines to stdout. Every other environment logs
/// JSON, to `log_path` when set.
fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if config.is_local() {
        fmt().with_env_filter(filter).init();
        return Ok(());
    }

    match &config.log_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("can't open log file {}", path.display()))?;
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => fmt().json().with_env_filter(filter).init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "can't listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "can't listen for SIGTERM");
                std::future::pending::<()>().await
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
