//! Server binary.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p morris-server -- --port 7777 --log-level debug`.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use morris_config::{CliArgs, Config, default_config_dir};
use morris_server::{GameServer, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = match args.config.clone().map_or_else(default_config_dir, Ok) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    if let Err(e) = morris_log::init_logging(Some(log_dir.as_path()), Some(&config)) {
        eprintln!("Failed to initialise logging: {e}");
    }

    let server_config = match ServerConfig::try_from(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        config_dir = %config_dir.display(),
        max_connections = server_config.max_connections,
        "starting morris-server"
    );

    let server = Arc::new(GameServer::new(server_config));
    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received");
                signal_server.shutdown();
            }
            Err(e) => tracing::warn!("cannot listen for Ctrl-C: {e}"),
        }
    });

    if let Err(e) = server.run().await {
        tracing::error!("server failed: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
