use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use swarmgate::api::server::serve_plugin;
use swarmgate::cli::Cli;
use swarmgate::config::AppConfig;
use swarmgate::driver::SecretsDriver;
use swarmgate::observability::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    if let Err(err) = init_logging(level, cli.json_logs) {
        eprintln!("Failed to initialize logging: {err}");
        process::exit(1);
    }

    info!(
        app_name = swarmgate::APP_NAME,
        version = swarmgate::VERSION,
        "Starting swarmgate secrets driver"
    );

    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {err}");
            process::exit(1);
        }
    };
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }

    let driver = match SecretsDriver::new(config.clone()).await {
        Ok(driver) => Arc::new(driver),
        Err(err) => {
            error!(provider = %config.provider, "Failed to initialize secrets driver: {err}");
            process::exit(1);
        }
    };

    if let Err(err) = serve_plugin(&config.socket_path, Arc::clone(&driver)).await {
        error!("Plugin server failed: {err}");
        driver.stop().await;
        process::exit(1);
    }

    driver.stop().await;
    info!("Shutdown complete");
}
