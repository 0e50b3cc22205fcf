use devserver::LOG_DIR_NAME;
use devserver::error::DevServerError;
use devserver::logger::initialize as LoggerInitialize;
use devserver::server::DevServer;

use devserver_core::config::DevServerConfig;

use common::ErrorLocation;

use std::env::current_dir;
use std::fs::create_dir_all;
use std::panic::Location;
use std::process::ExitCode;

use log::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("devserver: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), DevServerError> {
    // DEVSERVER_BASE_PORT / DEVSERVER_PORT_RETRY may come from .env
    dotenvy::dotenv().ok();

    let project_dir = current_dir().map_err(|e| DevServerError::DevServer {
        message: format!("Failed to get working directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let log_dir = project_dir.join(LOG_DIR_NAME);
    create_dir_all(&log_dir).map_err(|e| DevServerError::DevServer {
        message: format!("Failed to create log directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Initialize logger FIRST
    LoggerInitialize(&log_dir)?;

    info!("Devserver starting in {}", project_dir.display());
    info!("Log directory: {}", log_dir.display());

    let config = DevServerConfig::load(&project_dir)?;
    let server = DevServer::start(&project_dir, config).await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| DevServerError::DevServer {
            message: format!("Failed to listen for Ctrl-C: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    info!("Shutting down");
    server.shutdown().await;
    Ok(())
}
