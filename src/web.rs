#![cfg(not(tarpaulin_include))]

use data_sweeper::{app, config::ServerConfig};
use env_logger::Env;
use log::error;
use std::env;

/// Main entry point for the web application
///
/// Reads the server settings from `DATA_SWEEPER_*` environment variables
/// and an optional `<host:port>` argument, then serves the upload UI and
/// the REST API until the process is stopped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config = match ServerConfig::from_env(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("Usage: {} [host:port]", args[0]);
            return Err(e.into());
        }
    };

    app::run(config).await
}
