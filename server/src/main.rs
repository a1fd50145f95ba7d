//! Cat Battle Server
//!
//! Authoritative backend for collecting cats and fighting turn-based battles.

mod config;
mod game;
mod network;
mod persistence;
mod random;

use std::sync::Arc;

use log::{error, info};

use crate::config::ServerConfig;
use crate::game::GameService;
use crate::network::Server;
use crate::random::GameRng;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Cat Battle Server...");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let store = match persistence::open_store(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = persistence::seed_catalog(store.as_ref(), config.seed_demo_user).await {
        error!("Failed to seed catalog: {}", e);
        std::process::exit(1);
    }

    if config.rng_seed.is_some() {
        info!("Using fixed RNG seed");
    }
    let rng = GameRng::from_config(config.rng_seed);
    let service = Arc::new(GameService::new(store, Box::new(rng)));

    let server = match Server::bind(&config.listen_addr(), service).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind {}: {}", config.listen_addr(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Server stopped: {}", e);
        std::process::exit(1);
    }
}
