mod bridge;
mod config;
mod credentials;
mod error;
mod models;
mod mqtt;
mod netatmo;
mod utils;

use log::{error, info};

use bridge::Bridge;
use config::BridgeConfig;
use credentials::{CredentialStore, JsonFileStore};
use error::{BridgeError, StoreError};
use mqtt::{MessageBus, MqttBus, Publisher, TopicMapper};
use netatmo::{StationClient, TokenRefresher};
use utils::format_datetime;

async fn build_and_run(config: BridgeConfig, bus: MqttBus) -> Result<(), BridgeError> {
    let store = JsonFileStore::new(&config.token_file);
    let credential = match store.load() {
        Ok(credential) => credential,
        Err(e @ StoreError::NotFound { .. }) => {
            error!(
                "No {} found. Please create one.",
                store.path().display()
            );
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        "Stored access token valid until {}",
        format_datetime(&credential.expires_at)
    );

    let http = netatmo::http_client(config.http_timeout).map_err(error::ApiError::from)?;
    let refresher = TokenRefresher::new(http.clone(), &config, credential, store)?;
    let stations = StationClient::new(http, &config)?;

    let mut bridge = Bridge::new(
        refresher,
        stations,
        TopicMapper::new(config.topic_prefix.as_str()),
        Publisher::new(bus),
        config.interval,
    );

    bridge.run().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match BridgeConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}. Exiting...", e);
            return Err(e.into());
        }
    };

    info!(
        "Starting netatmo bridge: {} -> mqtt://{}:{}, every {} seconds",
        config.base_url,
        config.mqtt.host,
        config.mqtt.port,
        config.interval.as_secs()
    );

    let bus = MqttBus::connect(&config.mqtt);
    let shutdown_bus = bus.clone();

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        let _ = tx.send(());
    });

    // Run the bridge or wait for shutdown signal
    tokio::select! {
        result = build_and_run(config, bus) => {
            if let Err(e) = result {
                error!("Fatal error: {}", e);
                shutdown_bus.close().await;
                return Err(e.into());
            }
        }
        Ok(()) = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
            shutdown_bus.close().await;
        }
    }

    Ok(())
}
