use anyhow::{Context, Result};
use floorplan::api::{create_router, LayoutAppState};
use floorplan::broker::BrokerConfigStore;
use floorplan::config::{load_config, FloorplanConfig};
use floorplan::layout::base;
use floorplan::overlay::LayoutStore;
use floorplan::storage::{FileStorage, KeyValueStorage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "floorplan=info".into()),
        )
        .init();

    info!("Floorplan starting...");

    let config_path = PathBuf::from(
        std::env::var("FLOORPLAN_CONFIG").unwrap_or_else(|_| "floorplan.toml".to_string()),
    );
    let mut config = if config_path.exists() {
        load_config(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        warn!(path = %config_path.display(), "Config file not found, using defaults");
        FloorplanConfig::default()
    };

    if let Ok(port) = std::env::var("FLOORPLAN_PORT") {
        config.api.port = port
            .parse()
            .with_context(|| format!("Invalid FLOORPLAN_PORT: {}", port))?;
    }

    let storage: Arc<dyn KeyValueStorage> = Arc::new(
        FileStorage::new(&config.storage.directory)
            .context("Failed to initialize storage directory")?,
    );
    info!(directory = %config.storage.directory.display(), "Storage ready");

    let base_layout = match &config.layout.base_layout {
        Some(path) => {
            info!(path = %path.display(), "Loading base layout from file");
            base::load_from_file(path)
        }
        None => base::bundled(),
    };

    let store = Arc::new(LayoutStore::new(
        base_layout,
        Arc::clone(&storage),
        config.layout.overlay_key.clone(),
    ));
    let broker_configs = Arc::new(BrokerConfigStore::new(
        Arc::clone(&storage),
        config.broker.clone(),
    ));

    let state = LayoutAppState {
        store,
        broker_configs,
    };
    let app = create_router(state, config.api.cors);

    let addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    info!("Floorplan stopped");
    Ok(())
}
