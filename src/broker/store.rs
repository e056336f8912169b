//! Per-zone broker settings persistence.
//!
//! Zones without their own entry use the `_default` entry, and the built-in
//! defaults when even that is missing.

use super::BrokerConfig;
use crate::storage::KeyValueStorage;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Storage key holding the per-zone settings map
pub const BROKER_CONFIG_STORAGE_KEY: &str = "orionConfigByZone";

/// Map key of the fallback entry
pub const DEFAULT_CONFIG_KEY: &str = "_default";

/// Persists broker settings keyed by zone
pub struct BrokerConfigStore {
    configs: RwLock<IndexMap<String, BrokerConfig>>,
    storage: Arc<dyn KeyValueStorage>,
}

impl BrokerConfigStore {
    /// Load settings from storage, seeding `_default` with `fallback` when
    /// nothing usable is stored
    pub fn new(storage: Arc<dyn KeyValueStorage>, fallback: BrokerConfig) -> Self {
        let configs = match storage.get(BROKER_CONFIG_STORAGE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(configs) => configs,
                Err(e) => {
                    warn!(error = %e, "Corrupt broker settings, using defaults");
                    seeded(fallback)
                }
            },
            Ok(None) => seeded(fallback),
            Err(e) => {
                warn!(error = %e, "Failed to read broker settings, using defaults");
                seeded(fallback)
            }
        };

        Self {
            configs: RwLock::new(configs),
            storage,
        }
    }

    /// Settings for a zone (`None` selects the default entry)
    pub fn config_for(&self, zone_id: Option<&str>) -> BrokerConfig {
        let configs = self.configs.read().unwrap_or_else(|e| e.into_inner());
        let key = zone_id.unwrap_or(DEFAULT_CONFIG_KEY);

        configs
            .get(key)
            .or_else(|| configs.get(DEFAULT_CONFIG_KEY))
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the zone has its own entry
    pub fn has_zone_config(&self, zone_id: &str) -> bool {
        self.configs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(zone_id)
    }

    /// Store settings for a zone (`None` replaces the default entry).
    ///
    /// The in-memory value is updated even when the storage write fails. The
    /// write happens under the lock so storage never ends on an older map.
    pub fn set_config(&self, zone_id: Option<&str>, config: BrokerConfig) -> Result<()> {
        let key = zone_id.unwrap_or(DEFAULT_CONFIG_KEY).to_string();

        let mut configs = self.configs.write().unwrap_or_else(|e| e.into_inner());
        configs.insert(key.clone(), config);
        let json =
            serde_json::to_string(&*configs).context("Failed to serialize broker settings")?;
        self.storage
            .set(BROKER_CONFIG_STORAGE_KEY, &json)
            .context("Failed to persist broker settings")?;
        drop(configs);

        info!(zone = %key, "Broker settings updated");
        Ok(())
    }
}

fn seeded(fallback: BrokerConfig) -> IndexMap<String, BrokerConfig> {
    let mut configs = IndexMap::new();
    configs.insert(DEFAULT_CONFIG_KEY.to_string(), fallback);
    configs
}
