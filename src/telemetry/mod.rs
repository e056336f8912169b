// Live machine telemetry consumed from the context broker

use crate::broker::{sort_logical_ids, BrokerConfig};
use crate::layout::MachineStatus;
use crate::overlay::LayoutStore;
use anyhow::Result;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::future::Future;
use tracing::{debug, warn};


/// Merged broker attributes for one logical machine id
pub type Attributes = Map<String, Value>;

/// Power draw (W) above which a machine counts as running
pub const ACTIVE_POWER_THRESHOLD: f64 = 50.0;

/// Phase current (A) above which a machine counts as running
pub const ACTIVE_CURRENT_THRESHOLD: f64 = 0.5;

const PHASE_CURRENT_ATTRIBUTES: [&str; 3] = ["Phase1Current", "Phase2Current", "Phase3Current"];

/// Source of live machine data, implemented by the broker client
pub trait TelemetrySource {
    /// Attributes of every broker entity belonging to `logical_id`, merged.
    /// `Ok(None)` when the broker knows nothing about the machine.
    fn machine_attributes(
        &self,
        logical_id: &str,
        config: &BrokerConfig,
    ) -> impl Future<Output = Result<Option<Attributes>>> + Send;

    /// Logical ids of all machines the broker has sensors for
    fn list_machine_ids(
        &self,
        config: &BrokerConfig,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Numeric `value` of an attribute, accepting numbers and numeric strings
fn numeric_value(attributes: &Attributes, name: &str) -> Option<f64> {
    match attributes.get(name)?.get("value")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Display status from live attributes, `fallback` when they say nothing
pub fn derive_status(attributes: Option<&Attributes>, fallback: MachineStatus) -> MachineStatus {
    let Some(attributes) = attributes else {
        return fallback;
    };

    if numeric_value(attributes, "TotalPower").is_some_and(|p| p > ACTIVE_POWER_THRESHOLD) {
        return MachineStatus::Active;
    }

    let any_current = PHASE_CURRENT_ATTRIBUTES
        .iter()
        .filter_map(|name| numeric_value(attributes, name))
        .any(|current| current > ACTIVE_CURRENT_THRESHOLD);
    if any_current {
        return MachineStatus::Active;
    }

    fallback
}

/// Display status for every machine of a zone.
///
/// The stored placement status is the fallback for machines with no data or a
/// failed lookup. An unknown zone yields an empty map.
pub async fn zone_statuses<S: TelemetrySource>(
    store: &LayoutStore,
    zone_id: &str,
    source: &S,
    config: &BrokerConfig,
) -> IndexMap<String, MachineStatus> {
    let layout = store.effective_layout();
    let Some(zone) = layout.get(zone_id) else {
        debug!(zone = %zone_id, "Zone not found, no statuses");
        return IndexMap::new();
    };

    let mut statuses = IndexMap::new();
    for (machine_id, placement) in &zone.machines {
        let status = match source.machine_attributes(machine_id, config).await {
            Ok(attributes) => derive_status(attributes.as_ref(), placement.status),
            Err(e) => {
                warn!(
                    zone = %zone_id,
                    machine_id = %machine_id,
                    error = %e,
                    "Telemetry lookup failed, using stored status"
                );
                placement.status
            }
        };
        statuses.insert(machine_id.clone(), status);
    }
    statuses
}

/// Broker machine ids that are not yet placed in `zone_id`, sorted
pub async fn available_machine_ids<S: TelemetrySource>(
    store: &LayoutStore,
    zone_id: &str,
    source: &S,
    config: &BrokerConfig,
) -> Result<Vec<String>> {
    let layout = store.effective_layout();
    let placed = layout.get(zone_id).map(|zone| &zone.machines);

    let mut ids: Vec<String> = source
        .list_machine_ids(config)
        .await?
        .into_iter()
        .filter(|id| !placed.is_some_and(|machines| machines.contains_key(id)))
        .collect();
    sort_logical_ids(&mut ids);
    Ok(ids)
}
