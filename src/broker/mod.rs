//! Context-broker conventions.
//!
//! Machines are known by a short logical id ("312"); the broker stores their
//! sensors as entities whose ids wrap that logical id ("emeter-312",
//! "RoboticArm:312"). This module maps between the two and holds the per-zone
//! broker settings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

mod store;

pub use store::{BrokerConfigStore, BROKER_CONFIG_STORAGE_KEY, DEFAULT_CONFIG_KEY};


pub const DEFAULT_SERVICE: &str = "textileservice";
pub const DEFAULT_SERVICE_PATH: &str = "/textile";
pub const DEFAULT_ENTITY_PREFIXES: &str = "emeter, gmeter, dmeter";

/// Placeholder replaced by the logical id in entity templates
const ID_PLACEHOLDER: &str = "{id}";

/// Attributes that identify an entity rather than describe it
const ENTITY_KEY_ATTRIBUTES: [&str; 2] = ["id", "type"];

/// Broker tenant and entity naming for one zone
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfig {
    #[serde(rename = "fiwareService", default = "default_service")]
    pub service: String,

    #[serde(rename = "fiwareServicePath", default = "default_service_path")]
    pub service_path: String,

    /// Comma-separated prefixes or `{id}` templates
    #[serde(default = "default_entity_prefixes")]
    pub entity_prefixes: String,
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_service_path() -> String {
    DEFAULT_SERVICE_PATH.to_string()
}

fn default_entity_prefixes() -> String {
    DEFAULT_ENTITY_PREFIXES.to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            service_path: default_service_path(),
            entity_prefixes: default_entity_prefixes(),
        }
    }
}

impl BrokerConfig {
    /// Request headers selecting the tenant. Empty values are omitted.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Accept", "application/json".to_string())];
        if !self.service.is_empty() {
            headers.push(("Fiware-Service", self.service.clone()));
        }
        if !self.service_path.is_empty() {
            headers.push(("Fiware-ServicePath", self.service_path.clone()));
        }
        headers
    }

    pub fn entity_templates(&self) -> Vec<String> {
        parse_entity_templates(&self.entity_prefixes)
    }

    /// Broker entity ids carrying data for one logical machine id
    pub fn entity_ids_for(&self, logical_id: &str) -> Vec<String> {
        self.entity_templates()
            .iter()
            .map(|template| template.replacen(ID_PLACEHOLDER, logical_id, 1))
            .collect()
    }
}

/// Turn a prefix list into `{id}` templates.
///
/// - `"emeter, gmeter"` -> `["emeter-{id}", "gmeter-{id}"]`
/// - `"RoboticArm:,Gripper_"` -> `["RoboticArm:{id}", "Gripper_{id}"]`
/// - `"emeter-{id}"` is kept as is
///
/// A blank list falls back to the default prefixes.
pub fn parse_entity_templates(prefixes: &str) -> Vec<String> {
    let raw = if prefixes.trim().is_empty() {
        DEFAULT_ENTITY_PREFIXES
    } else {
        prefixes
    };

    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            if token.contains(ID_PLACEHOLDER) {
                token.to_string()
            } else if token.ends_with(['-', ':', '_']) {
                format!("{}{}", token, ID_PLACEHOLDER)
            } else {
                format!("{}-{}", token, ID_PLACEHOLDER)
            }
        })
        .collect()
}

/// REST path of a single entity
pub fn entity_path(entity_id: &str) -> String {
    format!("/v2/entities/{}", urlencoding::encode(entity_id))
}

/// REST path listing the ids of all entities of a type
pub fn entity_list_path(entity_type: &str) -> String {
    format!(
        "/v2/entities?type={}&options=keyValues&attrs=id",
        urlencoding::encode(entity_type)
    )
}

/// Logical id at the end of an entity id: its trailing run of digits.
///
/// `"emeter-312"` -> `"312"`, `"RoboticArm:7"` -> `"7"`, `"sensor"` -> None.
pub fn extract_logical_id(entity_id: &str) -> Option<String> {
    let digits_start = entity_id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    Some(entity_id[digits_start..].to_string())
}

/// Union of the descriptive attributes of several entities.
///
/// `id` and `type` are dropped; later entities win on name clashes. Returns
/// None when nothing is left.
pub fn merge_entity_attributes<I>(entities: I) -> Option<Map<String, Value>>
where
    I: IntoIterator<Item = Value>,
{
    let mut merged = Map::new();
    for entity in entities {
        let Value::Object(attributes) = entity else {
            continue;
        };
        for (name, value) in attributes {
            if !ENTITY_KEY_ATTRIBUTES.contains(&name.as_str()) {
                merged.insert(name, value);
            }
        }
    }

    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}

/// Order logical ids: numeric ids first by value, then the rest lexically
pub fn compare_logical_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Sort and de-duplicate logical ids
pub fn sort_logical_ids(ids: &mut Vec<String>) {
    ids.sort_by(|a, b| compare_logical_ids(a, b));
    ids.dedup();
}
