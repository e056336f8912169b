//! Base layout loading.
//!
//! The base layout ships inside the binary. Operators can point the service at
//! a replacement file; either way a malformed document degrades to an empty
//! layout instead of failing startup.

use super::{Layout, Zone};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const BUNDLED_LAYOUT: &str = include_str!("../../assets/layout.json");

/// Base layout compiled into the binary
pub fn bundled() -> Layout {
    parse_layout(BUNDLED_LAYOUT)
}

/// Load a base layout from disk, empty if the file is missing or unreadable
pub fn load_from_file(path: &Path) -> Layout {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let layout = parse_layout(&raw);
            info!(
                path = %path.display(),
                zones = layout.len(),
                "Loaded base layout"
            );
            layout
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to read base layout, using empty layout"
            );
            Layout::new()
        }
    }
}

/// Parse a base layout document.
///
/// A document that is not a JSON object yields an empty layout. Individual
/// zones that fail to parse are skipped so one bad entry does not hide the rest.
pub fn parse_layout(raw: &str) -> Layout {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Base layout is not valid JSON, using empty layout");
            return Layout::new();
        }
    };

    let Value::Object(zones) = value else {
        warn!("Base layout is not a zone map, using empty layout");
        return Layout::new();
    };

    let mut layout = Layout::new();
    for (zone_id, zone_value) in zones {
        match serde_json::from_value::<Zone>(zone_value) {
            Ok(zone) => {
                layout.insert(zone_id, zone);
            }
            Err(e) => {
                warn!(zone = %zone_id, error = %e, "Skipping malformed base zone");
            }
        }
    }
    layout
}
