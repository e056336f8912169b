//! Floor layout data model.
//!
//! A `Layout` maps zone keys to zones; an `Overlay` maps zone keys to partial
//! zone records that are layered over the bundled base layout.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub mod base;
mod merge;

pub use merge::merge_layout;


/// Pixel space used when a zone does not declare its own dimensions
pub const DEFAULT_BASE_WIDTH: u32 = 800;
pub const DEFAULT_BASE_HEIGHT: u32 = 600;

/// Zone key -> zone, in merge order
pub type Layout = IndexMap<String, Zone>;

/// Zone key -> user-edited partial zone
pub type Overlay = IndexMap<String, ZonePatch>;

/// Machine id -> placement
pub type MachineMap = IndexMap<String, MachinePlacement>;

/// Point in a zone's base pixel space
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Same point with non-finite axes moved to 0.
    ///
    /// JSON has no NaN or infinity, so only finite positions survive storage.
    pub fn finite(self) -> Self {
        Self::new(finite_or_zero(self.x), finite_or_zero(self.y))
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Fallback machine state, used only when live telemetry is unavailable
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Active,
    #[default]
    Inactive,
}

impl std::fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineStatus::Active => f.write_str("active"),
            MachineStatus::Inactive => f.write_str("inactive"),
        }
    }
}

/// A machine marker inside one zone
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachinePlacement {
    pub position: Position,
    #[serde(default)]
    pub status: MachineStatus,
}

impl MachinePlacement {
    pub fn new(x: f64, y: f64, status: MachineStatus) -> Self {
        Self {
            position: Position::new(x, y),
            status,
        }
    }
}

/// A named area of the factory floor with its own background and coordinate space
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Bundled asset name, data URI or URL
    #[serde(default)]
    pub image: String,

    #[serde(rename = "baseWidth", default, skip_serializing_if = "Option::is_none")]
    pub base_width: Option<u32>,

    #[serde(rename = "baseHeight", default, skip_serializing_if = "Option::is_none")]
    pub base_height: Option<u32>,

    #[serde(default)]
    pub machines: MachineMap,
}

impl Zone {
    /// Width and height of the zone's pixel space, falling back to 800x600
    pub fn dimensions(&self) -> (u32, u32) {
        (
            self.base_width
                .filter(|w| *w > 0)
                .unwrap_or(DEFAULT_BASE_WIDTH),
            self.base_height
                .filter(|h| *h > 0)
                .unwrap_or(DEFAULT_BASE_HEIGHT),
        )
    }

    /// Bound a coordinate into `[0, width] x [0, height]`.
    ///
    /// Non-finite input lands on the origin.
    pub fn clamp_position(&self, x: f64, y: f64) -> Position {
        let (width, height) = self.dimensions();
        Position::new(clamp_axis(x, width), clamp_axis(y, height))
    }
}

fn clamp_axis(value: f64, max: u32) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, f64::from(max))
}

/// Partial zone record stored in the overlay.
///
/// Every field is optional; absent fields fall through to the base layout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZonePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(rename = "baseWidth", default, skip_serializing_if = "Option::is_none")]
    pub base_width: Option<u32>,

    #[serde(rename = "baseHeight", default, skip_serializing_if = "Option::is_none")]
    pub base_height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machines: Option<MachineMap>,
}

impl ZonePatch {
    /// Patch describing a brand new zone backed by an uploaded image
    pub fn with_image(image: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            image: Some(image.into()),
            base_width: Some(width),
            base_height: Some(height),
            machines: Some(MachineMap::new()),
        }
    }

    /// True when the patch carries no field at all
    pub fn is_empty(&self) -> bool {
        self.image.is_none()
            && self.base_width.is_none()
            && self.base_height.is_none()
            && self.machines.is_none()
    }
}

/// All machine ids across all zones, de-duplicated, first occurrence first
pub fn machine_ids(layout: &Layout) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for zone in layout.values() {
        for id in zone.machines.keys() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
    }
    ids
}

/// First zone (in layout order) that holds a machine with this id
pub fn find_machine_zone(layout: &Layout, machine_id: &str) -> Option<String> {
    layout
        .iter()
        .find(|(_, zone)| zone.machines.contains_key(machine_id))
        .map(|(zone_id, _)| zone_id.clone())
}
