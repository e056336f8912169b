use serde::{Deserialize, Serialize};

/// Change notification broadcast after every mutation.
///
/// Carries no layout data; listeners re-query the effective layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayoutEvent {
    /// Overlay changed and was written to storage
    LayoutUpdated,

    /// Overlay changed in memory but the storage write failed
    PersistFailed { reason: String },
}
