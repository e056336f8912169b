// Layout overlay store: user edits layered over the base layout

mod event;
mod store;

pub use event::LayoutEvent;
pub use store::{LayoutStore, EXPORT_FILENAME, OVERLAY_STORAGE_KEY};


/// Mutation errors
#[derive(Debug, PartialEq)]
pub enum LayoutError {
    EmptyZoneId,
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutError::EmptyZoneId => f.write_str("zone id must not be empty"),
        }
    }
}

impl std::error::Error for LayoutError {}
