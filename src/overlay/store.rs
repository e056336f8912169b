use super::{LayoutError, LayoutEvent};
use crate::layout::{
    self, merge_layout, Layout, MachineMap, MachinePlacement, MachineStatus, Overlay, Position,
    ZonePatch,
};
use crate::storage::KeyValueStorage;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Storage key holding the serialized overlay
pub const OVERLAY_STORAGE_KEY: &str = "factory_layout_overlay_v1";

/// File name used for exported effective layouts
pub const EXPORT_FILENAME: &str = "layout.export.json";

/// Owns the single in-memory overlay and merges it with the base layout.
///
/// Every mutation runs under one write lock: the overlay is changed in place,
/// serialized to storage, then a `LayoutEvent` is broadcast. A failed storage
/// write is logged and reported as `PersistFailed`; the in-memory change stays.
pub struct LayoutStore {
    /// Bundled base layout, never mutated
    base: Layout,

    /// User edits, source of truth between storage round-trips
    overlay: RwLock<Overlay>,

    storage: Arc<dyn KeyValueStorage>,
    storage_key: String,

    /// Broadcast channel for change notifications
    events_tx: broadcast::Sender<LayoutEvent>,
}

impl LayoutStore {
    /// Create a store over `base`, loading the overlay persisted under `storage_key`
    pub fn new(
        base: Layout,
        storage: Arc<dyn KeyValueStorage>,
        storage_key: impl Into<String>,
    ) -> Self {
        let storage_key = storage_key.into();
        let overlay = load_overlay(storage.as_ref(), &storage_key);
        let (events_tx, _) = broadcast::channel(100);

        info!(
            base_zones = base.len(),
            overlay_zones = overlay.len(),
            key = %storage_key,
            "Layout store initialized"
        );

        Self {
            base,
            overlay: RwLock::new(overlay),
            storage,
            storage_key,
            events_tx,
        }
    }

    /// Create a store using the default overlay key
    pub fn with_default_key(base: Layout, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::new(base, storage, OVERLAY_STORAGE_KEY)
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<LayoutEvent> {
        self.events_tx.subscribe()
    }

    pub fn base_layout(&self) -> &Layout {
        &self.base
    }

    /// Copy of the current overlay
    pub fn overlay_snapshot(&self) -> Overlay {
        self.read_overlay().clone()
    }

    /// Replace the in-memory overlay with what storage currently holds
    pub fn reload(&self) {
        let loaded = load_overlay(self.storage.as_ref(), &self.storage_key);
        *self.write_overlay() = loaded;
    }

    /// Base layout merged with the current overlay, recomputed on every call
    pub fn effective_layout(&self) -> Layout {
        merge_layout(&self.base, &self.read_overlay())
    }

    /// Create or update the overlay entry for a zone.
    ///
    /// Scalar fields present in `patch` replace the stored ones; machines in
    /// `patch` are merged into the stored machine map.
    pub fn upsert_zone(&self, zone_id: &str, patch: ZonePatch) -> Result<(), LayoutError> {
        if zone_id.trim().is_empty() {
            return Err(LayoutError::EmptyZoneId);
        }

        let mut overlay = self.write_overlay();
        let entry = overlay
            .entry(zone_id.to_string())
            .or_insert_with(new_zone_entry);

        let mut machines = entry.machines.take().unwrap_or_default();
        if let Some(incoming) = patch.machines {
            machines.extend(incoming.into_iter().map(|(id, mut placement)| {
                placement.position = placement.position.finite();
                (id, placement)
            }));
        }

        if patch.image.is_some() {
            entry.image = patch.image;
        }
        if patch.base_width.is_some() {
            entry.base_width = patch.base_width;
        }
        if patch.base_height.is_some() {
            entry.base_height = patch.base_height;
        }
        entry.machines = Some(machines);

        info!(zone = %zone_id, "Zone upserted");
        self.commit(overlay);
        Ok(())
    }

    /// Delete a zone's overlay entry with all of its overlay machines.
    ///
    /// Returns false when the zone has no overlay entry.
    pub fn remove_zone(&self, zone_id: &str) -> bool {
        let mut overlay = self.write_overlay();
        if overlay.shift_remove(zone_id).is_none() {
            debug!(zone = %zone_id, "Zone has no overlay entry, nothing to remove");
            return false;
        }

        info!(zone = %zone_id, "Zone removed");
        self.commit(overlay);
        true
    }

    /// Create or overwrite a machine placement in a zone's overlay
    pub fn add_machine(
        &self,
        zone_id: &str,
        machine_id: &str,
        position: Position,
        status: MachineStatus,
    ) {
        let mut overlay = self.write_overlay();
        insert_placement(&mut overlay, zone_id, machine_id, position, status);

        info!(
            zone = %zone_id,
            machine_id = %machine_id,
            x = position.x,
            y = position.y,
            status = %status,
            "Machine added"
        );
        self.commit(overlay);
    }

    /// Reposition a machine.
    ///
    /// An existing overlay placement keeps its status. A machine that only
    /// exists in the base layout gets an overlay shadow with status reset to
    /// inactive.
    pub fn set_machine_position(&self, zone_id: &str, machine_id: &str, position: Position) -> bool {
        let position = position.finite();
        let mut overlay = self.write_overlay();
        let machines = zone_machines(&mut overlay, zone_id);

        match machines.get_mut(machine_id) {
            Some(existing) => existing.position = position,
            None => {
                machines.insert(
                    machine_id.to_string(),
                    MachinePlacement {
                        position,
                        status: MachineStatus::Inactive,
                    },
                );
            }
        }

        debug!(
            zone = %zone_id,
            machine_id = %machine_id,
            x = position.x,
            y = position.y,
            "Machine repositioned"
        );
        self.commit(overlay);
        true
    }

    /// Remove an overlay machine placement.
    ///
    /// Base-only machines are refused (returns false, nothing changes). Empty
    /// machine maps and empty zone entries left behind are pruned.
    pub fn remove_machine(&self, zone_id: &str, machine_id: &str) -> bool {
        let mut overlay = self.write_overlay();

        let Some(entry) = overlay.get_mut(zone_id) else {
            return false;
        };
        let removed = entry
            .machines
            .as_mut()
            .and_then(|machines| machines.shift_remove(machine_id))
            .is_some();
        if !removed {
            debug!(
                zone = %zone_id,
                machine_id = %machine_id,
                "Not an overlay machine, refusing removal"
            );
            return false;
        }

        if entry.machines.as_ref().is_some_and(|m| m.is_empty()) {
            entry.machines = None;
        }
        if entry.is_empty() {
            overlay.shift_remove(zone_id);
        }

        info!(zone = %zone_id, machine_id = %machine_id, "Machine removed");
        self.commit(overlay);
        true
    }

    /// Move a machine between zones.
    ///
    /// Drops the overlay placement in `from_zone` if there is one, then places
    /// the machine in `to_zone` with status inactive. A base placement in
    /// `from_zone` is left as is.
    pub fn move_machine_to_zone(
        &self,
        machine_id: &str,
        from_zone: &str,
        to_zone: &str,
        position: Position,
    ) {
        let mut overlay = self.write_overlay();

        if let Some(machines) = overlay
            .get_mut(from_zone)
            .and_then(|entry| entry.machines.as_mut())
        {
            machines.shift_remove(machine_id);
        }
        insert_placement(
            &mut overlay,
            to_zone,
            machine_id,
            position,
            MachineStatus::Inactive,
        );

        info!(
            machine_id = %machine_id,
            from_zone = %from_zone,
            to_zone = %to_zone,
            "Machine moved"
        );
        self.commit(overlay);
    }

    /// Whether the machine has a placement in the zone's overlay
    pub fn is_overlay_machine(&self, zone_id: &str, machine_id: &str) -> bool {
        self.read_overlay()
            .get(zone_id)
            .and_then(|entry| entry.machines.as_ref())
            .is_some_and(|machines| machines.contains_key(machine_id))
    }

    /// True iff the zone is not part of the base layout
    pub fn is_removable_zone(&self, zone_id: &str) -> bool {
        !self.base.contains_key(zone_id)
    }

    /// Zone keys of the effective layout, in merge order
    pub fn list_zones(&self) -> Vec<String> {
        self.effective_layout().keys().cloned().collect()
    }

    /// De-duplicated machine ids of `layout`, or of the effective layout
    pub fn list_machine_ids(&self, layout: Option<&Layout>) -> Vec<String> {
        match layout {
            Some(layout) => layout::machine_ids(layout),
            None => layout::machine_ids(&self.effective_layout()),
        }
    }

    /// Zone holding `machine_id` in the effective layout
    pub fn find_machine_zone(&self, machine_id: &str) -> Option<String> {
        layout::find_machine_zone(&self.effective_layout(), machine_id)
    }

    /// Effective layout as pretty-printed JSON
    pub fn export_effective_layout(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.effective_layout())
            .context("Failed to serialize effective layout")
    }

    /// Write the effective layout to `<directory>/layout.export.json`
    pub fn export_effective_layout_to(&self, directory: &Path) -> Result<PathBuf> {
        let json = self.export_effective_layout()?;
        let path = directory.join(EXPORT_FILENAME);
        fs::write(&path, json)
            .with_context(|| format!("Failed to write layout export to {}", path.display()))?;

        info!(path = %path.display(), "Exported effective layout");
        Ok(path)
    }

    /// Persist the mutated overlay, release the lock, then notify listeners
    fn commit(&self, overlay: RwLockWriteGuard<'_, Overlay>) {
        let outcome = self.persist(&overlay);
        drop(overlay);

        let event = match outcome {
            Ok(()) => LayoutEvent::LayoutUpdated,
            Err(e) => {
                error!(
                    key = %self.storage_key,
                    error = %e,
                    "Failed to persist layout overlay, change kept in memory only"
                );
                LayoutEvent::PersistFailed {
                    reason: format!("{:#}", e),
                }
            }
        };

        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    /// Write the overlay; an empty overlay clears the key
    fn persist(&self, overlay: &Overlay) -> Result<()> {
        if overlay.is_empty() {
            return self.storage.remove(&self.storage_key);
        }
        let json = serde_json::to_string(overlay).context("Failed to serialize overlay")?;
        self.storage.set(&self.storage_key, &json)
    }

    fn read_overlay(&self) -> RwLockReadGuard<'_, Overlay> {
        self.overlay.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_overlay(&self) -> RwLockWriteGuard<'_, Overlay> {
        self.overlay.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Read the persisted overlay; missing or corrupt data is an empty overlay
fn load_overlay(storage: &dyn KeyValueStorage, key: &str) -> Overlay {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Overlay::new(),
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read layout overlay, starting empty");
            return Overlay::new();
        }
    };

    match serde_json::from_str::<Overlay>(&raw) {
        Ok(overlay) => overlay,
        Err(e) => {
            warn!(key = %key, error = %e, "Corrupt layout overlay, starting empty");
            Overlay::new()
        }
    }
}

fn new_zone_entry() -> ZonePatch {
    ZonePatch {
        machines: Some(MachineMap::new()),
        ..Default::default()
    }
}

/// Machine map of a zone's overlay entry, created on demand
fn zone_machines<'a>(overlay: &'a mut Overlay, zone_id: &str) -> &'a mut MachineMap {
    overlay
        .entry(zone_id.to_string())
        .or_insert_with(new_zone_entry)
        .machines
        .get_or_insert_with(MachineMap::new)
}

fn insert_placement(
    overlay: &mut Overlay,
    zone_id: &str,
    machine_id: &str,
    position: Position,
    status: MachineStatus,
) {
    zone_machines(overlay, zone_id).insert(
        machine_id.to_string(),
        MachinePlacement {
            position: position.finite(),
            status,
        },
    );
}
