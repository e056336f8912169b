use super::{Layout, Overlay, Zone};

/// Merge the base layout with the overlay into the effective layout.
///
/// The base is cloned, never mutated. For each overlay zone, a non-empty
/// `image` and non-zero dimensions overwrite the base values, and overlay
/// machines replace base machines with the same id wholesale. Zones that only
/// exist in the overlay are appended after the base zones.
pub fn merge_layout(base: &Layout, overlay: &Overlay) -> Layout {
    let mut merged = base.clone();

    for (zone_id, patch) in overlay {
        let zone = merged.entry(zone_id.clone()).or_insert_with(Zone::default);

        if let Some(image) = patch.image.as_deref().filter(|i| !i.is_empty()) {
            zone.image = image.to_string();
        }
        if let Some(width) = patch.base_width.filter(|w| *w > 0) {
            zone.base_width = Some(width);
        }
        if let Some(height) = patch.base_height.filter(|h| *h > 0) {
            zone.base_height = Some(height);
        }

        if let Some(machines) = &patch.machines {
            for (machine_id, placement) in machines {
                zone.machines.insert(machine_id.clone(), placement.clone());
            }
        }
    }

    merged
}
