//! Storage history diffing for the full report
//!
//! Collapses a run of storage snapshots down to the ones that actually
//! changed something, flagging the changed variables.

use crate::types::StorageSnapshot;
use tracing::warn;

/// Keep only snapshots that differ from the most recently kept one.
///
/// The first snapshot is always kept with every `changed` flag cleared.
/// Each later snapshot is compared slot by slot, by position, against the
/// last kept snapshot; it is kept when at least one value differs, with
/// `changed` set on the differing slots, and dropped otherwise. Only the
/// later snapshot's own slots are compared: a slot with no counterpart at
/// the same position counts as changed, while slots missing from the later
/// snapshot are ignored.
///
/// Kept snapshots come out in input order, so for `[S0, S1, S2, S3, S4]`
/// where only S2 and S4 change a value the result is `[S0, S2, S4]`.
pub fn diff_snapshots(snapshots: Vec<StorageSnapshot>) -> Vec<StorageSnapshot> {
    let mut kept: Vec<StorageSnapshot> = Vec::new();

    for mut snapshot in snapshots {
        if kept.is_empty() {
            for item in &mut snapshot.historic_storage {
                item.changed = false;
            }
            kept.push(snapshot);
            continue;
        }
        let current = &kept[kept.len() - 1];

        if !aligned(current, &snapshot) {
            warn!(
                kept_block = current.block_number,
                block = snapshot.block_number,
                "storage layouts differ between snapshots, comparing by position"
            );
        }

        let mut any_changed = false;
        for (index, item) in snapshot.historic_storage.iter_mut().enumerate() {
            item.changed = current
                .historic_storage
                .get(index)
                .map_or(true, |previous| previous.value != item.value);
            any_changed |= item.changed;
        }

        if any_changed {
            kept.push(snapshot);
        }
    }

    kept
}

/// Same slot names in the same order.
fn aligned(a: &StorageSnapshot, b: &StorageSnapshot) -> bool {
    a.historic_storage.len() == b.historic_storage.len()
        && a
            .historic_storage
            .iter()
            .zip(&b.historic_storage)
            .all(|(x, y)| x.name == y.name)
}
