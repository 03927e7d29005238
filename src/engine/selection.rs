// Normalization and the weighted draw over a session's ledger

use crate::music::TrackId;
use crate::session::Ledger;

/// Scale the ledger so it sums to 1.
///
/// A ledger whose total is zero, negative or NaN is left untouched and
/// `false` is returned; nothing in it is selectable.
pub fn normalize(ledger: &mut Ledger) -> bool {
    let total = ledger.total();
    if total.is_nan() || total <= 0.0 {
        return false;
    }

    for value in ledger.values_mut() {
        *value /= total;
    }
    true
}

/// Walk the ledger in insertion order and pick the first track whose running
/// total strictly exceeds `draw`.
///
/// `draw` is expected in `[0, 1)`. If rounding leaves the running total at or
/// below `draw` for every entry, nothing is selected.
pub fn select(ledger: &Ledger, draw: f64) -> Option<&TrackId> {
    let mut accumulated = 0.0;

    for (track_id, entry) in ledger.iter() {
        accumulated += entry.value;
        if accumulated > draw {
            return Some(track_id);
        }
    }

    None
}
