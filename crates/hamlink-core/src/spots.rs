//! Spot marker lifecycle tracking.
//!
//! SDR panadapter protocols key markers by callsign, not by frequency, and
//! expect the client to remove markers it no longer wants. The host feeds a
//! full set of current spots once per refresh cycle; [`SpotLifecycleTracker`]
//! turns that stream into the minimal add/remove traffic:
//!
//! - a spot whose frequency moved by more than the adapter's threshold is
//!   removed before it is re-added, so no stale-frequency marker survives;
//! - [`prune_stale`](SpotLifecycleTracker::prune_stale) removes every
//!   callsign seen in the previous cycle but not re-added in this one, then
//!   rotates the sets.
//!
//! The tracker is pure bookkeeping. Wire output goes through a [`SpotWire`]
//! implementation supplied by the adapter.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::Spot;

/// The wire-level add/remove pair a tracker drives.
pub trait SpotWire {
    /// Push (or refresh) a marker for `spot`.
    fn push(&mut self, spot: &Spot);

    /// Remove the marker for `callsign`.
    fn remove(&mut self, callsign: &str);
}

/// Active/previous-cycle callsign sets plus the last pushed frequency of each.
///
/// Owned exclusively by the adapter that pushes markers.
#[derive(Debug, Clone)]
pub struct SpotLifecycleTracker {
    move_threshold_hz: u64,
    active: BTreeSet<String>,
    previous: BTreeSet<String>,
    frequencies: BTreeMap<String, u64>,
}

impl SpotLifecycleTracker {
    /// Create a tracker. A frequency difference strictly greater than
    /// `move_threshold_hz` counts as a move.
    pub fn new(move_threshold_hz: u64) -> Self {
        SpotLifecycleTracker {
            move_threshold_hz,
            active: BTreeSet::new(),
            previous: BTreeSet::new(),
            frequencies: BTreeMap::new(),
        }
    }

    /// Frequency-move threshold in hertz.
    pub fn move_threshold_hz(&self) -> u64 {
        self.move_threshold_hz
    }

    /// Push `spot`, removing its old marker first if it moved.
    ///
    /// The marker is pushed under the normalized callsign, the same key
    /// later removals use.
    pub fn add_spot<W: SpotWire + ?Sized>(&mut self, spot: &Spot, wire: &mut W) {
        let key = normalize(&spot.callsign);
        if let Some(&last) = self.frequencies.get(&key) {
            if last.abs_diff(spot.freq_hz) > self.move_threshold_hz {
                tracing::trace!(
                    callsign = %key,
                    from_hz = last,
                    to_hz = spot.freq_hz,
                    "Spot moved, removing stale marker"
                );
                wire.remove(&key);
            }
        }
        if spot.callsign == key {
            wire.push(spot);
        } else {
            let normalized = Spot {
                callsign: key.clone(),
                ..spot.clone()
            };
            wire.push(&normalized);
        }
        self.frequencies.insert(key.clone(), spot.freq_hz);
        self.active.insert(key);
    }

    /// End the current refresh cycle.
    ///
    /// Every callsign present in the previous cycle and absent from this one
    /// is removed exactly once, in callsign order. Afterwards the current
    /// set becomes the previous set and the current set is empty.
    pub fn prune_stale<W: SpotWire + ?Sized>(&mut self, wire: &mut W) -> usize {
        let stale: Vec<String> = self.previous.difference(&self.active).cloned().collect();
        for callsign in &stale {
            wire.remove(callsign);
            self.frequencies.remove(callsign);
        }
        self.previous = std::mem::take(&mut self.active);
        stale.len()
    }

    /// Remove every tracked marker and forget all state.
    pub fn clear<W: SpotWire + ?Sized>(&mut self, wire: &mut W) {
        let all: BTreeSet<String> = self.active.union(&self.previous).cloned().collect();
        for callsign in &all {
            wire.remove(callsign);
        }
        self.reset();
    }

    /// Forget all state without emitting anything.
    pub fn reset(&mut self) {
        self.active.clear();
        self.previous.clear();
        self.frequencies.clear();
    }

    /// Whether `callsign` has been pushed in the current or previous cycle.
    pub fn is_tracked(&self, callsign: &str) -> bool {
        let key = normalize(callsign);
        self.active.contains(&key) || self.previous.contains(&key)
    }

    /// Last pushed frequency of `callsign`.
    pub fn frequency_of(&self, callsign: &str) -> Option<u64> {
        self.frequencies.get(&normalize(callsign)).copied()
    }

    /// Callsigns pushed during the current cycle.
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    /// Callsigns pushed during the previous cycle.
    pub fn previous(&self) -> impl Iterator<Item = &str> {
        self.previous.iter().map(String::as_str)
    }
}

fn normalize(callsign: &str) -> String {
    callsign.trim().to_uppercase()
}
