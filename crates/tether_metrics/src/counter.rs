//! Per-crossing event counters

use crate::Crossing;
use std::cell::Cell;

/// Counts crossings by kind. Interior mutability so a shared bridge can
/// record from `&self`; not `Sync`, matching the bridge's threading model.
#[derive(Debug, Default)]
pub struct CrossingCounter {
    counts: [Cell<u64>; Crossing::ALL.len()],
}

impl CrossingCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, crossing: Crossing) {
        let cell = &self.counts[crossing.index()];
        cell.set(cell.get() + 1);
    }

    pub fn get(&self, crossing: Crossing) -> u64 {
        self.counts[crossing.index()].get()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(Cell::get).sum()
    }

    pub fn reset(&self) {
        for cell in &self.counts {
            cell.set(0);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Crossing, u64)> + '_ {
        Crossing::ALL.iter().map(|&crossing| (crossing, self.get(crossing)))
    }
}
