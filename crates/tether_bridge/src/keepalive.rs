// keepalive.rs - slot table pinning host values referenced by script
//
// Script holds host objects by slot index. An entry stays pinned until the
// engine reports that its proxy is unreachable. Freed slots are recycled
// LIFO, or never reused when the monotonic strategy is selected.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tether_wire::Slot;

/// How freed slot indices are handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStrategy {
    /// Most recently freed index first.
    #[default]
    Reuse,
    /// Indices only ever increase. A stale slot can never alias a newer
    /// object, at the cost of retiring the index space.
    Monotonic,
}

/// Occupancy snapshot of a [`KeepAlive`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    /// Highest number of slots ever allocated at once.
    pub max_slots: usize,
    /// Slots currently backed by storage, occupied or not.
    pub allocated_slots: usize,
    /// Slots holding a value.
    pub used_slots: usize,
}

pub struct KeepAlive<T> {
    // entries[i] is slot `base + i`
    entries: VecDeque<Option<T>>,
    base: u32,
    free: Vec<u32>,
    strategy: SlotStrategy,
    used: usize,
    max_slots: usize,
}

impl<T> KeepAlive<T> {
    pub fn new(strategy: SlotStrategy) -> Self {
        Self::with_capacity(strategy, 0)
    }

    pub fn with_capacity(strategy: SlotStrategy, capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            base: 0,
            free: Vec::new(),
            strategy,
            used: 0,
            max_slots: 0,
        }
    }

    /// Pins `value` and returns its slot. `None` once the index space is
    /// exhausted.
    pub fn add(&mut self, value: T) -> Option<Slot> {
        let slot = match self.reusable() {
            Some(slot) => {
                let offset = self.offset(slot)?;
                self.entries[offset] = Some(value);
                slot
            }
            None => {
                let next = u32::try_from(self.entries.len()).ok()?.checked_add(self.base)?;
                let slot = Slot::new(next)?;
                self.entries.push_back(Some(value));
                self.max_slots = self.max_slots.max(self.entries.len());
                slot
            }
        };
        self.used += 1;
        Some(slot)
    }

    pub fn get(&self, slot: Slot) -> Option<&T> {
        self.entries.get(self.offset(slot)?)?.as_ref()
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.get(slot).is_some()
    }

    /// Unpins `slot` and hands its value back. Taking a free or unknown slot
    /// is a no-op.
    pub fn take(&mut self, slot: Slot) -> Option<T> {
        let offset = self.offset(slot)?;
        let value = self.entries.get_mut(offset)?.take()?;
        self.used -= 1;

        match self.strategy {
            SlotStrategy::Reuse => {
                self.free.push(slot.index());
                while matches!(self.entries.back(), Some(None)) {
                    self.entries.pop_back();
                }
                // Trimming strands free indices past the end.
                if self.free.len() > 2 * self.entries.len().max(8) {
                    let end = self.end();
                    self.free.retain(|&index| index < end);
                }
            }
            SlotStrategy::Monotonic => {
                while matches!(self.entries.front(), Some(None)) {
                    self.entries.pop_front();
                    self.base += 1;
                }
            }
        }
        Some(value)
    }

    /// Unpins everything, returning the values in slot order.
    pub fn drain(&mut self) -> Vec<T> {
        if self.strategy == SlotStrategy::Monotonic {
            self.base = self.end();
        }
        self.free.clear();
        self.used = 0;
        self.entries.drain(..).flatten().collect()
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            max_slots: self.max_slots,
            allocated_slots: self.entries.len(),
            used_slots: self.used,
        }
    }

    pub fn strategy(&self) -> SlotStrategy {
        self.strategy
    }

    fn end(&self) -> u32 {
        self.base.saturating_add(self.entries.len() as u32)
    }

    fn offset(&self, slot: Slot) -> Option<usize> {
        let index = slot.index().checked_sub(self.base)? as usize;
        (index < self.entries.len()).then_some(index)
    }

    // Next free index still backed by storage.
    fn reusable(&mut self) -> Option<Slot> {
        while let Some(index) = self.free.pop() {
            let slot = Slot::new(index)?;
            if self.offset(slot).is_some_and(|offset| self.entries[offset].is_none()) {
                return Some(slot);
            }
        }
        None
    }
}

impl<T> Default for KeepAlive<T> {
    fn default() -> Self {
        Self::new(SlotStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn slot(index: u32) -> Slot {
        Slot::new(index).unwrap()
    }

    #[test]
    fn freed_slots_are_reused_lifo() {
        let mut arena = KeepAlive::new(SlotStrategy::Reuse);
        let a = arena.add("a").unwrap();
        let b = arena.add("b").unwrap();
        let c = arena.add("c").unwrap();
        assert_eq!((a, b, c), (slot(0), slot(1), slot(2)));

        assert_eq!(arena.take(a), Some("a"));
        assert_eq!(arena.take(b), Some("b"));
        assert_eq!(arena.add("d"), Some(b));
        assert_eq!(arena.add("e"), Some(a));
        assert_eq!(arena.get(a), Some(&"e"));
    }

    #[test]
    fn take_is_idempotent() {
        let mut arena = KeepAlive::new(SlotStrategy::Reuse);
        let a = arena.add(1).unwrap();
        assert_eq!(arena.take(a), Some(1));
        assert_eq!(arena.take(a), None);
        assert_eq!(arena.take(slot(99)), None);
        assert_eq!(arena.stats().used_slots, 0);
    }

    #[test]
    fn trailing_free_slots_are_trimmed() {
        let mut arena = KeepAlive::new(SlotStrategy::Reuse);
        for n in 0..4 {
            arena.add(n);
        }
        arena.take(slot(1));
        arena.take(slot(3));
        arena.take(slot(2));
        assert_eq!(
            arena.stats(),
            ArenaStats { max_slots: 4, allocated_slots: 1, used_slots: 1 }
        );
        // Stranded free indices are skipped.
        assert_eq!(arena.add(9), Some(slot(1)));
        assert_eq!(arena.add(10), Some(slot(2)));
    }

    #[test]
    fn monotonic_slots_never_repeat() {
        let mut arena = KeepAlive::new(SlotStrategy::Monotonic);
        let a = arena.add('a').unwrap();
        let b = arena.add('b').unwrap();
        arena.take(a);
        let c = arena.add('c').unwrap();
        assert_eq!(c, slot(2));
        assert!(!arena.contains(a));

        arena.take(b);
        arena.take(c);
        assert_eq!(arena.stats().allocated_slots, 0);
        assert_eq!(arena.add('d'), Some(slot(3)));
    }

    #[test]
    fn drain_returns_everything_in_order() {
        let mut arena = KeepAlive::new(SlotStrategy::Monotonic);
        for n in 0..5 {
            arena.add(n);
        }
        arena.take(slot(2));
        assert_eq!(arena.drain(), vec![0, 1, 3, 4]);
        assert_eq!(arena.stats().used_slots, 0);
        assert_eq!(arena.add(7), Some(slot(5)));
    }

    // Random add/take sequences checked against a map.
    #[test]
    fn matches_a_reference_model() {
        for strategy in [SlotStrategy::Reuse, SlotStrategy::Monotonic] {
            let mut arena = KeepAlive::new(strategy);
            let mut model: HashMap<Slot, u64> = HashMap::new();
            let mut live: Vec<Slot> = Vec::new();
            let mut seen = std::collections::HashSet::new();
            let mut seed = 0x2545_f491_4f6c_dd1d_u64;

            for step in 0..5_000u64 {
                seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
                if live.is_empty() || (seed >> 33) % 3 != 0 {
                    let slot = arena.add(step).unwrap();
                    assert!(model.insert(slot, step).is_none(), "{slot} handed out twice");
                    if strategy == SlotStrategy::Monotonic {
                        assert!(seen.insert(slot), "{slot} reused");
                    }
                    live.push(slot);
                } else {
                    let victim = live.swap_remove((seed >> 40) as usize % live.len());
                    assert_eq!(arena.take(victim), model.remove(&victim));
                }

                let stats = arena.stats();
                assert_eq!(stats.used_slots, model.len());
                assert!(stats.used_slots <= stats.allocated_slots);
                assert!(stats.allocated_slots <= stats.max_slots);
            }

            for (slot, value) in &model {
                assert_eq!(arena.get(*slot), Some(value));
            }
        }
    }
}
