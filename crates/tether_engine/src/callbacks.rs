//! Host-side callbacks the engine calls from inside script execution.

use tether_wire::{Slot, TaggedValue};
use std::rc::Weak;
use tracing::trace;

/// Implemented by the host bridge and registered at engine creation.
///
/// Arguments are borrowed: the engine disposes them after the call returns.
/// Returned values are owned by the engine, which disposes them once copied
/// into script. Failures are returned error-shaped, never panicked.
pub trait HostCallbacks {
    /// Script can no longer reach `slot`. Called at most once per minted slot.
    fn remove_slot(&self, slot: Slot);

    fn get_property(&self, slot: Slot, name: &str) -> TaggedValue;

    /// Returns `Null` on success.
    fn set_property(&self, slot: Slot, name: &str, value: &TaggedValue) -> TaggedValue;

    /// `args` is always an `Array`.
    fn invoke(&self, slot: Slot, args: &TaggedValue) -> TaggedValue;
}

/// Owned by the native token behind each host proxy. Dropping it, which
/// happens when QuickJS finalizes the token, hands the slot back.
pub(crate) struct SlotGuard {
    slot: Slot,
    callbacks: Weak<dyn HostCallbacks>,
}

impl SlotGuard {
    pub(crate) fn new(slot: Slot, callbacks: Weak<dyn HostCallbacks>) -> Self {
        Self { slot, callbacks }
    }

    pub(crate) fn slot(&self) -> Slot {
        self.slot
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        trace!(slot = %self.slot, "script released host slot");
        if let Some(callbacks) = self.callbacks.upgrade() {
            callbacks.remove_slot(self.slot);
        }
    }
}
