//! Reference ids carried in `ManagedRef` and `ForeignRef` payloads.

use std::fmt;
use std::num::NonZeroU32;

/// Index of a host object pinned in the bridge's keep-alive arena.
///
/// Travels in the `i32` payload, so indices above `i32::MAX` are never minted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u32);

impl Slot {
    pub const MAX: u32 = i32::MAX as u32;

    /// Returns `None` if `index` does not fit the wire payload.
    pub const fn new(index: u32) -> Option<Self> {
        if index <= Self::MAX {
            Some(Self(index))
        } else {
            None
        }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn to_wire(self) -> i32 {
        self.0 as i32
    }

    /// Negative payloads never name a slot.
    #[inline]
    pub const fn from_wire(raw: i32) -> Option<Self> {
        if raw < 0 {
            None
        } else {
            Some(Self(raw as u32))
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Opaque id of an object pinned inside the native engine.
///
/// Zero on the wire is the empty handle, so the id itself is never zero.
/// The host never dereferences it; it only hands it back to the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ForeignHandle(NonZeroU32);

impl ForeignHandle {
    #[inline]
    pub const fn new(id: u32) -> Option<Self> {
        match NonZeroU32::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    #[inline]
    pub const fn to_wire(self) -> i64 {
        self.0.get() as i64
    }

    /// `None` for the empty handle and for payloads that are not a `u32`.
    pub fn from_wire(raw: i64) -> Option<Self> {
        u32::try_from(raw).ok().and_then(Self::new)
    }
}

impl fmt::Display for ForeignHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}
