//! Host-side references to script objects.

use std::fmt;
use std::rc::{Rc, Weak};

use tether_wire::ForeignHandle;

use crate::bridge::BridgeInner;
use crate::error::{BridgeError, InteropError};
use crate::value::HostValue;

/// Late-bound member access on an object owned by the other side.
pub trait MemberAccess {
    fn get(&self, name: &str) -> Result<HostValue, BridgeError>;

    fn set(&self, name: &str, value: HostValue) -> Result<(), BridgeError>;

    fn invoke(&self, name: &str, args: &[HostValue]) -> Result<HostValue, BridgeError>;
}

/// A script object pinned for the host.
///
/// Clones share one engine handle, released when the last clone drops.
/// Equality is by handle: the same script object returned twice yields two
/// distinct handles.
#[derive(Clone)]
pub struct ForeignObject {
    lease: Rc<HandleLease>,
}

struct HandleLease {
    handle: ForeignHandle,
    bridge: Weak<BridgeInner>,
}

impl Drop for HandleLease {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.upgrade() {
            bridge.release_handle(self.handle);
        }
    }
}

impl ForeignObject {
    pub(crate) fn new(handle: ForeignHandle, bridge: Weak<BridgeInner>) -> Self {
        Self {
            lease: Rc::new(HandleLease { handle, bridge }),
        }
    }

    pub fn handle(&self) -> ForeignHandle {
        self.lease.handle
    }

    pub(crate) fn belongs_to(&self, bridge: &Weak<BridgeInner>) -> bool {
        Weak::ptr_eq(&self.lease.bridge, bridge)
    }

    fn bridge(&self) -> Result<Rc<BridgeInner>, BridgeError> {
        self.lease.bridge.upgrade().ok_or(BridgeError::Interop(InteropError::Disposed))
    }
}

impl MemberAccess for ForeignObject {
    fn get(&self, name: &str) -> Result<HostValue, BridgeError> {
        self.bridge()?.get_member(self, name)
    }

    fn set(&self, name: &str, value: HostValue) -> Result<(), BridgeError> {
        self.bridge()?.set_member(self, name, &value)
    }

    fn invoke(&self, name: &str, args: &[HostValue]) -> Result<HostValue, BridgeError> {
        self.bridge()?.invoke_member(self, name, args)
    }
}

impl PartialEq for ForeignObject {
    fn eq(&self, other: &Self) -> bool {
        self.handle() == other.handle() && other.belongs_to(&self.lease.bridge)
    }
}

impl fmt::Debug for ForeignObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignObject({})", self.handle())
    }
}
