//! Entries of the keep-alive arena.

use crate::error::HostError;
use crate::reflect::HostObject;

/// What a slot pins on behalf of script.
#[derive(Clone)]
pub(crate) enum Pinned {
    Object(HostObject),
    /// A method looked up on a host object, waiting to be called.
    Method(MethodRef),
    /// A host failure thrown into script.
    Error(HostError),
}

#[derive(Clone)]
pub(crate) struct MethodRef {
    pub(crate) target: HostObject,
    pub(crate) name: String,
}

impl Pinned {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Pinned::Object(object) => object.type_name(),
            Pinned::Method(_) => "HostMethod",
            Pinned::Error(_) => "HostError",
        }
    }

    /// Called once the slot has been given up.
    pub(crate) fn release(self) {
        match self {
            Pinned::Object(object) => object.dispose_if_unshared(),
            Pinned::Method(method) => method.target.dispose_if_unshared(),
            Pinned::Error(_) => {}
        }
    }
}
