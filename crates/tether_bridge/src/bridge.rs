//! The host-facing bridge.
//!
//! A [`Bridge`] owns one native engine plus the keep-alive arena that pins
//! host objects while script refers to them. All traffic funnels through
//! two paths: `call` for operations without a value argument and `exchange`
//! for operations that ship one. Both keep a call depth so slot removals
//! reported mid-call are applied only after the reply is decoded.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tether_engine::{HostCallbacks, NativeEngine};
use tether_metrics::{Crossing, CrossingCounter};
use tether_wire::{dispose, ForeignHandle, Slot, TaggedValue};
use tracing::{debug, warn};

use crate::error::{BridgeError, InteropError};
use crate::keepalive::{ArenaStats, KeepAlive};
use crate::pinned::Pinned;
use crate::proxy::ForeignObject;
use crate::reflect::TypeCache;
use crate::settings::BridgeSettings;
use crate::value::HostValue;

/// A script engine with host interop. Single-threaded.
///
/// Dropping the bridge disposes it.
pub struct Bridge {
    inner: Rc<BridgeInner>,
}

pub(crate) struct BridgeInner {
    engine: RefCell<Option<NativeEngine>>,
    pub(crate) arena: RefCell<KeepAlive<Pinned>>,
    pub(crate) types: RefCell<TypeCache>,
    pub(crate) crossings: CrossingCounter,
    pub(crate) deferred: RefCell<Vec<Slot>>,
    depth: Cell<usize>,
    pub(crate) weak_self: Weak<BridgeInner>,
}

impl Bridge {
    pub fn new() -> Result<Self, BridgeError> {
        Self::with_settings(&BridgeSettings::default())
    }

    pub fn with_settings(settings: &BridgeSettings) -> Result<Self, BridgeError> {
        let inner = Rc::new_cyclic(|weak_self| BridgeInner {
            engine: RefCell::new(None),
            arena: RefCell::new(KeepAlive::with_capacity(
                settings.arena.strategy,
                settings.arena.initial_capacity,
            )),
            types: RefCell::new(TypeCache::default()),
            crossings: CrossingCounter::new(),
            deferred: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            weak_self: weak_self.clone(),
        });

        let callbacks: Weak<dyn HostCallbacks> = inner.weak_self.clone();
        let engine = NativeEngine::create(callbacks, &settings.engine)?;
        *inner.engine.borrow_mut() = Some(engine);

        debug!(strategy = ?settings.arena.strategy, "bridge created");
        Ok(Self { inner })
    }

    /// Runs `code` and returns its completion value.
    pub fn evaluate(&self, code: &str) -> Result<HostValue, BridgeError> {
        self.inner.call(Crossing::Evaluate, |engine| engine.run(code))
    }

    pub fn get_variable(&self, name: &str) -> Result<HostValue, BridgeError> {
        require_name(name)?;
        self.inner.call(Crossing::GetGlobal, |engine| engine.get_global(name))
    }

    /// Assigns a global. Errors raised by the assignment, such as a throwing
    /// accessor, are returned.
    pub fn set_variable(&self, name: &str, value: impl Into<HostValue>) -> Result<(), BridgeError> {
        require_name(name)?;
        self.inner
            .exchange(Crossing::SetGlobal, &value.into(), |engine, value| engine.set_global(name, value))
            .map(drop)
    }

    pub fn get_member(&self, target: &ForeignObject, name: &str) -> Result<HostValue, BridgeError> {
        self.inner.get_member(target, name)
    }

    pub fn set_member(&self, target: &ForeignObject, name: &str, value: impl Into<HostValue>) -> Result<(), BridgeError> {
        self.inner.set_member(target, name, &value.into())
    }

    /// Calls `target[name](...args)` with `target` as `this`.
    pub fn invoke_member(&self, target: &ForeignObject, name: &str, args: &[HostValue]) -> Result<HostValue, BridgeError> {
        self.inner.invoke_member(target, name, args)
    }

    /// Runs a full collection so unreachable proxies give back their slots.
    pub fn flush(&self) -> Result<(), BridgeError> {
        {
            let _scope = CallScope::enter(&self.inner);
            self.inner.with_engine(NativeEngine::force_gc)?;
        }
        debug!(stats = ?self.arena_stats(), "flushed");
        Ok(())
    }

    /// Tears down the engine and releases every pinned slot. Safe to call
    /// more than once. Refused while script is running on this bridge.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.engine.try_borrow().is_ok_and(|engine| engine.is_none())
    }

    pub fn arena_stats(&self) -> ArenaStats {
        self.inner.arena.borrow().stats()
    }

    /// Per-operation crossing counts. All zero without the `metrics` feature.
    pub fn crossings(&self) -> &CrossingCounter {
        &self.inner.crossings
    }

    /// Script objects currently held by the host.
    pub fn foreign_handles(&self) -> usize {
        self.inner.with_engine(NativeEngine::live_handles).unwrap_or(0)
    }

    /// Host types described so far.
    pub fn cached_types(&self) -> usize {
        self.inner.types.borrow().len()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl BridgeInner {
    pub(crate) fn with_engine<R>(&self, f: impl FnOnce(&NativeEngine) -> R) -> Result<R, BridgeError> {
        let engine = self.engine.try_borrow().map_err(|_| InteropError::Disposed)?;
        let engine = engine.as_ref().ok_or(InteropError::Disposed)?;
        Ok(f(engine))
    }

    pub(crate) fn in_call(&self) -> bool {
        self.depth.get() > 0
    }

    fn call(&self, crossing: Crossing, op: impl FnOnce(&NativeEngine) -> TaggedValue) -> Result<HostValue, BridgeError> {
        self.crossings.record(crossing);
        let _scope = CallScope::enter(self);
        let reply = self.with_engine(op)?;
        self.from_foreign(reply)
    }

    fn exchange(
        &self,
        crossing: Crossing,
        value: &HostValue,
        op: impl FnOnce(&NativeEngine, &TaggedValue) -> TaggedValue,
    ) -> Result<HostValue, BridgeError> {
        self.crossings.record(crossing);
        let _scope = CallScope::enter(self);
        self.with_engine(|_| ())?;

        let encoded = self.to_foreign(value)?;
        let reply = match self.with_engine(|engine| op(engine, &encoded)) {
            Ok(reply) => reply,
            Err(err) => {
                self.discard(encoded);
                return Err(err);
            }
        };
        dispose(encoded);
        self.from_foreign(reply)
    }

    pub(crate) fn get_member(&self, target: &ForeignObject, name: &str) -> Result<HostValue, BridgeError> {
        require_name(name)?;
        let handle = self.handle_of(target)?;
        self.call(Crossing::GetMember, |engine| engine.get_member(handle, name))
    }

    pub(crate) fn set_member(&self, target: &ForeignObject, name: &str, value: &HostValue) -> Result<(), BridgeError> {
        require_name(name)?;
        let handle = self.handle_of(target)?;
        self.exchange(Crossing::SetMember, value, |engine, value| engine.set_member(handle, name, value))
            .map(drop)
    }

    pub(crate) fn invoke_member(&self, target: &ForeignObject, name: &str, args: &[HostValue]) -> Result<HostValue, BridgeError> {
        require_name(name)?;
        let handle = self.handle_of(target)?;
        let args = HostValue::Array(args.to_vec());
        self.exchange(Crossing::InvokeMember, &args, |engine, args| engine.invoke_member(handle, name, args))
    }

    pub(crate) fn release_handle(&self, handle: ForeignHandle) {
        // Best effort: a disposed bridge has already dropped every handle.
        let _ = self.with_engine(|engine| engine.release_handle(handle));
    }

    fn dispose(&self) {
        let engine = match self.engine.try_borrow_mut() {
            Ok(mut engine) => engine.take(),
            Err(_) => {
                warn!("dispose refused: a call into the engine is still running");
                return;
            }
        };
        let Some(engine) = engine else {
            return;
        };
        drop(engine);

        let pinned = self.arena.borrow_mut().drain();
        self.deferred.borrow_mut().clear();
        if !pinned.is_empty() {
            warn!(slots = pinned.len(), "releasing slots still pinned at dispose");
        }
        for entry in pinned {
            entry.release();
        }
        self.types.borrow_mut().clear();

        tether_metrics::metrics! {
            debug!(crossings = self.crossings.total(), "boundary crossings");
        }
        debug!("bridge disposed");
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        // Only reached if dispose never ran; the host side is already gone,
        // so tear down the engine and leave the arena to drop normally.
        if let Some(engine) = self.engine.get_mut().take() {
            drop(engine);
            debug!("bridge dropped without dispose");
        }
    }
}

/// Marks a call in progress. Leaving the outermost scope applies deferred
/// slot removals.
struct CallScope<'a> {
    bridge: &'a BridgeInner,
}

impl<'a> CallScope<'a> {
    fn enter(bridge: &'a BridgeInner) -> Self {
        bridge.depth.set(bridge.depth.get() + 1);
        Self { bridge }
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        let depth = self.bridge.depth.get() - 1;
        self.bridge.depth.set(depth);
        if depth == 0 {
            self.bridge.drain_deferred();
        }
    }
}

fn require_name(name: &str) -> Result<(), BridgeError> {
    if name.is_empty() {
        return Err(BridgeError::InvalidArgument {
            name: "name",
            reason: "must not be empty",
        });
    }
    Ok(())
}
