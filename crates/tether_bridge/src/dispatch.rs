//! Engine callbacks: script touching host objects.
//!
//! Property reads try a registered getter first, then hand out a pinned
//! method reference for a registered method, and otherwise fail with the
//! missing member's name. Every failure travels back as an error value
//! so the engine can throw it into script.

use std::rc::Rc;

use tether_engine::HostCallbacks;
use tether_metrics::Crossing;
use tether_wire::{Slot, TaggedValue};
use tracing::{debug, trace};

use crate::bridge::BridgeInner;
use crate::error::HostError;
use crate::pinned::{MethodRef, Pinned};
use crate::reflect::{HostObject, Property, TypeInfo};
use crate::value::HostValue;

enum Reply {
    Value(HostValue),
    Method(MethodRef),
}

impl HostCallbacks for BridgeInner {
    fn remove_slot(&self, slot: Slot) {
        self.crossings.record(Crossing::RemoveSlot);
        // A proxy can die while the value naming its slot is still on the
        // way back to the host. Removal waits until that value is decoded.
        if self.in_call() {
            self.deferred.borrow_mut().push(slot);
        } else {
            self.unpin(slot);
        }
    }

    fn get_property(&self, slot: Slot, name: &str) -> TaggedValue {
        self.crossings.record(Crossing::GetProperty);
        let outcome = self.read_member(slot, name);
        self.reply(outcome)
    }

    fn set_property(&self, slot: Slot, name: &str, value: &TaggedValue) -> TaggedValue {
        self.crossings.record(Crossing::SetProperty);
        let outcome = self.write_member(slot, name, value).map(|()| Reply::Value(HostValue::Null));
        self.reply(outcome)
    }

    fn invoke(&self, slot: Slot, args: &TaggedValue) -> TaggedValue {
        self.crossings.record(Crossing::Invoke);
        let outcome = self.call_method(slot, args).map(Reply::Value);
        self.reply(outcome)
    }
}

impl BridgeInner {
    pub(crate) fn unpin(&self, slot: Slot) {
        let entry = self.arena.borrow_mut().take(slot);
        if let Some(entry) = entry {
            trace!(%slot, "unpinned");
            entry.release();
        }
    }

    /// Applies removals that arrived during the outermost call.
    pub(crate) fn drain_deferred(&self) {
        loop {
            let pending = std::mem::take(&mut *self.deferred.borrow_mut());
            if pending.is_empty() {
                break;
            }
            for slot in pending {
                self.unpin(slot);
            }
        }
    }

    fn type_info(&self, object: &HostObject) -> Rc<TypeInfo> {
        self.types.borrow_mut().resolve(object)
    }

    fn read_member(&self, slot: Slot, name: &str) -> Result<Reply, HostError> {
        match self.resolve(slot)? {
            Pinned::Object(object) => {
                let info = self.type_info(&object);
                if let Some(get) = info.property(name).and_then(Property::getter) {
                    return object.read(|this| get(this)).map(Reply::Value);
                }
                if info.has_method(name) {
                    return Ok(Reply::Method(MethodRef {
                        target: object,
                        name: name.to_owned(),
                    }));
                }
                Err(HostError::MissingMember {
                    type_name: info.name(),
                    name: name.to_owned(),
                })
            }
            Pinned::Method(method) if name == "name" => Ok(Reply::Value(method.name.into())),
            Pinned::Error(err) if name == "name" => Ok(Reply::Value(err.name().into())),
            Pinned::Error(err) if name == "message" => Ok(Reply::Value(err.to_string().into())),
            other => Err(HostError::MissingMember {
                type_name: other.type_name(),
                name: name.to_owned(),
            }),
        }
    }

    fn write_member(&self, slot: Slot, name: &str, value: &TaggedValue) -> Result<(), HostError> {
        let object = match self.resolve(slot)? {
            Pinned::Object(object) => object,
            other => {
                return Err(HostError::ReadOnly {
                    type_name: other.type_name(),
                    name: name.to_owned(),
                })
            }
        };

        let info = self.type_info(&object);
        let property = info.property(name);
        let Some(set) = property.and_then(Property::setter) else {
            let (type_name, name) = (info.name(), name.to_owned());
            return Err(match property {
                Some(_) => HostError::ReadOnly { type_name, name },
                None => HostError::MissingMember { type_name, name },
            });
        };

        let value = self.decode(value)?;
        object.write(|this| set(this, &value))
    }

    fn call_method(&self, slot: Slot, args: &TaggedValue) -> Result<HostValue, HostError> {
        let method = match self.resolve(slot)? {
            Pinned::Method(method) => method,
            _ => return Err(HostError::NotCallable(slot)),
        };
        let args = match self.decode(args)? {
            HostValue::Array(items) => items,
            single => vec![single],
        };

        let info = self.type_info(&method.target);
        let overload = info.resolve(&method.name, &args)?;
        method.target.write(|this| overload.call(this, &args))
    }

    fn reply(&self, outcome: Result<Reply, HostError>) -> TaggedValue {
        let encoded = match outcome {
            Ok(Reply::Value(value)) => self.to_foreign(&value).map_err(HostError::from),
            Ok(Reply::Method(method)) => self
                .pin(Pinned::Method(method))
                .map(TaggedValue::managed)
                .map_err(HostError::from),
            Err(err) => Err(err),
        };
        encoded.unwrap_or_else(|err| self.error_value(err))
    }

    fn error_value(&self, err: HostError) -> TaggedValue {
        debug!(%err, "host error thrown into script");
        let message = err.to_string();
        if matches!(err, HostError::InvalidSlot(_)) {
            return TaggedValue::unknown_error(Some(&message));
        }
        match self.pin(Pinned::Error(err)) {
            Ok(slot) => TaggedValue::managed_error(slot),
            Err(_) => TaggedValue::unknown_error(Some(&message)),
        }
    }
}
