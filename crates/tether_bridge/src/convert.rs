//! Conversion between [`HostValue`] and the wire format.
//!
//! Host objects are pinned in the keep-alive arena on the way out and looked
//! up by slot on the way back. Script objects come back as
//! [`ForeignObject`]s that release their handle when dropped.

use tether_wire::{alloc_array, alloc_string, date, dispose, ForeignHandle, Slot, TaggedValue, Wire};
use tracing::trace;

use crate::bridge::BridgeInner;
use crate::error::{BridgeError, HostError, InteropError, ScriptError};
use crate::pinned::Pinned;
use crate::proxy::ForeignObject;
use crate::value::HostValue;

impl BridgeInner {
    /// Encodes `value` for the engine. The caller owns the result and must
    /// dispose it once the engine has copied it.
    pub(crate) fn to_foreign(&self, value: &HostValue) -> Result<TaggedValue, BridgeError> {
        Ok(match value {
            HostValue::Null => TaggedValue::null(),
            HostValue::Bool(value) => TaggedValue::boolean(*value),
            HostValue::Int(value) => TaggedValue::integer(*value),
            HostValue::Number(value) => TaggedValue::number(*value),
            HostValue::String(text) => alloc_string(text),
            HostValue::Date(at) => TaggedValue::date(date::to_wire(at)),
            HostValue::Array(items) => self.array_to_foreign(items)?,
            HostValue::Object(object) => TaggedValue::managed(self.pin(Pinned::Object(object.clone()))?),
            HostValue::Foreign(object) => TaggedValue::foreign(self.handle_of(object)?),
        })
    }

    fn array_to_foreign(&self, items: &[HostValue]) -> Result<TaggedValue, BridgeError> {
        let mut array = alloc_array(items.len());
        if array.elements_mut().map(|elements| elements.len()) != Some(items.len()) {
            dispose(array);
            return Err(InteropError::Allocation(items.len()).into());
        }

        for (index, item) in items.iter().enumerate() {
            let element = match self.to_foreign(item) {
                Ok(element) => element,
                Err(err) => {
                    self.discard(array);
                    return Err(err);
                }
            };
            match array.elements_mut() {
                Some(elements) => elements[index] = element,
                None => self.discard(element),
            }
        }
        Ok(array)
    }

    /// Disposes an encoded value that never reached the engine, unpinning
    /// the slots minted for it.
    pub(crate) fn discard(&self, value: TaggedValue) {
        self.unpin_minted(&value);
        dispose(value);
    }

    fn unpin_minted(&self, value: &TaggedValue) {
        match value.view() {
            Ok(Wire::ManagedRef(slot)) => {
                let minted = self.arena.borrow_mut().take(slot);
                drop(minted);
            }
            Ok(Wire::Array(items)) => items.iter().for_each(|item| self.unpin_minted(item)),
            _ => {}
        }
    }

    pub(crate) fn pin(&self, entry: Pinned) -> Result<Slot, BridgeError> {
        let slot = self.arena.borrow_mut().add(entry).ok_or(InteropError::ArenaExhausted)?;
        trace!(%slot, "pinned");
        Ok(slot)
    }

    pub(crate) fn resolve(&self, slot: Slot) -> Result<Pinned, HostError> {
        self.arena.borrow().get(slot).cloned().ok_or(HostError::InvalidSlot(slot))
    }

    pub(crate) fn handle_of(&self, object: &ForeignObject) -> Result<ForeignHandle, BridgeError> {
        if object.belongs_to(&self.weak_self) {
            Ok(object.handle())
        } else {
            Err(InteropError::ForeignBridge.into())
        }
    }

    /// Decodes a value returned by the engine and disposes it. Error-shaped
    /// values come back as `Err`.
    pub(crate) fn from_foreign(&self, value: TaggedValue) -> Result<HostValue, BridgeError> {
        let decoded = self.decode(&value);
        dispose(value);
        decoded
    }

    /// Decodes without taking ownership.
    pub(crate) fn decode(&self, value: &TaggedValue) -> Result<HostValue, BridgeError> {
        match value.view()? {
            Wire::Null => Ok(HostValue::Null),
            Wire::Boolean(value) => Ok(HostValue::Bool(value)),
            Wire::Integer(value) => Ok(HostValue::Int(value)),
            Wire::Number(value) => Ok(HostValue::Number(value)),
            Wire::String(text) => Ok(HostValue::String(text.to_owned())),
            // An Invalid Date is an ordinary script value with no instant.
            Wire::Date(millis) if millis.is_nan() => Ok(HostValue::Null),
            Wire::Date(millis) => date::from_wire(millis)
                .map(HostValue::Date)
                .ok_or_else(|| InteropError::Unrepresentable("a date outside the host calendar").into()),
            Wire::Array(items) => {
                // Decode every element before failing so foreign handles in
                // the tail are still released.
                let decoded: Vec<_> = items.iter().map(|item| self.decode(item)).collect();
                decoded.into_iter().collect::<Result<Vec<_>, _>>().map(HostValue::Array)
            }
            Wire::ManagedRef(slot) => match self.resolve(slot)? {
                Pinned::Object(object) => Ok(HostValue::Object(object)),
                Pinned::Method(_) => Err(InteropError::Unrepresentable("a host method reference").into()),
                Pinned::Error(err) => Err(err.into()),
            },
            Wire::ManagedError(slot) => Err(match self.resolve(slot)? {
                Pinned::Error(err) => err.into(),
                other => ScriptError::new("Error", format!("script threw a host {}", other.type_name())).into(),
            }),
            Wire::ForeignRef(Some(handle)) => Ok(HostValue::Foreign(ForeignObject::new(handle, self.weak_self.clone()))),
            Wire::ForeignRef(None) | Wire::ForeignError(None) => Err(InteropError::EmptyHandle.into()),
            Wire::ForeignError(Some(handle)) => {
                let thrown = ForeignObject::new(handle, self.weak_self.clone());
                Err(self.script_error(&thrown).into())
            }
            Wire::UnknownError(message) => {
                Err(ScriptError::new("Error", message.unwrap_or("script raised an unknown error")).into())
            }
        }
    }

    fn script_error(&self, thrown: &ForeignObject) -> ScriptError {
        let text = |name| self.member_text(thrown.handle(), name).filter(|text| !text.is_empty());
        let name = text("name").unwrap_or_else(|| String::from("Error"));
        let message = text("message").unwrap_or_else(|| String::from("script threw an object without a message"));
        ScriptError {
            name,
            message,
            stack: text("stack"),
        }
    }

    // Reads a string member, dropping anything else the getter returned.
    fn member_text(&self, handle: ForeignHandle, name: &str) -> Option<String> {
        let reply = self.with_engine(|engine| engine.get_member(handle, name)).ok()?;
        let text = match reply.view() {
            Ok(Wire::String(text)) => Some(text.to_owned()),
            _ => None,
        };
        self.release_handles(&reply);
        dispose(reply);
        text
    }

    fn release_handles(&self, value: &TaggedValue) {
        match value.view() {
            Ok(Wire::ForeignRef(Some(handle)) | Wire::ForeignError(Some(handle))) => self.release_handle(handle),
            Ok(Wire::Array(items)) => items.iter().for_each(|item| self.release_handles(item)),
            _ => {}
        }
    }
}
