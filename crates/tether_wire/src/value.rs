//! The tagged value record, its typed view and the allocation entry points.

use crate::{ForeignHandle, ProtocolError, Slot};
use std::ffi::c_void;
use std::{fmt, mem, ptr, slice};

/// Distance in bytes between consecutive elements of an `Array` payload.
pub const ARRAY_STRIDE: usize = 16;

const _: () = assert!(mem::size_of::<TaggedValue>() == ARRAY_STRIDE);

/// Discriminant of a [`TaggedValue`]. The numeric codes are part of the wire format.
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null = 0,
    Boolean = 1,
    Integer = 2,
    Number = 3,
    String = 4,
    Date = 5,
    Array = 10,
    ManagedRef = 11,
    ForeignRef = 12,
    UnknownError = -1,
    ManagedError = -2,
    ForeignError = -3,
}

impl ValueType {
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Error-shaped values must be raised by the receiver, never returned as results.
    #[inline]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::UnknownError | Self::ManagedError | Self::ForeignError)
    }
}

impl TryFrom<i32> for ValueType {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Null,
            1 => Self::Boolean,
            2 => Self::Integer,
            3 => Self::Number,
            4 => Self::String,
            5 => Self::Date,
            10 => Self::Array,
            11 => Self::ManagedRef,
            12 => Self::ForeignRef,
            -1 => Self::UnknownError,
            -2 => Self::ManagedError,
            -3 => Self::ForeignError,
            other => return Err(ProtocolError::UnknownDiscriminant(other)),
        })
    }
}

#[repr(C)]
#[derive(Copy, Clone)]
union Payload {
    int: i32,
    long: i64,
    num: f64,
    ptr: *mut c_void,
}

/// One value in flight across the boundary.
///
/// Not `Clone`: a value owning string or array memory must reach [`dispose`]
/// exactly once, on the receiving side.
#[repr(C)]
#[must_use = "tagged values may own payload memory; hand them to `dispose`"]
pub struct TaggedValue {
    payload: Payload,
    tag: i32,
    length: i32,
}

impl TaggedValue {
    const fn scalar(kind: ValueType, payload: Payload) -> Self {
        Self {
            payload,
            tag: kind.code(),
            length: 0,
        }
    }

    pub const fn null() -> Self {
        Self::scalar(ValueType::Null, Payload { long: 0 })
    }

    pub const fn boolean(value: bool) -> Self {
        Self::scalar(ValueType::Boolean, Payload { int: value as i32 })
    }

    pub const fn integer(value: i32) -> Self {
        Self::scalar(ValueType::Integer, Payload { int: value })
    }

    pub const fn number(value: f64) -> Self {
        Self::scalar(ValueType::Number, Payload { num: value })
    }

    /// `millis` counts milliseconds since the Unix epoch; see [`crate::date`].
    pub const fn date(millis: f64) -> Self {
        Self::scalar(ValueType::Date, Payload { num: millis })
    }

    pub const fn managed(slot: Slot) -> Self {
        Self::scalar(ValueType::ManagedRef, Payload { int: slot.to_wire() })
    }

    pub const fn managed_error(slot: Slot) -> Self {
        Self::scalar(ValueType::ManagedError, Payload { int: slot.to_wire() })
    }

    pub const fn foreign(handle: ForeignHandle) -> Self {
        Self::scalar(ValueType::ForeignRef, Payload { long: handle.to_wire() })
    }

    pub const fn foreign_error(handle: ForeignHandle) -> Self {
        Self::scalar(ValueType::ForeignError, Payload { long: handle.to_wire() })
    }

    /// An error with no slot or handle behind it. The message is copied.
    pub fn unknown_error(message: Option<&str>) -> Self {
        match message {
            Some(text) => {
                let (ptr, length) = leak_text(text);
                Self {
                    payload: Payload { ptr },
                    tag: ValueType::UnknownError.code(),
                    length,
                }
            }
            None => Self::scalar(ValueType::UnknownError, Payload { ptr: ptr::null_mut() }),
        }
    }

    /// Builds a value from raw wire fields.
    ///
    /// # Safety
    ///
    /// If `tag` is the String, UnknownError or Array code, `bits` must be null
    /// or a pointer produced by this crate's allocators with a matching
    /// `length`, and the caller gives up ownership of that allocation.
    pub const unsafe fn from_raw_parts(tag: i32, bits: i64, length: i32) -> Self {
        Self {
            payload: Payload { long: bits },
            tag,
            length,
        }
    }

    #[inline]
    pub const fn tag(&self) -> i32 {
        self.tag
    }

    #[inline]
    pub const fn length(&self) -> i32 {
        self.length
    }

    pub fn value_type(&self) -> Result<ValueType, ProtocolError> {
        ValueType::try_from(self.tag)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.value_type(), Ok(kind) if kind.is_error())
    }

    /// Typed, borrowed view of the value.
    pub fn view(&self) -> Result<Wire<'_>, ProtocolError> {
        let kind = self.value_type()?;
        // SAFETY: each arm reads the payload field its discriminant stores.
        let wire = unsafe {
            match kind {
                ValueType::Null => Wire::Null,
                ValueType::Boolean => Wire::Boolean(self.payload.int != 0),
                ValueType::Integer => Wire::Integer(self.payload.int),
                ValueType::Number => Wire::Number(self.payload.num),
                ValueType::Date => Wire::Date(self.payload.num),
                ValueType::String => Wire::String(self.text(kind)?.unwrap_or("")),
                ValueType::UnknownError => Wire::UnknownError(self.text(kind)?),
                ValueType::Array => Wire::Array(self.elements(kind)?),
                ValueType::ManagedRef => Wire::ManagedRef(self.slot(kind)?),
                ValueType::ManagedError => Wire::ManagedError(self.slot(kind)?),
                ValueType::ForeignRef => Wire::ForeignRef(self.handle(kind)?),
                ValueType::ForeignError => Wire::ForeignError(self.handle(kind)?),
            }
        };
        Ok(wire)
    }

    /// Mutable element storage of an `Array` value, for filling it in place.
    pub fn elements_mut(&mut self) -> Option<&mut [TaggedValue]> {
        if self.tag != ValueType::Array.code() {
            return None;
        }
        let len = usize::try_from(self.length).ok()?;
        // SAFETY: array payloads are always pointers.
        let ptr = unsafe { self.payload.ptr }.cast::<TaggedValue>();
        if ptr.is_null() {
            return (len == 0).then(<&mut [TaggedValue]>::default);
        }
        // SAFETY: non-null array payloads come from `alloc_array`, which leaks
        // exactly `length` initialised elements that live until `dispose`.
        Some(unsafe { slice::from_raw_parts_mut(ptr, len) })
    }

    pub fn dispose(self) {
        dispose(self)
    }

    fn checked_len(&self, kind: ValueType) -> Result<usize, ProtocolError> {
        usize::try_from(self.length).map_err(|_| corrupt(kind, "negative length"))
    }

    fn text(&self, kind: ValueType) -> Result<Option<&str>, ProtocolError> {
        let len = self.checked_len(kind)?;
        // SAFETY: text payloads are always pointers.
        let ptr = unsafe { self.payload.ptr }.cast::<u8>().cast_const();
        if ptr.is_null() {
            return if len == 0 {
                Ok(None)
            } else {
                Err(corrupt(kind, "null pointer with nonzero length"))
            };
        }
        // SAFETY: non-null text payloads come from `leak_text`, which leaks
        // exactly `length` bytes that live until `dispose` consumes the value.
        let bytes = unsafe { slice::from_raw_parts(ptr, len) };
        std::str::from_utf8(bytes)
            .map(Some)
            .map_err(|_| corrupt(kind, "string is not UTF-8"))
    }

    fn elements(&self, kind: ValueType) -> Result<&[TaggedValue], ProtocolError> {
        let len = self.checked_len(kind)?;
        // SAFETY: array payloads are always pointers.
        let ptr = unsafe { self.payload.ptr }.cast::<TaggedValue>().cast_const();
        if ptr.is_null() {
            return if len == 0 {
                Ok(&[])
            } else {
                Err(corrupt(kind, "null pointer with nonzero length"))
            };
        }
        // SAFETY: see `elements_mut`.
        Ok(unsafe { slice::from_raw_parts(ptr, len) })
    }

    fn slot(&self, kind: ValueType) -> Result<Slot, ProtocolError> {
        // SAFETY: slot payloads are always `i32`.
        Slot::from_wire(unsafe { self.payload.int }).ok_or_else(|| corrupt(kind, "negative slot index"))
    }

    fn handle(&self, kind: ValueType) -> Result<Option<ForeignHandle>, ProtocolError> {
        // SAFETY: handle payloads are always `i64`.
        let raw = unsafe { self.payload.long };
        if raw == 0 {
            return Ok(None);
        }
        ForeignHandle::from_wire(raw)
            .map(Some)
            .ok_or_else(|| corrupt(kind, "handle id out of range"))
    }
}

impl fmt::Debug for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.view() {
            Ok(wire) => fmt::Debug::fmt(&wire, f),
            Err(err) => f
                .debug_struct("TaggedValue")
                .field("tag", &self.tag)
                .field("length", &self.length)
                .field("error", &err)
                .finish(),
        }
    }
}

/// Borrowed, decoded form of a [`TaggedValue`].
#[derive(Debug, Clone, Copy)]
pub enum Wire<'a> {
    Null,
    Boolean(bool),
    Integer(i32),
    Number(f64),
    String(&'a str),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    Array(&'a [TaggedValue]),
    ManagedRef(Slot),
    ManagedError(Slot),
    /// `None` is the empty handle.
    ForeignRef(Option<ForeignHandle>),
    ForeignError(Option<ForeignHandle>),
    UnknownError(Option<&'a str>),
}

fn corrupt(kind: ValueType, reason: &'static str) -> ProtocolError {
    ProtocolError::CorruptPayload { kind, reason }
}

/// Copies `text` into a leaked byte buffer. Text longer than `i32::MAX` bytes
/// is cut at the last char boundary that fits.
fn leak_text(text: &str) -> (*mut c_void, i32) {
    let mut end = text.len().min(i32::MAX as usize);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let bytes: Box<[u8]> = text.as_bytes()[..end].into();
    (Box::into_raw(bytes).cast::<c_void>(), end as i32)
}

/// # Safety
///
/// `ptr` must be null or come from `leak_text` with the same `length`.
unsafe fn free_text(ptr: *mut c_void, length: i32) {
    let Ok(len) = usize::try_from(length) else {
        return;
    };
    if ptr.is_null() {
        return;
    }
    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr.cast::<u8>(), len)));
}

/// Allocates a string value the other side can read. The receiver disposes it.
pub fn alloc_string(text: &str) -> TaggedValue {
    let (ptr, length) = leak_text(text);
    TaggedValue {
        payload: Payload { ptr },
        tag: ValueType::String.code(),
        length,
    }
}

/// Allocates an array of `len` Null elements to be filled through
/// [`TaggedValue::elements_mut`].
///
/// Lengths the wire cannot express come back as an `UnknownError`, so callers
/// must check the discriminant and length of the result.
pub fn alloc_array(len: usize) -> TaggedValue {
    let Ok(length) = i32::try_from(len) else {
        return TaggedValue::unknown_error(Some("array length exceeds the wire limit"));
    };
    let items: Box<[TaggedValue]> = (0..len).map(|_| TaggedValue::null()).collect();
    TaggedValue {
        payload: Payload {
            ptr: Box::into_raw(items).cast::<c_void>(),
        },
        tag: ValueType::Array.code(),
        length,
    }
}

/// Releases whatever payload memory `value` owns, recursing into arrays.
///
/// Scalars, references and unknown discriminants own nothing.
pub fn dispose(value: TaggedValue) {
    let TaggedValue { payload, tag, length } = value;
    match ValueType::try_from(tag) {
        // SAFETY: text payloads only come from `leak_text`.
        Ok(ValueType::String | ValueType::UnknownError) => unsafe { free_text(payload.ptr, length) },
        Ok(ValueType::Array) => {
            let Ok(len) = usize::try_from(length) else {
                return;
            };
            // SAFETY: array payloads are always pointers.
            let ptr = unsafe { payload.ptr }.cast::<TaggedValue>();
            if ptr.is_null() {
                return;
            }
            // SAFETY: non-null array payloads come from `alloc_array` with this length.
            let items = unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len)) };
            for item in items.into_vec() {
                dispose(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_wire_format() {
        assert_eq!(mem::size_of::<TaggedValue>(), 16);
        assert_eq!(mem::offset_of!(TaggedValue, payload), 0);
        assert_eq!(mem::offset_of!(TaggedValue, tag), 8);
        assert_eq!(mem::offset_of!(TaggedValue, length), 12);
    }

    #[test]
    fn discriminant_codes() {
        for kind in [
            ValueType::Null,
            ValueType::Boolean,
            ValueType::Integer,
            ValueType::Number,
            ValueType::String,
            ValueType::Date,
            ValueType::Array,
            ValueType::ManagedRef,
            ValueType::ForeignRef,
            ValueType::UnknownError,
            ValueType::ManagedError,
            ValueType::ForeignError,
        ] {
            assert_eq!(ValueType::try_from(kind.code()), Ok(kind));
        }
        assert_eq!(ValueType::Array.code(), 10);
        assert_eq!(ValueType::ForeignError.code(), -3);
        assert!(ValueType::ManagedError.is_error());
        assert!(!ValueType::ManagedRef.is_error());
        assert_eq!(
            ValueType::try_from(6),
            Err(ProtocolError::UnknownDiscriminant(6))
        );
    }

    #[test]
    fn scalars_view_back() {
        assert!(matches!(TaggedValue::null().view(), Ok(Wire::Null)));
        assert!(matches!(TaggedValue::boolean(true).view(), Ok(Wire::Boolean(true))));
        assert!(matches!(TaggedValue::integer(-42).view(), Ok(Wire::Integer(-42))));
        assert!(matches!(TaggedValue::number(2.5).view(), Ok(Wire::Number(n)) if n == 2.5));
        assert!(matches!(TaggedValue::date(86_400_000.0).view(), Ok(Wire::Date(ms)) if ms == 86_400_000.0));
    }

    #[test]
    fn strings_own_a_copy() {
        let value = {
            let text = String::from("héllo wörld");
            alloc_string(&text)
        };
        assert_eq!(value.length(), "héllo wörld".len() as i32);
        assert!(matches!(value.view(), Ok(Wire::String("héllo wörld"))));
        dispose(value);

        let empty = alloc_string("");
        assert!(matches!(empty.view(), Ok(Wire::String(""))));
        empty.dispose();
    }

    #[test]
    fn arrays_fill_in_place_and_dispose_recursively() {
        let mut outer = alloc_array(3);
        {
            let items = outer.elements_mut().unwrap();
            assert!(items.iter().all(|item| matches!(item.view(), Ok(Wire::Null))));
            items[0] = alloc_string("foobar");
            items[1] = TaggedValue::number(3.14159);
            let mut inner = alloc_array(1);
            inner.elements_mut().unwrap()[0] = alloc_string("nested");
            items[2] = inner;
        }

        let Ok(Wire::Array(items)) = outer.view() else {
            panic!("expected array, got {outer:?}");
        };
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0].view(), Ok(Wire::String("foobar"))));
        let Ok(Wire::Array(inner)) = items[2].view() else {
            panic!("expected nested array");
        };
        assert!(matches!(inner[0].view(), Ok(Wire::String("nested"))));
        dispose(outer);

        let empty = alloc_array(0);
        assert!(matches!(empty.view(), Ok(Wire::Array(items)) if items.is_empty()));
        dispose(empty);
    }

    #[test]
    fn references_carry_ids() {
        let slot = Slot::new(3).unwrap();
        let handle = ForeignHandle::new(8).unwrap();
        assert!(matches!(TaggedValue::managed(slot).view(), Ok(Wire::ManagedRef(s)) if s == slot));
        assert!(matches!(TaggedValue::managed_error(slot).view(), Ok(Wire::ManagedError(s)) if s == slot));
        assert!(matches!(TaggedValue::foreign(handle).view(), Ok(Wire::ForeignRef(Some(h))) if h == handle));
        assert!(TaggedValue::foreign_error(handle).is_error());

        let mut scalar = TaggedValue::integer(1);
        assert!(scalar.elements_mut().is_none());
    }

    #[test]
    fn unknown_errors_with_and_without_message() {
        let err = TaggedValue::unknown_error(Some("boom"));
        assert!(err.is_error());
        assert!(matches!(err.view(), Ok(Wire::UnknownError(Some("boom")))));
        dispose(err);

        let bare = TaggedValue::unknown_error(None);
        assert!(matches!(bare.view(), Ok(Wire::UnknownError(None))));
        dispose(bare);
    }

    #[test]
    fn skewed_values_are_protocol_errors() {
        // SAFETY: no payload memory is referenced.
        let unknown = unsafe { TaggedValue::from_raw_parts(0x77, 0, 0) };
        assert_eq!(unknown.view().unwrap_err(), ProtocolError::UnknownDiscriminant(0x77));
        dispose(unknown);

        // SAFETY: null string pointer; dispose skips it.
        let dangling = unsafe { TaggedValue::from_raw_parts(ValueType::String.code(), 0, 5) };
        assert!(matches!(
            dangling.view(),
            Err(ProtocolError::CorruptPayload { kind: ValueType::String, .. })
        ));
        dispose(dangling);

        // SAFETY: null string pointer; dispose skips it.
        let negative = unsafe { TaggedValue::from_raw_parts(ValueType::Array.code(), 0, -1) };
        assert!(negative.view().is_err());
        dispose(negative);

        // SAFETY: slot payloads own nothing.
        let bad_slot = unsafe { TaggedValue::from_raw_parts(ValueType::ManagedRef.code(), -1, 0) };
        assert!(bad_slot.view().is_err());
        dispose(bad_slot);
    }
}
