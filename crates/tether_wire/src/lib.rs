//! Wire format shared by the host bridge and the native engine.
//!
//! Every value that crosses the boundary travels as a [`TaggedValue`]: a
//! 16-byte `#[repr(C)]` record holding a discriminant, an overlapping 8-byte
//! payload and an auxiliary length. Strings and arrays point at memory owned
//! by whichever side produced the value; the receiver copies the data out and
//! hands the value back to [`dispose`].
//!
//! # Layout
//!
//! | offset | size | field |
//! | ------ | ---- | ----- |
//! | 0      | 8    | payload (`i32` / `i64` / `f64` / pointer) |
//! | 8      | 4    | discriminant ([`ValueType`]) |
//! | 12     | 4    | length (bytes for strings, elements for arrays) |
//!
//! Arrays are contiguous runs of `TaggedValue`, so the element stride is
//! [`ARRAY_STRIDE`] bytes.

pub mod date;
mod error;
mod handle;
mod value;

pub use error::ProtocolError;
pub use handle::{ForeignHandle, Slot};
pub use value::{alloc_array, alloc_string, dispose, TaggedValue, ValueType, Wire, ARRAY_STRIDE};
