//! Tether Bridge
//!
//! Host interop for the Tether script engine. A [`Bridge`] evaluates
//! script, reads and writes globals, and exposes Rust objects to script
//! while script objects come back to Rust as [`ForeignObject`]s.
//!
//! ## Architecture
//!
//! - **Values:** [`HostValue`] is the host's view of anything crossing the
//!   boundary. Scalars, strings, dates and arrays are copied; objects are
//!   passed by reference.
//! - **Host objects:** types implementing [`HostType`] describe their
//!   properties and methods once. While script holds one, the object is
//!   pinned in a keep-alive arena slot; the engine reports when the slot
//!   can go.
//! - **Script objects:** a [`ForeignObject`] keeps its script object alive
//!   until the last clone drops.
//! - **Errors:** script exceptions surface as [`ScriptError`], host failures
//!   raised inside script come back unwrapped as [`HostError`]s, and misuse
//!   of the boundary is an [`InteropError`].
//!
//! ## Example
//!
//! ```ignore
//! use tether_bridge::{Bridge, HostType, HostValue, Param, TypeBuilder};
//!
//! struct Greeter { name: String }
//!
//! impl HostType for Greeter {
//!     fn describe(t: &mut TypeBuilder<Self>) {
//!         t.property("name", |this| this.name.clone())
//!          .method("greet", &[Param::String], |this, args| {
//!              Ok(format!("{} greets {}", this.name, args.string(0)?).into())
//!          });
//!     }
//! }
//!
//! let bridge = Bridge::new()?;
//! bridge.set_variable("greeter", HostValue::object(Greeter { name: "tether".into() }))?;
//! let text = bridge.evaluate("greeter.greet('you')")?;
//! ```
//!
//! # Feature Flags
//!
//! - `metrics` - Count crossings per operation, see [`Bridge::crossings`]

mod bridge;
mod convert;
mod dispatch;
mod error;
mod keepalive;
mod pinned;
mod proxy;
mod reflect;
pub mod settings;
mod value;

pub use bridge::Bridge;
pub use error::{BridgeError, HostError, InteropError, ScriptError};
pub use keepalive::{ArenaStats, KeepAlive, SlotStrategy};
pub use proxy::{ForeignObject, MemberAccess};
pub use reflect::{Args, HostObject, HostType, Param, TypeBuilder};
pub use settings::{ArenaSettings, BridgeSettings};
pub use value::HostValue;

pub use tether_metrics::{Crossing, CrossingCounter};
pub use tether_wire::{ForeignHandle, Slot};
