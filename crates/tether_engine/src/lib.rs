//! Tether Native Engine
//!
//! The script side of the bridge: one QuickJS runtime and context per
//! [`NativeEngine`], driven entirely through [`TaggedValue`]s.
//!
//! ## Architecture
//!
//! - **Entry points:** `run`, globals, members of pinned script objects,
//!   forced collection. Every call returns an owned [`TaggedValue`]; failures
//!   come back error-shaped rather than as `Err`.
//! - **Host objects:** a `ManagedRef` entering script becomes a callable
//!   `Proxy` whose traps call [`HostCallbacks`]. When QuickJS collects the
//!   proxy, the host is told via [`HostCallbacks::remove_slot`].
//! - **Script objects:** objects leaving script are pinned in a handle table
//!   and travel as `ForeignRef` ids until the host releases them.
//!
//! [`TaggedValue`]: tether_wire::TaggedValue

mod callbacks;
mod engine;
mod error;
mod handles;
mod marshal;
mod prelude;
pub mod settings;

pub use callbacks::HostCallbacks;
pub use engine::NativeEngine;
pub use error::EngineError;
pub use settings::EngineSettings;

pub use rquickjs;
