//! Error taxonomy for bridge operations.

use tether_engine::EngineError;
use tether_wire::{ProtocolError, Slot};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The two sides disagree about the wire format.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Interop(#[from] InteropError),

    /// Script threw.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Host code called from script failed.
    #[error("host method failed: {0}")]
    HostMethod(#[source] HostError),

    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: &'static str },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
}

/// Misuse of the boundary itself. Recoverable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InteropError {
    #[error("bridge has been disposed")]
    Disposed,

    #[error("foreign object handle is empty")]
    EmptyHandle,

    #[error("foreign object belongs to a different bridge")]
    ForeignBridge,

    #[error("keep-alive arena has no free slots")]
    ArenaExhausted,

    #[error("could not allocate a wire array of {0} elements")]
    Allocation(usize),

    #[error("{0} cannot be represented as a host value")]
    Unrepresentable(&'static str),

    /// Member lookup or argument binding failed on a host object.
    #[error(transparent)]
    Host(HostError),
}

/// An exception raised inside evaluated script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct ScriptError {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ScriptError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }
}

/// Failure while script was calling into a host object.
///
/// Errors raised by host code itself are kept as they are, so callers see
/// the original cause rather than a dispatch wrapper.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("{type_name} has no member `{name}`")]
    MissingMember { type_name: &'static str, name: String },

    #[error("property `{name}` of {type_name} is read-only")]
    ReadOnly { type_name: &'static str, name: String },

    #[error("{0} is not pinned")]
    InvalidSlot(Slot),

    #[error("{0} does not refer to a host method")]
    NotCallable(Slot),

    #[error("no overload of {type_name}.{name} takes these {arity} argument(s)")]
    NoMatchingOverload { type_name: &'static str, name: String, arity: usize },

    #[error("argument {position}: expected {expected}, found {found}")]
    ArgumentType { position: usize, expected: &'static str, found: &'static str },

    #[error("{0}")]
    Thrown(String),

    #[error("host code panicked: {0}")]
    Panicked(String),

    #[error("{type_name} is already borrowed by an outer call")]
    Reentrant { type_name: &'static str },
}

impl HostError {
    /// An error raised by host code, as opposed to by dispatch.
    pub fn thrown(message: impl Into<String>) -> Self {
        HostError::Thrown(message.into())
    }

    /// Dispatch failures are interop errors; the rest came from host code.
    pub fn is_interop(&self) -> bool {
        matches!(
            self,
            HostError::MissingMember { .. }
                | HostError::ReadOnly { .. }
                | HostError::InvalidSlot(_)
                | HostError::NotCallable(_)
                | HostError::NoMatchingOverload { .. }
                | HostError::ArgumentType { .. }
        )
    }

    /// Exposed to script as the error's `name`.
    pub fn name(&self) -> &'static str {
        match self {
            HostError::MissingMember { .. } => "MissingMemberError",
            HostError::ReadOnly { .. } => "ReadOnlyError",
            HostError::InvalidSlot(_) => "InvalidSlotError",
            HostError::NotCallable(_) => "NotCallableError",
            HostError::NoMatchingOverload { .. } => "OverloadError",
            HostError::ArgumentType { .. } => "ArgumentTypeError",
            HostError::Thrown(_) => "HostError",
            HostError::Panicked(_) => "HostPanic",
            HostError::Reentrant { .. } => "ReentrancyError",
        }
    }
}

impl From<HostError> for BridgeError {
    fn from(err: HostError) -> Self {
        if err.is_interop() {
            BridgeError::Interop(InteropError::Host(err))
        } else {
            BridgeError::HostMethod(err)
        }
    }
}

/// Lets host methods use `?` on nested bridge calls.
impl From<BridgeError> for HostError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::HostMethod(err) | BridgeError::Interop(InteropError::Host(err)) => err,
            other => HostError::Thrown(other.to_string()),
        }
    }
}
