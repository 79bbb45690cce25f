use crate::ValueType;
use thiserror::Error;

/// A value the other side produced that this side cannot read.
///
/// Both variants mean the two halves of the boundary disagree about the wire
/// format, so callers should treat them as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown value discriminant {0}")]
    UnknownDiscriminant(i32),

    #[error("corrupt {kind:?} payload: {reason}")]
    CorruptPayload { kind: ValueType, reason: &'static str },
}
