//! Fatal error taxonomy for the backend.
//!
//! Every error here aborts translation; the backend never returns a
//! partial assembly stream. See spec §7.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("malformed IL: {opcode} expects {expected}")]
    MalformedIl {
        opcode: &'static str,
        expected: &'static str,
    },

    #[error("unsupported operand for {opcode}: {detail}")]
    UnsupportedOperand { opcode: &'static str, detail: String },

    /// Never constructed: `IlOp` is an exhaustively-matched sum type,
    /// so there is no runtime "unknown opcode" to discover. Kept to
    /// mirror spec §7's error taxonomy one-for-one.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(&'static str),

    #[error("register allocator exhausted: no scratch register qualifies for spill")]
    AllocatorExhausted,

    #[error("virtual register id out of range: {0}")]
    VregOutOfRange(u32),

    #[error("invalid integer literal: {0:?}")]
    InvalidLiteral(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
