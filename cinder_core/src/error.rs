//! Error types and result definitions for cinder.
//!
//! This module provides the error hierarchy covering both halves of the engine:
//! - Decode errors (truncation, unknown codes, unreachable branch targets)
//! - Emission errors (conversion exhaustion, label discipline, host rejection)
//!
//! Decode and emission errors are returned as explicit failure values carrying
//! the offending offset or types; a corrupted instruction stream or an invalid
//! emission sequence cannot be partially trusted, so callers abort the current
//! session on first failure.

use crate::types::Ty;
use thiserror::Error;

/// The unified result type used throughout cinder.
pub type CodeResult<T> = Result<T, CodeError>;

/// Comprehensive error type covering all decode and emission failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodeError {
    /// The cursor ran out of bytes in the middle of an instruction.
    #[error("truncated instruction stream at offset {offset:#06x}")]
    TruncatedStream {
        /// Offset at which the truncation was detected.
        offset: u32,
    },

    /// A byte (or extended-prefix pair) that maps to no instruction code.
    #[error("unknown instruction code {byte:#04x} at offset {offset:#06x}")]
    UnknownOpCode {
        /// The unrecognized code byte.
        byte: u8,
        /// Offset of the instruction.
        offset: u32,
    },

    /// A metadata token index past the end of the owning module's tables.
    #[error("metadata token {token:#010x} out of range at offset {offset:#06x}")]
    TokenOutOfRange {
        /// The raw token value.
        token: u32,
        /// Offset of the referencing instruction.
        offset: u32,
    },

    /// A branch or switch target that does not land on an instruction boundary.
    #[error("branch target {target:#06x} at offset {offset:#06x} is not an instruction boundary")]
    InvalidBranchTarget {
        /// The absolute byte offset the branch points at.
        target: i64,
        /// Offset of the branching instruction.
        offset: u32,
    },

    /// A variable index with no corresponding local or parameter.
    #[error("{kind} index {index} out of range at offset {offset:#06x}")]
    InvalidVariable {
        /// "local" or "parameter".
        kind: &'static str,
        /// The out-of-range index.
        index: u16,
        /// Offset of the referencing instruction.
        offset: u32,
    },

    /// No conversion rule applies between the two slot types.
    #[error("no conversion from {from} to {to}")]
    NoConversion {
        /// Source slot type.
        from: Ty,
        /// Destination slot type.
        to: Ty,
    },

    /// A declared label that was never marked, detected at finalize.
    #[error("label {label} was declared but never marked")]
    UnboundLabel {
        /// The label id.
        label: u32,
    },

    /// A label marked more than once, detected at finalize.
    #[error("label {label} was marked more than once")]
    LabelRedefined {
        /// The label id.
        label: u32,
    },

    /// A branch operand referencing a label that was never declared.
    #[error("branch references undeclared label {label}")]
    UndeclaredLabel {
        /// The label id.
        label: u32,
    },

    /// A decoded element with an unresolved symbolic operand was fed back
    /// into the synthesizer. Tolerable for display, fatal for execution.
    #[error("operand at offset {offset:#06x} is unresolved and cannot be re-emitted")]
    UnresolvedOperand {
        /// Offset of the element in its source stream.
        offset: u32,
    },

    /// The host refused to install the finalized code object.
    #[error("host rejected code object: {message}")]
    HostRejected {
        /// Host-supplied reason.
        message: String,
    },
}

impl CodeError {
    /// Create a truncation error at the given offset.
    #[must_use]
    pub fn truncated(offset: u32) -> Self {
        Self::TruncatedStream { offset }
    }

    /// Create an unknown-code error.
    #[must_use]
    pub fn unknown_code(byte: u8, offset: u32) -> Self {
        Self::UnknownOpCode { byte, offset }
    }

    /// Create an invalid-branch-target error.
    #[must_use]
    pub fn bad_target(target: i64, offset: u32) -> Self {
        Self::InvalidBranchTarget { target, offset }
    }

    /// Create a conversion-exhaustion error naming both types.
    #[must_use]
    pub fn no_conversion(from: &Ty, to: &Ty) -> Self {
        Self::NoConversion {
            from: from.clone(),
            to: to.clone(),
        }
    }

    /// Create a host-rejection error.
    #[must_use]
    pub fn host(message: impl Into<String>) -> Self {
        Self::HostRejected {
            message: message.into(),
        }
    }
}
