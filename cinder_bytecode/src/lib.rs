//! Bytecode introspection for cinder.
//!
//! Decodes a compiled function's raw instruction stream back into a
//! structured, cross-referenced representation:
//!
//! - [`ByteCursor`] - bounds-checked forward reader over the raw buffer
//! - [`OpCode`] / [`OperandKind`] - the instruction vocabulary
//! - [`Decoder`] - two-pass decode: operands first, branch linking second
//! - [`EmissionStream`] - the ordered, offset-indexed result
//! - [`dump::disassemble`] - offset-annotated textual listing

pub mod cursor;
pub mod decoder;
pub mod dump;
pub mod opcode;
pub mod stream;

pub use cursor::ByteCursor;
pub use decoder::{Decoder, FunctionMeta};
pub use opcode::{OpCode, OperandKind, VarKind, EXT_PREFIX};
pub use stream::{BranchTarget, EmissionStream, Operand, StreamElement, VarRef};
