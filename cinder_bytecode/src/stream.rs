//! The emission stream: ordered, offset-indexed decoded operations.
//!
//! Elements are stored in strict offset order in a flat arena owned by the
//! [`EmissionStream`]. Branch and switch operands point at sibling elements
//! by arena index, never by owning pointer, so the stream stays trivially
//! relocatable. The raw byte target each branch carried on the wire is kept
//! alongside the resolved index.

use crate::opcode::OpCode;
use cinder_core::meta::{MetaToken, Symbol};
use cinder_core::types::Ty;
use smallvec::SmallVec;
use std::fmt;

/// A branch destination: the absolute byte offset from the wire, plus the
/// index of the target element once linking has run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchTarget {
    /// Absolute byte offset of the target instruction.
    pub target: u32,
    /// Index of the target element in the owning stream, set by linking.
    pub element: Option<u32>,
}

impl BranchTarget {
    /// A target that has not been linked yet.
    #[inline]
    #[must_use]
    pub const fn raw(target: u32) -> Self {
        Self {
            target,
            element: None,
        }
    }
}

/// A decoded variable reference.
#[derive(Debug, Clone, PartialEq)]
pub enum VarRef {
    /// A parameter. Index 0 is the receiver for instance functions.
    Param {
        /// Index into the effective parameter list.
        index: u16,
        /// Declared type.
        ty: Ty,
    },
    /// A local variable.
    Local {
        /// Slot index.
        index: u16,
        /// Declared type.
        ty: Ty,
    },
}

impl VarRef {
    /// The declared type of the referenced variable.
    #[must_use]
    pub fn ty(&self) -> &Ty {
        match self {
            VarRef::Param { ty, .. } | VarRef::Local { ty, .. } => ty,
        }
    }
}

/// A resolved operand. Created once during decoding, immutable after.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand.
    None,
    /// 1-byte signed immediate.
    Int8(i8),
    /// 4-byte signed immediate.
    Int32(i32),
    /// 8-byte signed immediate.
    Int64(i64),
    /// 4-byte float immediate.
    Float32(f32),
    /// 8-byte float immediate.
    Float64(f64),
    /// A branch destination.
    Branch(BranchTarget),
    /// A switch table of branch destinations.
    Switch(SmallVec<[BranchTarget; 4]>),
    /// A resolved symbolic reference.
    Symbol(Symbol),
    /// A token the host could not resolve; kept for display, fatal if the
    /// element is later required for execution.
    Unresolved(MetaToken),
    /// A resolved local or parameter reference.
    Var(VarRef),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int8(v) => write!(f, "{}", v),
            Operand::Int32(v) => write!(f, "{}", v),
            Operand::Int64(v) => write!(f, "{}", v),
            Operand::Float32(v) => write!(f, "{}", v),
            Operand::Float64(v) => write!(f, "{}", v),
            Operand::Branch(t) => write!(f, "{:#06x}", t.target),
            Operand::Switch(ts) => {
                f.write_str("(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:#06x}", t.target)?;
                }
                f.write_str(")")
            }
            Operand::Symbol(s) => write!(f, "{}", s),
            Operand::Unresolved(t) => write!(f, "<unresolved {}>", t),
            Operand::Var(VarRef::Param { index, .. }) => write!(f, "arg{}", index),
            Operand::Var(VarRef::Local { index, .. }) => write!(f, "loc{}", index),
        }
    }
}

/// One decoded operation paired with its byte offset.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamElement {
    /// Byte offset of the instruction code in the source buffer.
    pub offset: u32,
    /// The instruction code.
    pub code: OpCode,
    /// The resolved operand.
    pub operand: Operand,
}

impl StreamElement {
    /// Total encoded size of this instruction, code and operand included.
    #[must_use]
    pub fn byte_size(&self) -> u32 {
        let operand = match (&self.operand, self.code.operand_kind().fixed_size()) {
            (Operand::Switch(ts), _) => 4 + 4 * ts.len() as u32,
            (_, Some(n)) => n,
            // A non-switch operand always has a fixed size.
            (_, None) => unreachable!("switch operand mismatch"),
        };
        self.code.code_len() + operand
    }
}

impl fmt::Display for StreamElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if matches!(self.operand, Operand::None) {
            write!(f, "{:#06x}: {}", self.offset, self.code)
        } else {
            write!(f, "{:#06x}: {} {}", self.offset, self.code, self.operand)
        }
    }
}

/// The ordered, offset-indexed sequence of decoded operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmissionStream {
    elements: Vec<StreamElement>,
    byte_len: u32,
}

impl EmissionStream {
    /// Create an empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element. Elements must arrive in strict offset order.
    pub(crate) fn push(&mut self, element: StreamElement) {
        debug_assert!(
            self.elements
                .last()
                .map_or(element.offset == 0, |prev| element.offset
                    == prev.offset + prev.byte_size()),
            "elements must be appended in offset order"
        );
        self.byte_len = element.offset + element.byte_size();
        self.elements.push(element);
    }

    /// All elements in offset order.
    #[inline]
    #[must_use]
    pub fn elements(&self) -> &[StreamElement] {
        &self.elements
    }

    /// Mutable access for the linking pass.
    pub(crate) fn elements_mut(&mut self) -> &mut [StreamElement] {
        &mut self.elements
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the stream is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Total encoded byte length.
    #[inline]
    #[must_use]
    pub const fn byte_len(&self) -> u32 {
        self.byte_len
    }

    /// Find the element starting exactly at `offset`.
    #[must_use]
    pub fn index_at_offset(&self, offset: u32) -> Option<u32> {
        self.elements
            .binary_search_by_key(&offset, |e| e.offset)
            .ok()
            .map(|i| i as u32)
    }

    /// The element starting exactly at `offset`.
    #[must_use]
    pub fn element_at_offset(&self, offset: u32) -> Option<&StreamElement> {
        self.index_at_offset(offset)
            .map(|i| &self.elements[i as usize])
    }

    /// Iterate over elements in offset order.
    pub fn iter(&self) -> std::slice::Iter<'_, StreamElement> {
        self.elements.iter()
    }
}

impl<'a> IntoIterator for &'a EmissionStream {
    type Item = &'a StreamElement;
    type IntoIter = std::slice::Iter<'a, StreamElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
