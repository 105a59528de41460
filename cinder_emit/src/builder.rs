//! Method synthesizer: builds new code objects through a typed emission API.
//!
//! The `MethodBuilder` provides a high-level surface for constructing an
//! instruction buffer with declared locals and automatic label resolution.
//! A builder is open while operations are appended and consumed by
//! [`MethodBuilder::finalize`], which validates label discipline, lays out
//! the final bytes (branches always take the 4-byte displacement forms),
//! claims a process-unique name, and hands the unit to the host.
//!
//! One builder belongs to one producer thread; independent builders are
//! fully independent and may proceed concurrently.
//!
//! # Example
//! ```ignore
//! let mut b = MethodBuilder::new("sum", MethodSig::new(vec![Ty::I32], Ty::I32));
//! let done = b.declare_label();
//! b.emit_ldarg(0);
//! b.emit_brtrue(done);
//! b.emit_ldc_i4(0);
//! b.mark_label(done);
//! b.emit_ret();
//! let callable = b.finalize(&host)?;
//! ```

use crate::host::{CodeHost, CodeUnit, MethodSig};
use crate::registry::NameRegistry;
use cinder_bytecode::opcode::OpCode;
use cinder_bytecode::stream::{Operand, StreamElement, VarRef};
use cinder_core::error::{CodeError, CodeResult};
use cinder_core::meta::{MetaToken, Symbol};
use cinder_core::types::{FieldRef, MethodRef, Ty};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// A declared local-variable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Local(u16);

impl Local {
    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }
}

/// A forward-declarable, mark-once jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    /// Label id, for diagnostics.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

/// An operation awaiting layout.
#[derive(Debug, Clone)]
struct EmittedOp {
    code: OpCode,
    operand: RawOperand,
}

/// Operand forms the builder can lay out.
#[derive(Debug, Clone)]
enum RawOperand {
    None,
    Int8(i8),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Token(MetaToken),
    Var8(u8),
    Var16(u16),
    Label(Label),
    Switch(SmallVec<[Label; 4]>),
}

impl RawOperand {
    /// Encoded operand size in bytes.
    fn size(&self) -> u32 {
        match self {
            RawOperand::None => 0,
            RawOperand::Int8(_) | RawOperand::Var8(_) => 1,
            RawOperand::Var16(_) => 2,
            RawOperand::Int32(_)
            | RawOperand::Float32(_)
            | RawOperand::Token(_)
            | RawOperand::Label(_) => 4,
            RawOperand::Int64(_) | RawOperand::Float64(_) => 8,
            RawOperand::Switch(ls) => 4 + 4 * ls.len() as u32,
        }
    }
}

/// Builder for synthesizing code objects.
pub struct MethodBuilder {
    /// Requested name; uniquified at finalize.
    name: Arc<str>,
    /// Declared signature.
    sig: MethodSig,
    /// Operations in emission order.
    ops: Vec<EmittedOp>,
    /// Declared local types.
    locals: Vec<Ty>,
    /// Symbol table backing emitted tokens.
    symbols: Vec<Symbol>,
    /// Next label id.
    next_label: u32,
    /// Label id -> op index of the mark.
    marks: FxHashMap<Label, usize>,
    /// Label-discipline violations, surfaced at finalize.
    violations: Vec<CodeError>,
    /// Name registry for this session.
    registry: Arc<NameRegistry>,
}

impl MethodBuilder {
    /// Create a builder using the process-wide name registry.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, sig: MethodSig) -> Self {
        Self::with_registry(name, sig, NameRegistry::global())
    }

    /// Create a builder with an explicit name registry.
    #[must_use]
    pub fn with_registry(
        name: impl Into<Arc<str>>,
        sig: MethodSig,
        registry: Arc<NameRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            sig,
            ops: Vec::new(),
            locals: Vec::new(),
            symbols: Vec::new(),
            next_label: 0,
            marks: FxHashMap::default(),
            violations: Vec::new(),
            registry,
        }
    }

    /// The declared signature.
    #[inline]
    #[must_use]
    pub fn sig(&self) -> &MethodSig {
        &self.sig
    }

    /// The type of parameter `index`.
    #[must_use]
    pub fn param_ty(&self, index: u16) -> Option<&Ty> {
        self.sig.params.get(index as usize)
    }

    // =========================================================================
    // Locals and Labels
    // =========================================================================

    /// Declare a typed local and return its slot.
    pub fn declare_local(&mut self, ty: Ty) -> Local {
        let index = u16::try_from(self.locals.len()).expect("local slot overflow");
        self.locals.push(ty);
        Local(index)
    }

    /// The declared type of `local`.
    #[must_use]
    pub fn local_ty(&self, local: Local) -> &Ty {
        &self.locals[local.0 as usize]
    }

    /// Declare a label for a future jump target.
    pub fn declare_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Mark the current position as the target of `label`.
    ///
    /// Marking twice is recorded and surfaced at finalize, not here; the
    /// producer may legitimately declare before deciding whether a path is
    /// taken.
    pub fn mark_label(&mut self, label: Label) {
        if self.marks.insert(label, self.ops.len()).is_some() {
            self.violations
                .push(CodeError::LabelRedefined { label: label.0 });
        }
    }

    // =========================================================================
    // Emission Surface
    // =========================================================================

    /// Append an operation that takes no operand.
    pub fn emit(&mut self, code: OpCode) {
        debug_assert_eq!(
            code.operand_kind(),
            cinder_bytecode::opcode::OperandKind::None,
            "operand required for {}",
            code
        );
        self.push(code, RawOperand::None);
    }

    /// Append `nop`.
    pub fn emit_nop(&mut self) {
        self.emit(OpCode::Nop);
    }

    /// Append `pop`.
    pub fn emit_pop(&mut self) {
        self.emit(OpCode::Pop);
    }

    /// Append `dup`.
    pub fn emit_dup(&mut self) {
        self.emit(OpCode::Dup);
    }

    /// Append `ret`.
    pub fn emit_ret(&mut self) {
        self.emit(OpCode::Ret);
    }

    /// Append `ldnull`.
    pub fn emit_ldnull(&mut self) {
        self.emit(OpCode::LdNull);
    }

    // --- Constants ---

    /// Push a 32-bit integer constant, using the short form when it fits.
    pub fn emit_ldc_i4(&mut self, value: i32) {
        match i8::try_from(value) {
            Ok(v) => self.push(OpCode::LdcI4S, RawOperand::Int8(v)),
            Err(_) => self.push(OpCode::LdcI4, RawOperand::Int32(value)),
        }
    }

    /// Push a 64-bit integer constant.
    pub fn emit_ldc_i8(&mut self, value: i64) {
        self.push(OpCode::LdcI8, RawOperand::Int64(value));
    }

    /// Push a 32-bit float constant.
    pub fn emit_ldc_r4(&mut self, value: f32) {
        self.push(OpCode::LdcR4, RawOperand::Float32(value));
    }

    /// Push a 64-bit float constant.
    pub fn emit_ldc_r8(&mut self, value: f64) {
        self.push(OpCode::LdcR8, RawOperand::Float64(value));
    }

    /// Push a literal string.
    pub fn emit_ldstr(&mut self, value: impl Into<Arc<str>>) {
        let token = self.intern(Symbol::Str(value.into()));
        self.push(OpCode::LdStr, RawOperand::Token(token));
    }

    // --- Variables ---

    /// Push parameter `index`.
    pub fn emit_ldarg(&mut self, index: u16) {
        match index {
            0 => self.emit(OpCode::LdArg0),
            1 => self.emit(OpCode::LdArg1),
            2 => self.emit(OpCode::LdArg2),
            3 => self.emit(OpCode::LdArg3),
            _ => match u8::try_from(index) {
                Ok(i) => self.push(OpCode::LdArgS, RawOperand::Var8(i)),
                Err(_) => self.push(OpCode::LdArg, RawOperand::Var16(index)),
            },
        }
    }

    /// Push the address of parameter `index`.
    pub fn emit_ldarga(&mut self, index: u16) {
        match u8::try_from(index) {
            Ok(i) => self.push(OpCode::LdArgAS, RawOperand::Var8(i)),
            Err(_) => self.push(OpCode::LdArgA, RawOperand::Var16(index)),
        }
    }

    /// Pop into parameter `index`.
    pub fn emit_starg(&mut self, index: u16) {
        match u8::try_from(index) {
            Ok(i) => self.push(OpCode::StArgS, RawOperand::Var8(i)),
            Err(_) => self.push(OpCode::StArg, RawOperand::Var16(index)),
        }
    }

    /// Push local `local`.
    pub fn emit_ldloc(&mut self, local: Local) {
        match local.0 {
            0 => self.emit(OpCode::LdLoc0),
            1 => self.emit(OpCode::LdLoc1),
            2 => self.emit(OpCode::LdLoc2),
            3 => self.emit(OpCode::LdLoc3),
            i => match u8::try_from(i) {
                Ok(i) => self.push(OpCode::LdLocS, RawOperand::Var8(i)),
                Err(_) => self.push(OpCode::LdLoc, RawOperand::Var16(i)),
            },
        }
    }

    /// Push the address of local `local`.
    pub fn emit_ldloca(&mut self, local: Local) {
        match u8::try_from(local.0) {
            Ok(i) => self.push(OpCode::LdLocAS, RawOperand::Var8(i)),
            Err(_) => self.push(OpCode::LdLocA, RawOperand::Var16(local.0)),
        }
    }

    /// Pop into local `local`.
    pub fn emit_stloc(&mut self, local: Local) {
        match local.0 {
            0 => self.emit(OpCode::StLoc0),
            1 => self.emit(OpCode::StLoc1),
            2 => self.emit(OpCode::StLoc2),
            3 => self.emit(OpCode::StLoc3),
            i => match u8::try_from(i) {
                Ok(i) => self.push(OpCode::StLocS, RawOperand::Var8(i)),
                Err(_) => self.push(OpCode::StLoc, RawOperand::Var16(i)),
            },
        }
    }

    // --- Fields ---

    /// Push a field's value; instance fields pop their instance.
    pub fn emit_field_load(&mut self, field: &Arc<FieldRef>) {
        let code = if field.is_static {
            OpCode::LdSFld
        } else {
            OpCode::LdFld
        };
        let token = self.intern(Symbol::Field(field.clone()));
        self.push(code, RawOperand::Token(token));
    }

    /// Push a field's address; instance fields pop their instance.
    pub fn emit_field_address(&mut self, field: &Arc<FieldRef>) {
        let code = if field.is_static {
            OpCode::LdSFldA
        } else {
            OpCode::LdFldA
        };
        let token = self.intern(Symbol::Field(field.clone()));
        self.push(code, RawOperand::Token(token));
    }

    /// Pop a value (and, for instance fields, the instance below it) into a
    /// field.
    pub fn emit_field_store(&mut self, field: &Arc<FieldRef>) {
        let code = if field.is_static {
            OpCode::StSFld
        } else {
            OpCode::StFld
        };
        let token = self.intern(Symbol::Field(field.clone()));
        self.push(code, RawOperand::Token(token));
    }

    // --- Objects ---

    /// Box the stack top as a value of `ty`.
    pub fn emit_box(&mut self, ty: Ty) {
        let token = self.intern(Symbol::Type(ty));
        self.push(OpCode::Box, RawOperand::Token(token));
    }

    /// Unbox the stack top into a value of `ty`.
    pub fn emit_unbox_any(&mut self, ty: Ty) {
        let token = self.intern(Symbol::Type(ty));
        self.push(OpCode::UnboxAny, RawOperand::Token(token));
    }

    /// Checked-cast the stack top to `ty`.
    pub fn emit_castclass(&mut self, ty: Ty) {
        let token = self.intern(Symbol::Type(ty));
        self.push(OpCode::CastClass, RawOperand::Token(token));
    }

    /// Type-test the stack top against `ty`.
    pub fn emit_isinst(&mut self, ty: Ty) {
        let token = self.intern(Symbol::Type(ty));
        self.push(OpCode::IsInst, RawOperand::Token(token));
    }

    /// Load a value of `ty` through the address on the stack top.
    pub fn emit_ldobj(&mut self, ty: Ty) {
        let token = self.intern(Symbol::Type(ty));
        self.push(OpCode::LdObj, RawOperand::Token(token));
    }

    /// Store a value of `ty` through an address.
    pub fn emit_stobj(&mut self, ty: Ty) {
        let token = self.intern(Symbol::Type(ty));
        self.push(OpCode::StObj, RawOperand::Token(token));
    }

    /// Zero-initialize a value of `ty` through the address on the stack top.
    pub fn emit_initobj(&mut self, ty: Ty) {
        let token = self.intern(Symbol::Type(ty));
        self.push(OpCode::InitObj, RawOperand::Token(token));
    }

    // --- Calls ---

    /// Allocate and construct via `ctor`.
    pub fn emit_newobj(&mut self, ctor: Arc<MethodRef>) {
        let token = self.intern(Symbol::Method(ctor));
        self.push(OpCode::NewObj, RawOperand::Token(token));
    }

    /// Static-dispatch call to `method`.
    pub fn emit_call(&mut self, method: Arc<MethodRef>) {
        let token = self.intern(Symbol::Method(method));
        self.push(OpCode::Call, RawOperand::Token(token));
    }

    /// Virtual-dispatch call to `method`.
    pub fn emit_callvirt(&mut self, method: Arc<MethodRef>) {
        let token = self.intern(Symbol::Method(method));
        self.push(OpCode::CallVirt, RawOperand::Token(token));
    }

    // --- Control Flow ---

    /// Unconditional branch to `label`.
    pub fn emit_br(&mut self, label: Label) {
        self.push(OpCode::Br, RawOperand::Label(label));
    }

    /// Branch to `label` if the stack top is truthy.
    pub fn emit_brtrue(&mut self, label: Label) {
        self.push(OpCode::BrTrue, RawOperand::Label(label));
    }

    /// Branch to `label` if the stack top is falsy.
    pub fn emit_brfalse(&mut self, label: Label) {
        self.push(OpCode::BrFalse, RawOperand::Label(label));
    }

    /// Jump table over `labels`.
    pub fn emit_switch(&mut self, labels: &[Label]) {
        self.push(OpCode::Switch, RawOperand::Switch(labels.iter().copied().collect()));
    }

    // --- Replaying decoded elements ---

    /// Re-emit a decoded element.
    ///
    /// `labels` maps stream element indices to labels declared on this
    /// builder; every branch target in the replayed range must have an
    /// entry. An element whose operand never resolved is fatal here: it was
    /// tolerable for display, but cannot be executed.
    pub fn emit_decoded(
        &mut self,
        element: &StreamElement,
        labels: &FxHashMap<u32, Label>,
    ) -> CodeResult<()> {
        let code = element.code;
        match &element.operand {
            Operand::Unresolved(_) => Err(CodeError::UnresolvedOperand {
                offset: element.offset,
            }),
            Operand::None => {
                self.push(code, RawOperand::None);
                Ok(())
            }
            Operand::Int8(v) => {
                self.push(code, RawOperand::Int8(*v));
                Ok(())
            }
            Operand::Int32(v) => {
                self.push(code, RawOperand::Int32(*v));
                Ok(())
            }
            Operand::Int64(v) => {
                self.push(code, RawOperand::Int64(*v));
                Ok(())
            }
            Operand::Float32(v) => {
                self.push(code, RawOperand::Float32(*v));
                Ok(())
            }
            Operand::Float64(v) => {
                self.push(code, RawOperand::Float64(*v));
                Ok(())
            }
            Operand::Symbol(sym) => {
                let token = self.intern(sym.clone());
                self.push(code, RawOperand::Token(token));
                Ok(())
            }
            Operand::Var(var) => self.emit_decoded_var(element, var),
            Operand::Branch(t) => {
                let label = t
                    .element
                    .and_then(|idx| labels.get(&idx).copied())
                    .ok_or_else(|| CodeError::bad_target(t.target as i64, element.offset))?;
                self.push(code.widened(), RawOperand::Label(label));
                Ok(())
            }
            Operand::Switch(ts) => {
                let mut arms = SmallVec::with_capacity(ts.len());
                for t in ts {
                    arms.push(
                        t.element
                            .and_then(|idx| labels.get(&idx).copied())
                            .ok_or_else(|| CodeError::bad_target(t.target as i64, element.offset))?,
                    );
                }
                self.push(OpCode::Switch, RawOperand::Switch(arms));
                Ok(())
            }
        }
    }

    /// Re-emit a decoded variable access against this builder's own lists.
    fn emit_decoded_var(&mut self, element: &StreamElement, var: &VarRef) -> CodeResult<()> {
        use OpCode::*;
        match var {
            VarRef::Param { index, .. } => {
                if *index as usize >= self.sig.params.len() {
                    return Err(CodeError::InvalidVariable {
                        kind: "parameter",
                        index: *index,
                        offset: element.offset,
                    });
                }
                match element.code {
                    LdArg0 | LdArg1 | LdArg2 | LdArg3 | LdArgS | LdArg => self.emit_ldarg(*index),
                    LdArgAS | LdArgA => self.emit_ldarga(*index),
                    StArgS | StArg => self.emit_starg(*index),
                    _ => unreachable!("parameter operand on non-parameter code"),
                }
            }
            VarRef::Local { index, .. } => {
                if *index as usize >= self.locals.len() {
                    return Err(CodeError::InvalidVariable {
                        kind: "local",
                        index: *index,
                        offset: element.offset,
                    });
                }
                let local = Local(*index);
                match element.code {
                    LdLoc0 | LdLoc1 | LdLoc2 | LdLoc3 | LdLocS | LdLoc => self.emit_ldloc(local),
                    LdLocAS | LdLocA => self.emit_ldloca(local),
                    StLoc0 | StLoc1 | StLoc2 | StLoc3 | StLocS | StLoc => self.emit_stloc(local),
                    _ => unreachable!("local operand on non-local code"),
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Validate, lay out the byte buffer, claim a unique name, and install
    /// through the host.
    pub fn finalize<H: CodeHost>(self, host: &H) -> CodeResult<H::Callable> {
        let unit = self.into_unit()?;
        host.install(unit)
    }

    /// Validate and lay out, producing the finalized unit.
    fn into_unit(self) -> CodeResult<CodeUnit> {
        // Label discipline first: violations recorded while open, then
        // declared-but-unmarked, then branches to foreign labels.
        if let Some(violation) = self.violations.first() {
            return Err(violation.clone());
        }
        for id in 0..self.next_label {
            if !self.marks.contains_key(&Label(id)) {
                return Err(CodeError::UnboundLabel { label: id });
            }
        }
        for op in &self.ops {
            let check = |label: &Label| -> CodeResult<()> {
                if label.0 >= self.next_label {
                    return Err(CodeError::UndeclaredLabel { label: label.0 });
                }
                Ok(())
            };
            match &op.operand {
                RawOperand::Label(l) => check(l)?,
                RawOperand::Switch(ls) => ls.iter().try_for_each(check)?,
                _ => {}
            }
        }

        // Layout: assign each op its byte offset.
        let mut offsets = Vec::with_capacity(self.ops.len());
        let mut pos = 0u32;
        for op in &self.ops {
            offsets.push(pos);
            pos += op.code.code_len() + op.operand.size();
        }
        let total = pos;

        // A label marked after op N lands at N's offset; marked past the
        // last op, at the end of the buffer.
        let label_offset = |marks: &FxHashMap<Label, usize>, label: Label| -> u32 {
            let op_index = marks[&label];
            offsets.get(op_index).copied().unwrap_or(total)
        };

        // Write, patching displacements relative to the position after each
        // displacement field (switch arms share the post-table base).
        let mut bytes = Vec::with_capacity(total as usize);
        for (i, op) in self.ops.iter().enumerate() {
            op.code.encode(&mut bytes);
            match &op.operand {
                RawOperand::None => {}
                RawOperand::Int8(v) => bytes.push(*v as u8),
                RawOperand::Int32(v) => bytes.extend_from_slice(&v.to_le_bytes()),
                RawOperand::Int64(v) => bytes.extend_from_slice(&v.to_le_bytes()),
                RawOperand::Float32(v) => bytes.extend_from_slice(&v.to_le_bytes()),
                RawOperand::Float64(v) => bytes.extend_from_slice(&v.to_le_bytes()),
                RawOperand::Token(t) => bytes.extend_from_slice(&t.raw().to_le_bytes()),
                RawOperand::Var8(v) => bytes.push(*v),
                RawOperand::Var16(v) => bytes.extend_from_slice(&v.to_le_bytes()),
                RawOperand::Label(l) => {
                    let base = offsets[i] + op.code.code_len() + 4;
                    let disp = label_offset(&self.marks, *l) as i64 - base as i64;
                    bytes.extend_from_slice(&(disp as i32).to_le_bytes());
                }
                RawOperand::Switch(ls) => {
                    let base = offsets[i] + op.code.code_len() + 4 + 4 * ls.len() as u32;
                    bytes.extend_from_slice(&(ls.len() as u32).to_le_bytes());
                    for l in ls {
                        let disp = label_offset(&self.marks, *l) as i64 - base as i64;
                        bytes.extend_from_slice(&(disp as i32).to_le_bytes());
                    }
                }
            }
        }

        let name = self.registry.claim(&self.name);
        Ok(CodeUnit {
            name,
            sig: self.sig,
            locals: self.locals,
            bytes,
            symbols: self.symbols,
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Append an operation.
    fn push(&mut self, code: OpCode, operand: RawOperand) {
        self.ops.push(EmittedOp { code, operand });
    }

    /// Add a symbol to the unit's table and return its token.
    fn intern(&mut self, symbol: Symbol) -> MetaToken {
        let token = MetaToken(self.symbols.len() as u32);
        self.symbols.push(symbol);
        token
    }
}
