//! Two-pass instruction decoder.
//!
//! Pass one walks the byte buffer, decoding one variable-length instruction
//! at a time: code (with extended-prefix handling), then operand according to
//! the code's [`OperandKind`](crate::opcode::OperandKind). Branch
//! displacements are relative to the cursor position *after* the
//! displacement; switch displacements share a single base, the position
//! after the whole table. Pass two rewrites branch and switch operands from
//! absolute byte offsets into arena indices of the target elements.
//!
//! Symbolic references that the host reports as unresolvable are kept as
//! diagnostic placeholders so partial disassembly stays useful; an
//! out-of-range token aborts the decode, since it means the stream and the
//! metadata disagree.

use crate::cursor::ByteCursor;
use crate::opcode::{OpCode, OperandKind, VarKind, EXT_PREFIX};
use crate::stream::{BranchTarget, EmissionStream, Operand, StreamElement, VarRef};
use cinder_core::error::{CodeError, CodeResult};
use cinder_core::meta::{GenericContext, MetaToken, MetadataResolver, ResolveError};
use cinder_core::types::{LocalDesc, ParamDesc, Ty};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// Everything the host knows about the function being decoded.
#[derive(Debug, Clone)]
pub struct FunctionMeta {
    /// Function name, for display.
    pub name: Arc<str>,
    /// Receiver type for instance functions; `None` for static functions.
    /// When present, the receiver occupies parameter index 0 and the declared
    /// parameters shift up by one.
    pub receiver: Option<Ty>,
    /// Declared parameters, in order, excluding any receiver.
    pub params: Vec<ParamDesc>,
    /// Declared locals, in slot order.
    pub locals: Vec<LocalDesc>,
    /// Generic arguments in scope.
    pub generics: GenericContext,
}

impl FunctionMeta {
    /// Metadata for a static function with no generics.
    #[must_use]
    pub fn statik(name: impl Into<Arc<str>>, params: Vec<ParamDesc>, locals: Vec<LocalDesc>) -> Self {
        Self {
            name: name.into(),
            receiver: None,
            params,
            locals,
            generics: GenericContext::empty(),
        }
    }

    /// The type at `index` in the effective parameter list, with the
    /// receiver synthesized at index 0 for instance functions.
    #[must_use]
    pub fn param_ty(&self, index: u16) -> Option<&Ty> {
        match &self.receiver {
            Some(recv) => {
                if index == 0 {
                    Some(recv)
                } else {
                    self.params.get(index as usize - 1).map(|p| &p.ty)
                }
            }
            None => self.params.get(index as usize).map(|p| &p.ty),
        }
    }

    /// The type of local slot `index`.
    #[must_use]
    pub fn local_ty(&self, index: u16) -> Option<&Ty> {
        self.locals.get(index as usize).map(|l| &l.ty)
    }
}

/// Decodes raw instruction bytes into an [`EmissionStream`].
pub struct Decoder<'a, R: MetadataResolver + ?Sized> {
    meta: &'a FunctionMeta,
    resolver: &'a R,
}

impl<'a, R: MetadataResolver + ?Sized> Decoder<'a, R> {
    /// Create a decoder for one function.
    #[must_use]
    pub fn new(meta: &'a FunctionMeta, resolver: &'a R) -> Self {
        Self { meta, resolver }
    }

    /// Decode `bytes` into a fully linked stream.
    pub fn decode(&self, bytes: &[u8]) -> CodeResult<EmissionStream> {
        let mut stream = self.decode_unlinked(bytes)?;
        link_branches(&mut stream)?;
        Ok(stream)
    }

    /// Pass one: decode every instruction, leaving branch operands as raw
    /// absolute offsets.
    fn decode_unlinked(&self, bytes: &[u8]) -> CodeResult<EmissionStream> {
        let mut cursor = ByteCursor::new(bytes);
        let mut stream = EmissionStream::new();

        while !cursor.is_at_end() {
            let offset = cursor.position() as u32;
            let code = read_code(&mut cursor, offset)?;
            let operand = self.read_operand(&mut cursor, code, offset)?;
            stream.push(StreamElement {
                offset,
                code,
                operand,
            });
        }

        Ok(stream)
    }

    /// Decode the operand for `code`, the cursor sitting just past the code.
    fn read_operand(
        &self,
        cursor: &mut ByteCursor<'_>,
        code: OpCode,
        offset: u32,
    ) -> CodeResult<Operand> {
        let truncated = |c: &ByteCursor<'_>| CodeError::truncated(c.position() as u32);

        let operand = match code.operand_kind() {
            OperandKind::None => match code.implied_variable() {
                Some((kind, index)) => Operand::Var(self.resolve_var(kind, index, offset)?),
                None => Operand::None,
            },
            OperandKind::Int8 => Operand::Int8(cursor.read_i8().ok_or_else(|| truncated(cursor))?),
            OperandKind::Int32 => {
                Operand::Int32(cursor.read_i32().ok_or_else(|| truncated(cursor))?)
            }
            OperandKind::Int64 => {
                Operand::Int64(cursor.read_i64().ok_or_else(|| truncated(cursor))?)
            }
            OperandKind::Float32 => {
                Operand::Float32(cursor.read_f32().ok_or_else(|| truncated(cursor))?)
            }
            OperandKind::Float64 => {
                Operand::Float64(cursor.read_f64().ok_or_else(|| truncated(cursor))?)
            }
            OperandKind::BranchTarget8 => {
                let disp = cursor.read_i8().ok_or_else(|| truncated(cursor))? as i64;
                Operand::Branch(branch_from(cursor.position(), disp, offset)?)
            }
            OperandKind::BranchTarget32 => {
                let disp = cursor.read_i32().ok_or_else(|| truncated(cursor))? as i64;
                Operand::Branch(branch_from(cursor.position(), disp, offset)?)
            }
            OperandKind::Switch => {
                let count = cursor.read_u32().ok_or_else(|| truncated(cursor))?;
                // A table longer than the remaining buffer is truncation;
                // reject before reserving anything.
                if count as usize > cursor.remaining() / 4 {
                    return Err(truncated(cursor));
                }
                let mut disps: SmallVec<[i64; 4]> = SmallVec::with_capacity(count as usize);
                for _ in 0..count {
                    disps.push(cursor.read_i32().ok_or_else(|| truncated(cursor))? as i64);
                }
                // One shared base: the position after the whole table.
                let base = cursor.position();
                let mut targets = SmallVec::with_capacity(count as usize);
                for disp in disps {
                    targets.push(branch_from(base, disp, offset)?);
                }
                Operand::Switch(targets)
            }
            OperandKind::Token => {
                let token = MetaToken(cursor.read_u32().ok_or_else(|| truncated(cursor))?);
                match self.resolver.resolve(token, &self.meta.generics) {
                    Ok(symbol) => Operand::Symbol(symbol),
                    Err(ResolveError::Unresolved(t)) => Operand::Unresolved(t),
                    Err(ResolveError::OutOfRange(t)) => {
                        return Err(CodeError::TokenOutOfRange {
                            token: t.raw(),
                            offset,
                        });
                    }
                }
            }
            OperandKind::VarIndex8 => {
                let index = cursor.read_u8().ok_or_else(|| truncated(cursor))? as u16;
                Operand::Var(self.resolve_var(expect_var_kind(code), index, offset)?)
            }
            OperandKind::VarIndex16 => {
                let index = cursor.read_u16().ok_or_else(|| truncated(cursor))?;
                Operand::Var(self.resolve_var(expect_var_kind(code), index, offset)?)
            }
        };

        Ok(operand)
    }

    /// Resolve a variable index against the supplied lists.
    fn resolve_var(&self, kind: VarKind, index: u16, offset: u32) -> CodeResult<VarRef> {
        let ty = match kind {
            VarKind::Param => self.meta.param_ty(index),
            VarKind::Local => self.meta.local_ty(index),
        };
        let ty = ty.cloned().ok_or(CodeError::InvalidVariable {
            kind: kind.as_str(),
            index,
            offset,
        })?;
        Ok(match kind {
            VarKind::Param => VarRef::Param { index, ty },
            VarKind::Local => VarRef::Local { index, ty },
        })
    }
}

/// The variable list a var-index code addresses. Codes with a var-index
/// operand kind always classify; the tables are defined together.
fn expect_var_kind(code: OpCode) -> VarKind {
    code.variable_kind()
        .expect("var-index operand kind without a variable kind")
}

/// Read one instruction code, handling the extended prefix.
fn read_code(cursor: &mut ByteCursor<'_>, offset: u32) -> CodeResult<OpCode> {
    let byte = cursor
        .read_u8()
        .ok_or_else(|| CodeError::truncated(cursor.position() as u32))?;
    if byte == EXT_PREFIX {
        let second = cursor
            .read_u8()
            .ok_or_else(|| CodeError::truncated(cursor.position() as u32))?;
        OpCode::ext_from_u8(second).ok_or(CodeError::UnknownOpCode {
            byte: second,
            offset,
        })
    } else {
        OpCode::from_u8(byte).ok_or(CodeError::UnknownOpCode { byte, offset })
    }
}

/// Turn a displacement into an absolute branch target.
fn branch_from(base: usize, disp: i64, offset: u32) -> CodeResult<BranchTarget> {
    let target = base as i64 + disp;
    u32::try_from(target)
        .map(BranchTarget::raw)
        .map_err(|_| CodeError::bad_target(target, offset))
}

/// Pass two: rewrite raw branch targets into arena indices.
///
/// A target that is not an element boundary means either corrupted input or
/// a decoder fault upstream; both abort the decode.
fn link_branches(stream: &mut EmissionStream) -> CodeResult<()> {
    let by_offset: FxHashMap<u32, u32> = stream
        .iter()
        .enumerate()
        .map(|(i, e)| (e.offset, i as u32))
        .collect();

    let resolve = |t: &mut BranchTarget, offset: u32| -> CodeResult<()> {
        match by_offset.get(&t.target) {
            Some(&idx) => {
                t.element = Some(idx);
                Ok(())
            }
            None => Err(CodeError::bad_target(t.target as i64, offset)),
        }
    };

    for element in stream.elements_mut() {
        let offset = element.offset;
        match &mut element.operand {
            Operand::Branch(t) => resolve(t, offset)?,
            Operand::Switch(ts) => {
                for t in ts.iter_mut() {
                    resolve(t, offset)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::meta::Symbol;

    /// Resolver with a fixed symbol table; token N resolves to entry N.
    struct TableResolver(Vec<Option<Symbol>>);

    impl MetadataResolver for TableResolver {
        fn resolve(&self, token: MetaToken, _cx: &GenericContext) -> Result<Symbol, ResolveError> {
            match self.0.get(token.raw() as usize) {
                Some(Some(sym)) => Ok(sym.clone()),
                Some(None) => Err(ResolveError::Unresolved(token)),
                None => Err(ResolveError::OutOfRange(token)),
            }
        }
    }

    fn empty_resolver() -> TableResolver {
        TableResolver(Vec::new())
    }

    fn plain_meta() -> FunctionMeta {
        FunctionMeta::statik(
            "f",
            vec![ParamDesc::new("a", Ty::I32), ParamDesc::new("b", Ty::Object)],
            vec![LocalDesc::new(0, Ty::I64)],
        )
    }

    #[test]
    fn test_decode_empty() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        let stream = Decoder::new(&meta, &resolver).decode(&[]).unwrap();
        assert!(stream.is_empty());
    }

    #[test]
    fn test_decode_constants() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        let mut bytes = vec![0x12, 0x05]; // ldc.i4.s 5
        bytes.push(0x11); // ldc.i4
        bytes.extend_from_slice(&1000i32.to_le_bytes());
        bytes.push(0x15); // ldc.r8
        bytes.extend_from_slice(&1.5f64.to_le_bytes());

        let stream = Decoder::new(&meta, &resolver).decode(&bytes).unwrap();
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.elements()[0].operand, Operand::Int8(5));
        assert_eq!(stream.elements()[1].operand, Operand::Int32(1000));
        assert_eq!(stream.elements()[2].operand, Operand::Float64(1.5));
    }

    #[test]
    fn test_offsets_are_monotonic_and_dense() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        let mut bytes = vec![0x00]; // nop
        bytes.push(0x11); // ldc.i4
        bytes.extend_from_slice(&7i32.to_le_bytes());
        bytes.extend_from_slice(&[0xFF, 0x04, 0x00, 0x00]); // ldloc 0
        bytes.push(0x01); // ret

        let stream = Decoder::new(&meta, &resolver).decode(&bytes).unwrap();
        let elems = stream.elements();
        for pair in elems.windows(2) {
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].byte_size());
        }
    }

    #[test]
    fn test_branch_base_is_after_displacement() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        // br.s +1 at offset 0: displacement read ends at 2, so target = 3.
        // Then nop at 2 (skipped over), nop at 3.
        let bytes = [0x03, 0x01, 0x00, 0x00];
        let stream = Decoder::new(&meta, &resolver).decode(&bytes).unwrap();
        match &stream.elements()[0].operand {
            Operand::Branch(t) => {
                assert_eq!(t.target, 3);
                assert_eq!(t.element, Some(2));
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_backward_branch() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        // nop; br.s -3 -> displacement base is 3, target 0.
        let bytes = [0x00, 0x03, 0xFD];
        let stream = Decoder::new(&meta, &resolver).decode(&bytes).unwrap();
        match &stream.elements()[1].operand {
            Operand::Branch(t) => {
                assert_eq!(t.target, 0);
                assert_eq!(t.element, Some(0));
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_switch_shares_one_base() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        // switch [+0, +1] at offset 0: table ends at 13, targets 13 and 14.
        let mut bytes = vec![0x08];
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&[0x00, 0x00]); // nop nop

        let stream = Decoder::new(&meta, &resolver).decode(&bytes).unwrap();
        match &stream.elements()[0].operand {
            Operand::Switch(ts) => {
                assert_eq!(ts[0].target, 13);
                assert_eq!(ts[1].target, 14);
                assert_eq!(ts[0].element, Some(1));
                assert_eq!(ts[1].element, Some(2));
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn test_mid_instruction_target_is_fatal() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        // br.s +3 -> target 5, which is inside the ldc.i4 operand.
        let mut bytes = vec![0x03, 0x03];
        bytes.push(0x11);
        bytes.extend_from_slice(&0i32.to_le_bytes());
        let err = Decoder::new(&meta, &resolver).decode(&bytes).unwrap_err();
        assert!(matches!(err, CodeError::InvalidBranchTarget { target: 5, .. }));
    }

    #[test]
    fn test_truncated_operand_is_fatal() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        let bytes = [0x11, 0x01, 0x02]; // ldc.i4 with only 2 operand bytes
        let err = Decoder::new(&meta, &resolver).decode(&bytes).unwrap_err();
        assert!(matches!(err, CodeError::TruncatedStream { .. }));
    }

    #[test]
    fn test_truncated_ext_prefix_is_fatal() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        let err = Decoder::new(&meta, &resolver).decode(&[0xFF]).unwrap_err();
        assert!(matches!(err, CodeError::TruncatedStream { .. }));
    }

    #[test]
    fn test_unknown_code_is_fatal() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        let err = Decoder::new(&meta, &resolver).decode(&[0xEE]).unwrap_err();
        assert_eq!(err, CodeError::unknown_code(0xEE, 0));
    }

    #[test]
    fn test_variable_resolution_static() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        // ldarg.s 1 -> second declared parameter (object).
        let stream = Decoder::new(&meta, &resolver).decode(&[0x2C, 0x01]).unwrap();
        assert_eq!(
            stream.elements()[0].operand,
            Operand::Var(VarRef::Param {
                index: 1,
                ty: Ty::Object
            })
        );
    }

    #[test]
    fn test_implicit_receiver_occupies_index_zero() {
        let mut meta = plain_meta();
        let recv = Ty::Named(cinder_core::types::NamedTy::new(
            "Widget",
            cinder_core::types::TyShape::Class,
        ));
        meta.receiver = Some(recv.clone());
        let resolver = empty_resolver();

        // ldarg.0 -> receiver; ldarg.1 -> first declared parameter.
        let stream = Decoder::new(&meta, &resolver).decode(&[0x20, 0x21]).unwrap();
        assert_eq!(
            stream.elements()[0].operand,
            Operand::Var(VarRef::Param { index: 0, ty: recv })
        );
        assert_eq!(
            stream.elements()[1].operand,
            Operand::Var(VarRef::Param {
                index: 1,
                ty: Ty::I32
            })
        );
    }

    #[test]
    fn test_variable_out_of_range() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        let err = Decoder::new(&meta, &resolver).decode(&[0x30, 0x07]).unwrap_err();
        assert_eq!(
            err,
            CodeError::InvalidVariable {
                kind: "local",
                index: 7,
                offset: 0
            }
        );
    }

    #[test]
    fn test_unresolved_token_is_tolerated() {
        let meta = plain_meta();
        let resolver = TableResolver(vec![None]);
        let mut bytes = vec![0x16]; // ldstr
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let stream = Decoder::new(&meta, &resolver).decode(&bytes).unwrap();
        assert_eq!(
            stream.elements()[0].operand,
            Operand::Unresolved(MetaToken(0))
        );
    }

    #[test]
    fn test_out_of_range_token_is_fatal() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        let mut bytes = vec![0x16];
        bytes.extend_from_slice(&9u32.to_le_bytes());
        let err = Decoder::new(&meta, &resolver).decode(&bytes).unwrap_err();
        assert_eq!(err, CodeError::TokenOutOfRange { token: 9, offset: 0 });
    }

    #[test]
    fn test_resolved_token() {
        let meta = plain_meta();
        let resolver = TableResolver(vec![Some(Symbol::Str("hi".into()))]);
        let mut bytes = vec![0x16];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let stream = Decoder::new(&meta, &resolver).decode(&bytes).unwrap();
        assert_eq!(
            stream.elements()[0].operand,
            Operand::Symbol(Symbol::Str("hi".into()))
        );
    }

    #[test]
    fn test_decode_determinism() {
        let meta = plain_meta();
        let resolver = empty_resolver();
        let mut bytes = vec![0x00, 0x03, 0x00]; // nop; br.s +0
        bytes.push(0x01); // ret
        let d = Decoder::new(&meta, &resolver);
        assert_eq!(d.decode(&bytes).unwrap(), d.decode(&bytes).unwrap());
    }
}
