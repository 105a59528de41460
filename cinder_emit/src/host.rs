//! The host code-install contract.
//!
//! The synthesizer produces a [`CodeUnit`]: final instruction bytes, the
//! declared signature, local types, and the symbol table its tokens index.
//! The host turns a unit into an invocable value; the engine never persists
//! or serializes units itself.

use cinder_bytecode::decoder::FunctionMeta;
use cinder_core::error::CodeResult;
use cinder_core::meta::{GenericContext, MetaToken, MetadataResolver, ResolveError, Symbol};
use cinder_core::types::{LocalDesc, ParamDesc, Ty};
use std::sync::Arc;

/// The declared signature of a synthesized code object.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    /// Parameter types, in order.
    pub params: Vec<Ty>,
    /// Return type (`void` for none).
    pub ret: Ty,
}

impl MethodSig {
    /// Create a signature.
    #[must_use]
    pub fn new(params: Vec<Ty>, ret: Ty) -> Self {
        Self { params, ret }
    }
}

/// A finalized, immutable code object awaiting installation.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    /// Process-unique name.
    pub name: Arc<str>,
    /// Declared signature.
    pub sig: MethodSig,
    /// Declared local types, in slot order.
    pub locals: Vec<Ty>,
    /// Final instruction bytes.
    pub bytes: Vec<u8>,
    /// Symbol table; token `N` in `bytes` is entry `N`.
    pub symbols: Vec<Symbol>,
}

impl CodeUnit {
    /// Function metadata for decoding this unit back into a stream.
    #[must_use]
    pub fn function_meta(&self) -> FunctionMeta {
        FunctionMeta::statik(
            self.name.clone(),
            self.sig
                .params
                .iter()
                .enumerate()
                .map(|(i, ty)| ParamDesc::new(format!("p{}", i), ty.clone()))
                .collect(),
            self.locals
                .iter()
                .enumerate()
                .map(|(i, ty)| LocalDesc::new(i as u16, ty.clone()))
                .collect(),
        )
    }
}

// A unit's tokens are plain indices into its own symbol table.
impl MetadataResolver for CodeUnit {
    fn resolve(&self, token: MetaToken, _cx: &GenericContext) -> Result<Symbol, ResolveError> {
        self.symbols
            .get(token.raw() as usize)
            .cloned()
            .ok_or(ResolveError::OutOfRange(token))
    }
}

/// Host-side installation of finalized code objects.
pub trait CodeHost {
    /// The invocable value the host hands back.
    type Callable;

    /// Install `unit` and return the callable bound to its signature.
    fn install(&self, unit: CodeUnit) -> CodeResult<Self::Callable>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_resolves_its_own_tokens() {
        let unit = CodeUnit {
            name: "u".into(),
            sig: MethodSig::new(vec![], Ty::Void),
            locals: vec![],
            bytes: vec![],
            symbols: vec![Symbol::Str("s".into())],
        };
        let cx = GenericContext::empty();
        assert_eq!(
            unit.resolve(MetaToken(0), &cx),
            Ok(Symbol::Str("s".into()))
        );
        assert_eq!(
            unit.resolve(MetaToken(1), &cx),
            Err(ResolveError::OutOfRange(MetaToken(1)))
        );
    }

    #[test]
    fn test_function_meta_mirrors_signature() {
        let unit = CodeUnit {
            name: "u".into(),
            sig: MethodSig::new(vec![Ty::I32, Ty::Object], Ty::I32),
            locals: vec![Ty::F64],
            bytes: vec![],
            symbols: vec![],
        };
        let meta = unit.function_meta();
        assert_eq!(meta.params.len(), 2);
        assert_eq!(meta.param_ty(1), Some(&Ty::Object));
        assert_eq!(meta.local_ty(0), Some(&Ty::F64));
        assert_eq!(meta.receiver, None);
    }
}
