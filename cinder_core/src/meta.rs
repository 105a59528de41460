//! The host metadata contract.
//!
//! The engine never owns module metadata. The host supplies a
//! [`MetadataResolver`] mapping 4-byte tokens (plus the generic-argument
//! context of the function being decoded) to [`Symbol`]s. Resolution failure
//! is distinguishable from an out-of-range index: the former is tolerated
//! during decode for display purposes, the latter indicates corruption.

use crate::types::{FieldRef, MethodRef, Ty};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A 4-byte metadata token referencing a field, method, type, or string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MetaToken(pub u32);

impl MetaToken {
    /// Get the raw token value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MetaToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Generic arguments in scope while decoding a function: the method's own
/// arguments and the declaring type's arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenericContext {
    /// Method-level generic arguments (`!!n`).
    pub method_args: Vec<Ty>,
    /// Declaring-type-level generic arguments (`!n`).
    pub type_args: Vec<Ty>,
}

impl GenericContext {
    /// The empty context.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Substitute generic placeholders in `ty` with the arguments in scope.
    /// A placeholder with no argument in scope is left as-is; the resolver
    /// decides whether that constitutes a failure.
    #[must_use]
    pub fn substitute(&self, ty: &Ty) -> Ty {
        match ty {
            Ty::MVar(i) => self
                .method_args
                .get(*i as usize)
                .cloned()
                .unwrap_or_else(|| ty.clone()),
            Ty::TVar(i) => self
                .type_args
                .get(*i as usize)
                .cloned()
                .unwrap_or_else(|| ty.clone()),
            Ty::ByRef(inner) => self.substitute(inner).by_ref(),
            other => other.clone(),
        }
    }
}

/// A symbolic reference resolved from a metadata token.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    /// A field reference.
    Field(Arc<FieldRef>),
    /// A method or constructor reference.
    Method(Arc<MethodRef>),
    /// A type reference.
    Type(Ty),
    /// A literal string.
    Str(Arc<str>),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Field(fr) => write!(f, "field {}", fr),
            Symbol::Method(m) => write!(f, "method {}", m),
            Symbol::Type(t) => write!(f, "type {}", t),
            Symbol::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Why a token failed to resolve.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// The token index is past the end of the owning module's tables.
    #[error("token {0} out of range")]
    OutOfRange(MetaToken),
    /// The token is in range but its target could not be materialized.
    #[error("token {0} unresolved")]
    Unresolved(MetaToken),
}

/// Host-supplied resolution of metadata tokens.
pub trait MetadataResolver {
    /// Resolve `token` in the given generic context.
    fn resolve(&self, token: MetaToken, cx: &GenericContext) -> Result<Symbol, ResolveError>;
}
