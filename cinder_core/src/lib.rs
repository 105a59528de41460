//! Shared vocabulary for the cinder bytecode engine.
//!
//! This crate holds the types every other cinder crate speaks:
//! - [`CodeError`] / [`CodeResult`] - the unified error taxonomy
//! - [`Ty`] - the static type model (values, references, by-ref)
//! - [`Symbol`], [`MetaToken`], [`MetadataResolver`] - the host metadata contract

pub mod error;
pub mod meta;
pub mod types;

pub use error::{CodeError, CodeResult};
pub use meta::{GenericContext, MetaToken, MetadataResolver, ResolveError, Symbol};
pub use types::{FieldRef, LocalDesc, MethodRef, NamedTy, ParamDesc, Ty, TyShape};
