//! Dynamic code synthesis for cinder.
//!
//! Builds new callable code objects at run time through a typed emission
//! API. Shares the instruction vocabulary of `cinder_bytecode`, so a
//! decoded stream can be replayed into a builder and a synthesized unit can
//! be decoded back.
//!
//! - [`MethodBuilder`] - fluent emission surface with locals and labels
//! - [`Slot`] / [`convert`] - storage locations and the coercion protocol
//! - [`NameRegistry`] - process-wide unique naming for synthesized objects
//! - [`CodeUnit`] / [`CodeHost`] - the finalized unit and the install contract

pub mod builder;
pub mod convert;
pub mod host;
pub mod registry;
pub mod slot;

pub use builder::{Label, Local, MethodBuilder};
pub use convert::convert;
pub use host::{CodeHost, CodeUnit, MethodSig};
pub use registry::NameRegistry;
pub use slot::Slot;
