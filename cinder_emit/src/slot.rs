//! Storage locations: where a value lives or will be written.
//!
//! A [`Slot`] unifies the four places a value can be: the evaluation stack,
//! a local, a parameter, or a field (with an optional owning instance).
//! Each variant knows its declared type and emits the operations that make
//! its value appear on, or be written from, the top of the stack.
//!
//! Slots are transient: clients build them, hand them to
//! [`convert`](crate::convert::convert), and drop them. Only the emitted
//! operations persist.

use crate::builder::{Local, MethodBuilder};
use cinder_core::types::{FieldRef, Ty};
use std::sync::Arc;

/// A storage location with a declared type.
#[derive(Debug, Clone)]
pub enum Slot {
    /// A value already on the evaluation stack.
    Stack {
        /// The value's type.
        ty: Ty,
    },
    /// A declared local-variable slot.
    Local {
        /// The builder-issued slot.
        local: Local,
        /// Declared type.
        ty: Ty,
    },
    /// A parameter of the function being synthesized.
    Param {
        /// Parameter index.
        index: u16,
        /// Declared type.
        ty: Ty,
    },
    /// A field, with its owning instance (`None` for static fields).
    Field {
        /// The field.
        field: Arc<FieldRef>,
        /// Where the instance lives; `None` for static fields.
        instance: Option<Box<Slot>>,
    },
}

impl Slot {
    /// A stack value of type `ty`.
    #[must_use]
    pub fn stack(ty: Ty) -> Self {
        Slot::Stack { ty }
    }

    /// A local slot.
    #[must_use]
    pub fn local(local: Local, ty: Ty) -> Self {
        Slot::Local { local, ty }
    }

    /// A parameter slot.
    #[must_use]
    pub fn param(index: u16, ty: Ty) -> Self {
        Slot::Param { index, ty }
    }

    /// An instance-field slot.
    #[must_use]
    pub fn field(field: Arc<FieldRef>, instance: Slot) -> Self {
        Slot::Field {
            field,
            instance: Some(Box::new(instance)),
        }
    }

    /// A static-field slot.
    #[must_use]
    pub fn static_field(field: Arc<FieldRef>) -> Self {
        Slot::Field {
            field,
            instance: None,
        }
    }

    /// The declared type of this location.
    #[must_use]
    pub fn ty(&self) -> &Ty {
        match self {
            Slot::Stack { ty } | Slot::Local { ty, .. } | Slot::Param { ty, .. } => ty,
            Slot::Field { field, .. } => &field.ty,
        }
    }

    /// Emit the operations that put this location's value on the stack top.
    ///
    /// A stack slot's value is already there: no-op.
    pub fn emit_load(&self, b: &mut MethodBuilder) {
        match self {
            Slot::Stack { .. } => {}
            Slot::Local { local, .. } => b.emit_ldloc(*local),
            Slot::Param { index, .. } => b.emit_ldarg(*index),
            Slot::Field { field, instance } => {
                if let Some(instance) = instance {
                    instance.emit_load(b);
                }
                b.emit_field_load(field);
            }
        }
    }

    /// Emit the operations that put this location's address on the stack top.
    ///
    /// Stack values have no address; the value is spilled into a hidden
    /// local first and the local's address is taken.
    pub fn emit_load_address(&self, b: &mut MethodBuilder) {
        match self {
            Slot::Stack { ty } => {
                let hidden = b.declare_local(ty.root().clone());
                b.emit_stloc(hidden);
                b.emit_ldloca(hidden);
            }
            Slot::Local { local, .. } => b.emit_ldloca(*local),
            Slot::Param { index, .. } => b.emit_ldarga(*index),
            Slot::Field { field, instance } => {
                if let Some(instance) = instance {
                    instance.emit_load(b);
                }
                b.emit_field_address(field);
            }
        }
    }

    /// Emit the operations that write the stack top into this location.
    ///
    /// Instance-field stores expect the instance *below* the value;
    /// [`emit_store_prelude`](Self::emit_store_prelude) must have run before
    /// the value was produced. Storing to a stack slot leaves the value
    /// where it is.
    pub fn emit_store(&self, b: &mut MethodBuilder) {
        match self {
            Slot::Stack { .. } => {}
            Slot::Local { local, .. } => b.emit_stloc(*local),
            Slot::Param { index, .. } => b.emit_starg(*index),
            Slot::Field { field, .. } => b.emit_field_store(field),
        }
    }

    /// Emit whatever must precede the value for a store into this location:
    /// the owning instance, for instance-field slots.
    pub(crate) fn emit_store_prelude(&self, b: &mut MethodBuilder) {
        if let Slot::Field {
            field,
            instance: Some(instance),
        } = self
        {
            debug_assert!(!field.is_static, "static field with an instance slot");
            instance.emit_load(b);
        }
    }
}
