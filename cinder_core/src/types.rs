//! Static type model for decoded and synthesized code.
//!
//! [`Ty`] is a closed tagged union over every type shape the engine needs to
//! reason about when moving values between storage locations:
//!
//! - primitives and `string`/`object` built-ins
//! - named types (value structs, classes, interfaces) with their base chain
//! - by-reference wrappers (`&T`, one level deep)
//! - generic placeholders substituted through a [`crate::GenericContext`]
//!
//! The enum is exhaustive on purpose: every consumer matches all variants and
//! the compiler rules out an unhandled fifth storage shape appearing later.

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// The shape of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TyShape {
    /// A value type (copied by value, boxable).
    Value,
    /// A reference type allocated behind a pointer.
    Class,
    /// An interface; only ever implemented, never instantiated.
    Interface,
}

/// A named type: a value struct, class, or interface from host metadata.
#[derive(Debug)]
pub struct NamedTy {
    /// Fully qualified name.
    pub name: Arc<str>,
    /// Value, class, or interface.
    pub shape: TyShape,
    /// Base class, if any.
    pub base: Option<Arc<NamedTy>>,
    /// Implemented interfaces.
    pub interfaces: SmallVec<[Arc<NamedTy>; 2]>,
}

impl NamedTy {
    /// Create a named type with no base and no interfaces.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, shape: TyShape) -> Arc<Self> {
        Arc::new(NamedTy {
            name: name.into(),
            shape,
            base: None,
            interfaces: SmallVec::new(),
        })
    }

    /// Create a class type extending `base`.
    #[must_use]
    pub fn with_base(name: impl Into<Arc<str>>, base: Arc<NamedTy>) -> Arc<Self> {
        Arc::new(NamedTy {
            name: name.into(),
            shape: TyShape::Class,
            base: Some(base),
            interfaces: SmallVec::new(),
        })
    }

    /// Create a type implementing the given interfaces.
    #[must_use]
    pub fn with_interfaces(
        name: impl Into<Arc<str>>,
        shape: TyShape,
        interfaces: impl IntoIterator<Item = Arc<NamedTy>>,
    ) -> Arc<Self> {
        Arc::new(NamedTy {
            name: name.into(),
            shape,
            base: None,
            interfaces: interfaces.into_iter().collect(),
        })
    }

    /// Walk the base chain and interface lists looking for `other`.
    #[must_use]
    pub fn extends_or_implements(&self, other: &NamedTy) -> bool {
        if self.interfaces.iter().any(|i| i.as_ref() == other) {
            return true;
        }
        let mut cur = self.base.as_deref();
        while let Some(b) = cur {
            if b == other || b.interfaces.iter().any(|i| i.as_ref() == other) {
                return true;
            }
            cur = b.base.as_deref();
        }
        false
    }
}

// Named types compare by identity (name + shape); the base chain is metadata,
// not part of the type's identity.
impl PartialEq for NamedTy {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.shape == other.shape
    }
}

impl Eq for NamedTy {}

/// A static type, possibly by-reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Ty {
    /// No value.
    Void,
    /// Boolean.
    Bool,
    /// Signed integers.
    I8,
    I16,
    I32,
    I64,
    /// IEEE floats.
    F32,
    F64,
    /// Immutable string reference.
    Str,
    /// The root reference type; anything can be boxed or upcast into it.
    Object,
    /// A named value/class/interface type.
    Named(Arc<NamedTy>),
    /// A method-level generic placeholder.
    MVar(u16),
    /// A declaring-type-level generic placeholder.
    TVar(u16),
    /// A managed reference to the inner type.
    ByRef(Arc<Ty>),
}

impl Ty {
    /// Wrap this type in a by-reference.
    #[must_use]
    pub fn by_ref(self) -> Ty {
        Ty::ByRef(Arc::new(self))
    }

    /// Whether this is a by-reference type.
    #[inline]
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        matches!(self, Ty::ByRef(_))
    }

    /// The referent for by-ref types, the type itself otherwise.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Ty {
        match self {
            Ty::ByRef(inner) => inner,
            other => other,
        }
    }

    /// Whether this is `void`.
    #[inline]
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Ty::Void)
    }

    /// Whether this is the root `object` type.
    #[inline]
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Ty::Object)
    }

    /// Whether values of this type are copied by value (and boxable).
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self {
            Ty::Bool | Ty::I8 | Ty::I16 | Ty::I32 | Ty::I64 | Ty::F32 | Ty::F64 => true,
            Ty::Named(n) => n.shape == TyShape::Value,
            _ => false,
        }
    }

    /// Whether `self` can be upcast to `other` via the base chain or an
    /// implemented interface. Only meaningful between named types.
    #[must_use]
    pub fn extends_or_implements(&self, other: &Ty) -> bool {
        match (self, other) {
            (Ty::Named(s), Ty::Named(d)) => s.extends_or_implements(d),
            _ => false,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Void => f.write_str("void"),
            Ty::Bool => f.write_str("bool"),
            Ty::I8 => f.write_str("i8"),
            Ty::I16 => f.write_str("i16"),
            Ty::I32 => f.write_str("i32"),
            Ty::I64 => f.write_str("i64"),
            Ty::F32 => f.write_str("f32"),
            Ty::F64 => f.write_str("f64"),
            Ty::Str => f.write_str("string"),
            Ty::Object => f.write_str("object"),
            Ty::Named(n) => f.write_str(&n.name),
            Ty::MVar(i) => write!(f, "!!{}", i),
            Ty::TVar(i) => write!(f, "!{}", i),
            Ty::ByRef(inner) => write!(f, "&{}", inner),
        }
    }
}

/// A parameter descriptor supplied by the host for an existing function.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDesc {
    /// Parameter name, for display.
    pub name: Arc<str>,
    /// Declared type.
    pub ty: Ty,
}

impl ParamDesc {
    /// Create a parameter descriptor.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A local-variable descriptor supplied by the host for an existing function.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDesc {
    /// Slot index in declaration order.
    pub index: u16,
    /// Declared type.
    pub ty: Ty,
}

impl LocalDesc {
    /// Create a local descriptor.
    #[must_use]
    pub fn new(index: u16, ty: Ty) -> Self {
        Self { index, ty }
    }
}

/// A resolved reference to a field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    /// Field name.
    pub name: Arc<str>,
    /// Declaring type.
    pub owner: Ty,
    /// Field type.
    pub ty: Ty,
    /// Whether the field is static (no instance required).
    pub is_static: bool,
}

impl FieldRef {
    /// Create an instance field reference.
    #[must_use]
    pub fn instance(name: impl Into<Arc<str>>, owner: Ty, ty: Ty) -> Self {
        Self {
            name: name.into(),
            owner,
            ty,
            is_static: false,
        }
    }

    /// Create a static field reference.
    #[must_use]
    pub fn statik(name: impl Into<Arc<str>>, owner: Ty, ty: Ty) -> Self {
        Self {
            name: name.into(),
            owner,
            ty,
            is_static: true,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.name)
    }
}

/// A resolved reference to a method or constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    /// Method name (`.ctor` for constructors).
    pub name: Arc<str>,
    /// Declaring type.
    pub owner: Ty,
    /// Declared parameter types, excluding any receiver.
    pub params: Vec<Ty>,
    /// Return type (`void` for none).
    pub ret: Ty,
    /// Whether the method takes an implicit receiver.
    pub is_instance: bool,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.name)
    }
}
