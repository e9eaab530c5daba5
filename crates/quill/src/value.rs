//! The tagged value cell shared by the compiler and the VM.
//!
//! A [`ValueCell`] carries three orthogonal tags — its compile-time role
//! ([`ValueKind`]), its payload shape ([`TypeTag`], derived from the
//! payload), and its fold-tracking state ([`ValueStatus`]) — plus the
//! payload itself. Cells live in the [`ValuePool`](crate::pool::ValuePool)
//! arena and reference each other by [`ValueId`](crate::pool::ValueId):
//! vectors hold child ids, temp cells hold one inner id, and callables may
//! hold a captured receiver id. References only ever point downward, so the
//! value graph is acyclic by construction.

use crate::{
    intern::StrId,
    pool::ValueId,
    types::{NativeFn, TypeId},
};

/// Compile-time role of a value cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// No role assigned yet.
    Unknown,
    /// A symbolic name (variable); opcodes reference the canonical cell.
    Named,
    /// A literal or other compile-time constant.
    Const,
    /// A scratch slot that holds an operation's result by reference.
    Temp,
}

/// Fold-tracking state of a value cell.
///
/// Constant folding refuses to fold through a named value once it has been
/// marked [`ValueStatus::Modified`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueStatus {
    /// The cell holds a meaningful payload.
    Set,
    /// The cell has not been initialised.
    Unset,
    /// The cell has been written to after initialisation.
    Modified,
}

/// Runtime payload shape of a value cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    None,
    Integer,
    Double,
    Str,
    Boolean,
    Vector,
    User,
}

impl TypeTag {
    /// Short name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Integer => "Int",
            Self::Double => "Double",
            Self::Str => "String",
            Self::Boolean => "Bool",
            Self::Vector => "Array",
            Self::User => "object",
        }
    }
}

/// A callable payload: a native function plus the context captured when the
/// call opcode was emitted.
#[derive(Debug, Clone)]
pub struct CallableData {
    /// Interned name, kept for error messages and tracing.
    pub name: StrId,
    /// The native entry point.
    pub func: NativeFn,
    /// Receiver captured at emit time (method calls only).
    pub recv: Option<ValueId>,
    /// The receiver's declared type (method calls only), checked at call time.
    pub ty: Option<TypeId>,
}

/// Discriminated payload of a value cell.
#[derive(Debug, Clone, Default)]
pub enum ValueData {
    /// No payload.
    #[default]
    None,
    Int(i64),
    Double(f64),
    Bool(bool),
    /// An interner-owned string.
    Str(StrId),
    /// An ordered sequence of child values. Each entry is a counted reference.
    Vector(Vec<ValueId>),
    /// A callable with captured call context.
    Callable(Box<CallableData>),
    /// An inner value held by reference; used by temp cells only.
    Ref(ValueId),
    /// Opaque user data described by a type descriptor.
    User(TypeId),
}

impl ValueData {
    /// Returns the payload's runtime shape.
    ///
    /// `Ref` payloads report [`TypeTag::None`]; resolve the temp chain first
    /// when the inner shape matters.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        match self {
            Self::None | Self::Ref(_) => TypeTag::None,
            Self::Int(_) => TypeTag::Integer,
            Self::Double(_) => TypeTag::Double,
            Self::Bool(_) => TypeTag::Boolean,
            Self::Str(_) => TypeTag::Str,
            Self::Vector(_) => TypeTag::Vector,
            Self::Callable(_) | Self::User(_) => TypeTag::User,
        }
    }
}

/// A reference-counted, tagged value cell.
///
/// The refcount itself lives in the pool's slot, not in the cell.
#[derive(Debug)]
pub struct ValueCell {
    kind: ValueKind,
    status: ValueStatus,
    data: ValueData,
    /// Declared type descriptor, set for named values at declaration time.
    /// Method resolution consults this before falling back to the payload
    /// shape.
    decl_ty: Option<TypeId>,
}

impl ValueCell {
    /// Creates a cell with the given role and payload, status `Set`.
    #[must_use]
    pub fn new(kind: ValueKind, data: ValueData) -> Self {
        Self {
            kind,
            status: ValueStatus::Set,
            data,
            decl_ty: None,
        }
    }

    /// Creates a constant cell holding `data`.
    #[must_use]
    pub fn constant(data: ValueData) -> Self {
        Self::new(ValueKind::Const, data)
    }

    /// Creates an uninitialised named cell of the given declared type.
    #[must_use]
    pub fn named(decl_ty: TypeId) -> Self {
        Self {
            kind: ValueKind::Named,
            status: ValueStatus::Unset,
            data: ValueData::None,
            decl_ty: Some(decl_ty),
        }
    }

    /// Creates an empty temp cell.
    #[must_use]
    pub fn temp() -> Self {
        Self {
            kind: ValueKind::Temp,
            status: ValueStatus::Unset,
            data: ValueData::None,
            decl_ty: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    #[must_use]
    pub fn status(&self) -> ValueStatus {
        self.status
    }

    #[must_use]
    pub fn data(&self) -> &ValueData {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut ValueData {
        &mut self.data
    }

    #[must_use]
    pub fn decl_ty(&self) -> Option<TypeId> {
        self.decl_ty
    }

    #[must_use]
    pub fn is_const(&self) -> bool {
        self.kind == ValueKind::Const
    }

    #[must_use]
    pub fn is_named(&self) -> bool {
        self.kind == ValueKind::Named
    }

    #[must_use]
    pub fn is_temp(&self) -> bool {
        self.kind == ValueKind::Temp
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.status == ValueStatus::Modified
    }

    /// Marks the cell as written-to. A constant is never modified.
    pub fn set_modified(&mut self) {
        debug_assert!(!self.is_const(), "a Const cell must never be marked Modified");
        self.status = ValueStatus::Modified;
    }

    pub fn set_status(&mut self, status: ValueStatus) {
        debug_assert!(
            !(self.is_const() && status == ValueStatus::Modified),
            "a Const cell must never be marked Modified"
        );
        self.status = status;
    }

    pub(crate) fn set_decl_ty(&mut self, ty: TypeId) {
        self.decl_ty = Some(ty);
    }

    /// Replaces the payload, returning the previous one so the caller can
    /// release any references it held.
    pub(crate) fn replace_data(&mut self, data: ValueData) -> ValueData {
        std::mem::replace(&mut self.data, data)
    }
}
