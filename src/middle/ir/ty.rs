use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::TypeId;

/// The type of a slot or of an expression's value.
///
/// `Null` is the bottom of the reference types: a slot of that type can never
/// hold an object, only `null`. Narrowing a slot to `Null` means every
/// dereference through it is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Type {
    Primitive(PrimitiveKind),
    Null,
    Reference(TypeId),
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumString,
    EnumIter,
    Display,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveKind {
    Void,
    Boolean,
    Int,
    Char,
}

impl Type {
    pub const VOID: Self = Self::Primitive(PrimitiveKind::Void);
    pub const BOOLEAN: Self = Self::Primitive(PrimitiveKind::Boolean);
    pub const INT: Self = Self::Primitive(PrimitiveKind::Int);

    /// Slots of reference type are the only ones type narrowing touches
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Null | Type::Reference(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Type::Null)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveKind::Void))
    }

    pub fn as_declared(&self) -> Option<TypeId> {
        match self {
            Type::Reference(id) => Some(*id),
            Type::Primitive(_) | Type::Null => None,
        }
    }
}

impl From<TypeId> for Type {
    fn from(value: TypeId) -> Self {
        Type::Reference(value)
    }
}
