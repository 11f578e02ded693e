//! Semantic types carried by graph values

use std::fmt;

/// Semantic type of a graph value
///
/// Signedness is part of the semantic type but not of the low-level IR type;
/// the lowering visitor reads it from here when it picks signed or unsigned
/// instruction variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// No value
    Void,
    /// Boolean (lowered to a 1-bit integer)
    Boolean,
    /// Two's complement signed integer of the given byte size
    SignedInteger {
        /// Size in bytes
        bytes: u32,
    },
    /// Unsigned integer of the given byte size
    UnsignedInteger {
        /// Size in bytes
        bytes: u32,
    },
    /// IEEE floating point of the given byte size
    Float {
        /// Size in bytes
        bytes: u32,
    },
    /// Reference to an object of the named class
    Reference {
        /// Class name, e.g. `java/lang/Object`
        class: String,
    },
    /// Un-lowered class type; must become a reference before code generation
    Class {
        /// Class name
        name: String,
    },
}

impl Type {
    /// 8-bit signed integer
    pub fn s8() -> Self {
        Type::SignedInteger { bytes: 1 }
    }

    /// 16-bit signed integer
    pub fn s16() -> Self {
        Type::SignedInteger { bytes: 2 }
    }

    /// 32-bit signed integer
    pub fn s32() -> Self {
        Type::SignedInteger { bytes: 4 }
    }

    /// 64-bit signed integer
    pub fn s64() -> Self {
        Type::SignedInteger { bytes: 8 }
    }

    /// 16-bit unsigned integer
    pub fn u16() -> Self {
        Type::UnsignedInteger { bytes: 2 }
    }

    /// 32-bit unsigned integer
    pub fn u32() -> Self {
        Type::UnsignedInteger { bytes: 4 }
    }

    /// 64-bit unsigned integer
    pub fn u64() -> Self {
        Type::UnsignedInteger { bytes: 8 }
    }

    /// 32-bit float
    pub fn f32() -> Self {
        Type::Float { bytes: 4 }
    }

    /// 64-bit float
    pub fn f64() -> Self {
        Type::Float { bytes: 8 }
    }

    /// Reference to the named class
    pub fn reference(class: impl Into<String>) -> Self {
        Type::Reference {
            class: class.into(),
        }
    }

    /// True for floating point types
    pub fn is_floating(&self) -> bool {
        matches!(self, Type::Float { .. })
    }

    /// True for signed integer types
    pub fn is_signed(&self) -> bool {
        matches!(self, Type::SignedInteger { .. })
    }

    /// True for integer types of either signedness
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::SignedInteger { .. } | Type::UnsignedInteger { .. }
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Boolean => write!(f, "boolean"),
            Type::SignedInteger { bytes } => write!(f, "s{}", bytes * 8),
            Type::UnsignedInteger { bytes } => write!(f, "u{}", bytes * 8),
            Type::Float { bytes } => write!(f, "f{}", bytes * 8),
            Type::Reference { class } => write!(f, "ref({})", class),
            Type::Class { name } => write!(f, "class({})", name),
        }
    }
}
