//! Physical IR types

use std::fmt;

/// Physical type of an IR value
///
/// Integer types carry no signedness; instructions pick signed or unsigned
/// variants instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LlType {
    /// No value
    Void,
    /// 1-bit integer (booleans)
    I1,
    /// 8-bit integer
    I8,
    /// 16-bit integer
    I16,
    /// 32-bit integer
    I32,
    /// 64-bit integer
    I64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// Pointer to the pointee type
    Ptr(Box<LlType>),
}

impl LlType {
    /// Opaque byte pointer, the placeholder for references
    pub fn byte_ptr() -> Self {
        LlType::Ptr(Box::new(LlType::I8))
    }

    /// Integer type of the given byte size
    pub fn int_of_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            1 => Some(LlType::I8),
            2 => Some(LlType::I16),
            4 => Some(LlType::I32),
            8 => Some(LlType::I64),
            _ => None,
        }
    }

    /// Float type of the given byte size
    pub fn float_of_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            4 => Some(LlType::F32),
            8 => Some(LlType::F64),
            _ => None,
        }
    }

    /// True for `float` and `double`
    pub fn is_floating(&self) -> bool {
        matches!(self, LlType::F32 | LlType::F64)
    }
}

impl fmt::Display for LlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlType::Void => write!(f, "void"),
            LlType::I1 => write!(f, "i1"),
            LlType::I8 => write!(f, "i8"),
            LlType::I16 => write!(f, "i16"),
            LlType::I32 => write!(f, "i32"),
            LlType::I64 => write!(f, "i64"),
            LlType::F32 => write!(f, "float"),
            LlType::F64 => write!(f, "double"),
            LlType::Ptr(pointee) => write!(f, "{}*", pointee),
        }
    }
}
