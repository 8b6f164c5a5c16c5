//! This module contains quill IR types definitions.

use std::fmt;

/// Quill IR types definition.
///
/// `Ptr` is untyped; what it points to is known only from the instruction
/// that produced it. `Array` only describes memory: it can be allocated,
/// stored in a global, or sized, but no SSA value has an array type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Ptr,
    Void,
    Array { elem_ty: Box<Type>, len: usize },
}

impl Type {
    pub fn make_array(elem_ty: Type, len: usize) -> Self {
        Self::Array {
            elem_ty: elem_ty.into(),
            len,
        }
    }

    /// Parses the name of a scalar type, e.g. `i32` or `ptr`.
    pub fn from_scalar_name(name: &str) -> Option<Self> {
        Some(match name {
            "i8" => Self::I8,
            "i16" => Self::I16,
            "i32" => Self::I32,
            "i64" => Self::I64,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            "ptr" => Self::Ptr,
            "void" => Self::Void,
            _ => return None,
        })
    }

    /// Returns `true` for integer types. `ptr` behaves as a 64-bit unsigned
    /// integer in arithmetic.
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Self::I8
                | Self::I16
                | Self::I32
                | Self::I64
                | Self::U8
                | Self::U16
                | Self::U32
                | Self::U64
                | Self::Ptr
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_float()
    }

    /// Returns `true` if a value of this type can live in an SSA register.
    pub fn is_scalar(&self) -> bool {
        self.is_numeric()
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    /// Width in bits of a scalar type.
    pub fn bits(&self) -> Option<u32> {
        Some(match self {
            Self::I8 | Self::U8 => 8,
            Self::I16 | Self::U16 => 16,
            Self::I32 | Self::U32 | Self::F32 => 32,
            Self::I64 | Self::U64 | Self::F64 | Self::Ptr => 64,
            Self::Void | Self::Array { .. } => return None,
        })
    }

    /// Size in bytes of a value of this type in memory.
    pub fn size_of(&self) -> usize {
        match self {
            Self::Void => 0,
            Self::Array { elem_ty, len } => elem_ty.size_of() * len,
            _ => self.bits().map_or(0, |bits| bits as usize / 8),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::I8 => f.write_str("i8"),
            Self::I16 => f.write_str("i16"),
            Self::I32 => f.write_str("i32"),
            Self::I64 => f.write_str("i64"),
            Self::U8 => f.write_str("u8"),
            Self::U16 => f.write_str("u16"),
            Self::U32 => f.write_str("u32"),
            Self::U64 => f.write_str("u64"),
            Self::F32 => f.write_str("f32"),
            Self::F64 => f.write_str("f64"),
            Self::Ptr => f.write_str("ptr"),
            Self::Void => f.write_str("void"),
            Self::Array { elem_ty, len } => write!(f, "[{elem_ty}; {len}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_size() {
        let arr = Type::make_array(Type::make_array(Type::U16, 3), 4);
        assert_eq!(arr.size_of(), 24);
        assert_eq!(arr.to_string(), "[[u16; 3]; 4]");
        assert!(!arr.is_scalar());
    }

    #[test]
    fn ptr_is_integral() {
        assert!(Type::Ptr.is_integral());
        assert!(!Type::Ptr.is_signed());
        assert_eq!(Type::Ptr.bits(), Some(64));
        assert_eq!(Type::from_scalar_name("ptr"), Some(Type::Ptr));
        assert_eq!(Type::from_scalar_name("i128"), None);
    }
}
