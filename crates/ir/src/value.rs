//! This module contains quill IR value definition.

use std::fmt;

use cranelift_entity::entity_impl;

use super::{Insn, Type};

/// An opaque reference to [`ValueData`].
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Value(pub u32);
entity_impl!(Value, "v");

/// An value data definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueData {
    /// The value is defined by an instruction.
    Insn { insn: Insn, ty: Type },

    /// The value is a function parameter.
    Param { idx: usize, ty: Type },
}

impl ValueData {
    pub fn ty(&self) -> &Type {
        match self {
            Self::Insn { ty, .. } | Self::Param { ty, .. } => ty,
        }
    }
}

/// A typed constant.
///
/// Floats are kept as their bit patterns so that immediates compare and hash
/// bit exactly, NaN payloads included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Immediate {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(u32),
    F64(u64),
    Ptr(u64),
}

impl Immediate {
    pub fn f32(val: f32) -> Self {
        Self::F32(val.to_bits())
    }

    pub fn f64(val: f64) -> Self {
        Self::F64(val.to_bits())
    }

    pub fn ty(&self) -> Type {
        match self {
            Self::I8(_) => Type::I8,
            Self::I16(_) => Type::I16,
            Self::I32(_) => Type::I32,
            Self::I64(_) => Type::I64,
            Self::U8(_) => Type::U8,
            Self::U16(_) => Type::U16,
            Self::U32(_) => Type::U32,
            Self::U64(_) => Type::U64,
            Self::F32(_) => Type::F32,
            Self::F64(_) => Type::F64,
            Self::Ptr(_) => Type::Ptr,
        }
    }

    /// Widens an integer immediate, sign or zero extending it according to
    /// its type.
    pub fn as_i128(self) -> Option<i128> {
        Some(match self {
            Self::I8(val) => val.into(),
            Self::I16(val) => val.into(),
            Self::I32(val) => val.into(),
            Self::I64(val) => val.into(),
            Self::U8(val) => val.into(),
            Self::U16(val) => val.into(),
            Self::U32(val) => val.into(),
            Self::U64(val) | Self::Ptr(val) => val.into(),
            Self::F32(_) | Self::F64(_) => return None,
        })
    }

    /// Truncates `val` to the width of the integer type `ty`.
    pub fn from_i128(val: i128, ty: &Type) -> Option<Self> {
        Some(match ty {
            Type::I8 => Self::I8(val as i8),
            Type::I16 => Self::I16(val as i16),
            Type::I32 => Self::I32(val as i32),
            Type::I64 => Self::I64(val as i64),
            Type::U8 => Self::U8(val as u8),
            Type::U16 => Self::U16(val as u16),
            Type::U32 => Self::U32(val as u32),
            Type::U64 => Self::U64(val as u64),
            Type::Ptr => Self::Ptr(val as u64),
            _ => return None,
        })
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            Self::F32(bits) => Some(f32::from_bits(bits).into()),
            Self::F64(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }

    /// Rounds `val` to the float type `ty`.
    pub fn from_f64(val: f64, ty: &Type) -> Option<Self> {
        match ty {
            Type::F32 => Some(Self::f32(val as f32)),
            Type::F64 => Some(Self::f64(val)),
            _ => None,
        }
    }

    pub fn zero(ty: &Type) -> Option<Self> {
        Self::from_i128(0, ty).or_else(|| Self::from_f64(0.0, ty))
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32(_) | Self::F64(_))
    }

    /// Returns `true` for an integer zero. Float zeros are signed and never
    /// count.
    pub fn is_zero(self) -> bool {
        self.as_i128() == Some(0)
    }

    /// Returns `true` for an integer one.
    pub fn is_one(self) -> bool {
        self.as_i128() == Some(1)
    }

    /// Parses the literal form written by the IR writer for an immediate of
    /// type `ty`.
    pub fn parse_literal(text: &str, ty: &Type) -> Option<Self> {
        if ty.is_float() {
            return parse_float_literal(text, ty);
        }

        let val: i128 = if let Some(hex) = text.strip_prefix("0x") {
            i128::from_str_radix(hex, 16).ok()?
        } else {
            text.parse().ok()?
        };

        let bits = ty.bits()?;
        let in_range = if ty.is_signed() {
            let bound = 1i128 << (bits - 1);
            (-bound..bound).contains(&val)
        } else {
            (0..(1i128 << bits)).contains(&val)
        };

        if in_range {
            Self::from_i128(val, ty)
        } else {
            None
        }
    }
}

fn parse_float_literal(text: &str, ty: &Type) -> Option<Immediate> {
    if let Some(bits) = text.strip_prefix("nan:0x") {
        return match ty {
            Type::F32 => u32::from_str_radix(bits, 16).ok().map(Immediate::F32),
            _ => u64::from_str_radix(bits, 16).ok().map(Immediate::F64),
        };
    }

    match ty {
        Type::F32 => {
            let val: f32 = text.parse().ok()?;
            (!val.is_nan()).then(|| Immediate::f32(val))
        }
        _ => {
            let val: f64 = text.parse().ok()?;
            (!val.is_nan()).then(|| Immediate::f64(val))
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::I8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) | Self::Ptr(v) => write!(f, "{v}"),
            Self::F32(bits) => {
                let v = f32::from_bits(bits);
                if v.is_nan() {
                    write!(f, "nan:0x{bits:08x}")
                } else {
                    write_finite_or_inf(f, v.is_infinite(), v.is_sign_negative(), &v)
                }
            }
            Self::F64(bits) => {
                let v = f64::from_bits(bits);
                if v.is_nan() {
                    write!(f, "nan:0x{bits:016x}")
                } else {
                    write_finite_or_inf(f, v.is_infinite(), v.is_sign_negative(), &v)
                }
            }
        }
    }
}

fn write_finite_or_inf(
    f: &mut fmt::Formatter,
    is_inf: bool,
    is_neg: bool,
    v: &dyn fmt::Debug,
) -> fmt::Result {
    match (is_inf, is_neg) {
        (true, false) => f.write_str("inf"),
        (true, true) => f.write_str("-inf"),
        // `Debug` prints the shortest representation that parses back to the
        // same bits.
        _ => write!(f, "{v:?}"),
    }
}

macro_rules! impl_imm_from {
    ($arg_ty:ty, $immediate_variant:expr) => {
        impl From<$arg_ty> for Immediate {
            fn from(imm: $arg_ty) -> Self {
                $immediate_variant(imm)
            }
        }
    };
}

impl_imm_from!(i8, Immediate::I8);
impl_imm_from!(i16, Immediate::I16);
impl_imm_from!(i32, Immediate::I32);
impl_imm_from!(i64, Immediate::I64);
impl_imm_from!(u8, Immediate::U8);
impl_imm_from!(u16, Immediate::U16);
impl_imm_from!(u32, Immediate::U32);
impl_imm_from!(u64, Immediate::U64);
impl_imm_from!(f32, Immediate::f32);
impl_imm_from!(f64, Immediate::f64);
