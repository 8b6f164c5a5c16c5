use super::ArithError;
use crate::{Immediate, Type};

/// Converts `arg` to `ty` the way an `as` cast does: integers are truncated
/// or extended by the source signedness, float to integer saturates and
/// maps NaN to zero.
pub fn eval_cast(arg: Immediate, ty: &Type) -> Result<Immediate, ArithError> {
    if let Some(val) = arg.as_f64() {
        return Ok(match ty {
            Type::F32 if matches!(arg, Immediate::F32(_)) => arg,
            Type::F32 => Immediate::f32(val as f32),
            Type::F64 => Immediate::f64(val),
            Type::I8 => Immediate::I8(val as i8),
            Type::I16 => Immediate::I16(val as i16),
            Type::I32 => Immediate::I32(val as i32),
            Type::I64 => Immediate::I64(val as i64),
            Type::U8 => Immediate::U8(val as u8),
            Type::U16 => Immediate::U16(val as u16),
            Type::U32 => Immediate::U32(val as u32),
            Type::U64 => Immediate::U64(val as u64),
            Type::Ptr => Immediate::Ptr(val as u64),
            Type::Void | Type::Array { .. } => return Err(ArithError::TypeMismatch),
        });
    }

    let val = arg.as_i128().ok_or(ArithError::TypeMismatch)?;
    match ty {
        Type::F32 => Ok(Immediate::f32(val as f32)),
        Type::F64 => Ok(Immediate::f64(val as f64)),
        _ => Immediate::from_i128(val, ty).ok_or(ArithError::TypeMismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_casts() {
        assert_eq!(eval_cast(Immediate::I8(-1), &Type::I32), Ok(Immediate::I32(-1)));
        assert_eq!(eval_cast(Immediate::U8(0xff), &Type::I32), Ok(Immediate::I32(255)));
        assert_eq!(eval_cast(Immediate::I32(0x1234), &Type::U8), Ok(Immediate::U8(0x34)));
        assert_eq!(eval_cast(Immediate::I64(-1), &Type::Ptr), Ok(Immediate::Ptr(u64::MAX)));
    }

    #[test]
    fn float_casts() {
        assert_eq!(eval_cast(Immediate::f64(0.5), &Type::I32), Ok(Immediate::I32(0)));
        assert_eq!(eval_cast(Immediate::f64(1e20), &Type::I32), Ok(Immediate::I32(i32::MAX)));
        assert_eq!(eval_cast(Immediate::f64(-1.0), &Type::U8), Ok(Immediate::U8(0)));
        assert_eq!(eval_cast(Immediate::f64(f64::NAN), &Type::I64), Ok(Immediate::I64(0)));
        assert_eq!(eval_cast(Immediate::I32(3), &Type::F64), Ok(Immediate::f64(3.0)));
        assert_eq!(eval_cast(Immediate::f64(0.1), &Type::F32), Ok(Immediate::f32(0.1)));
    }

    #[test]
    fn void_target() {
        assert_eq!(eval_cast(Immediate::I32(1), &Type::Void), Err(ArithError::TypeMismatch));
    }
}
