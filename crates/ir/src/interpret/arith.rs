use std::ops;

use super::ArithError;
use crate::{insn::BinaryOp, insn::UnaryOp, Immediate};

pub fn eval_unary(code: UnaryOp, arg: Immediate) -> Result<Immediate, ArithError> {
    match (code, arg) {
        (UnaryOp::Neg, Immediate::F32(bits)) => Ok(Immediate::f32(-f32::from_bits(bits))),
        (UnaryOp::Neg, Immediate::F64(bits)) => Ok(Immediate::f64(-f64::from_bits(bits))),
        (UnaryOp::Not, Immediate::F32(_) | Immediate::F64(_)) => Err(ArithError::TypeMismatch),
        _ => {
            let ty = arg.ty();
            let val = arg.as_i128().ok_or(ArithError::TypeMismatch)?;
            let val = match code {
                UnaryOp::Neg => val.wrapping_neg(),
                UnaryOp::Not => !val,
            };
            Immediate::from_i128(val, &ty).ok_or(ArithError::TypeMismatch)
        }
    }
}

pub fn eval_binary(code: BinaryOp, lhs: Immediate, rhs: Immediate) -> Result<Immediate, ArithError> {
    if lhs.ty() != rhs.ty() {
        return Err(ArithError::TypeMismatch);
    }

    match (lhs, rhs) {
        (Immediate::F32(l), Immediate::F32(r)) => {
            float_binary(code, f32::from_bits(l), f32::from_bits(r)).map(Immediate::f32)
        }
        (Immediate::F64(l), Immediate::F64(r)) => {
            float_binary(code, f64::from_bits(l), f64::from_bits(r)).map(Immediate::f64)
        }
        _ => int_binary(code, lhs, rhs),
    }
}

fn float_binary<F>(code: BinaryOp, lhs: F, rhs: F) -> Result<F, ArithError>
where
    F: ops::Add<Output = F>
        + ops::Sub<Output = F>
        + ops::Mul<Output = F>
        + ops::Div<Output = F>
        + ops::Rem<Output = F>,
{
    Ok(match code {
        BinaryOp::Add => lhs + rhs,
        BinaryOp::Sub => lhs - rhs,
        BinaryOp::Mul => lhs * rhs,
        BinaryOp::Div => lhs / rhs,
        BinaryOp::Rem => lhs % rhs,
        _ => return Err(ArithError::TypeMismatch),
    })
}

/// Operands are sign or zero extended to `i128` by their type, computed on
/// and truncated back.
fn int_binary(code: BinaryOp, lhs: Immediate, rhs: Immediate) -> Result<Immediate, ArithError> {
    let ty = lhs.ty();
    let bits = ty.bits().ok_or(ArithError::TypeMismatch)?;
    let (Some(l), Some(r)) = (lhs.as_i128(), rhs.as_i128()) else {
        return Err(ArithError::TypeMismatch);
    };

    let val = match code {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Sub => l.wrapping_sub(r),
        BinaryOp::Mul => l.wrapping_mul(r),
        BinaryOp::Div | BinaryOp::Rem if r == 0 => return Err(ArithError::DivisionByZero),
        BinaryOp::Div => l.wrapping_div(r),
        BinaryOp::Rem => l.wrapping_rem(r),
        BinaryOp::And => l & r,
        BinaryOp::Or => l | r,
        BinaryOp::Xor => l ^ r,
        BinaryOp::Shl => l.wrapping_shl(shift_amount(r, bits)),
        // Arithmetic for signed types since `l` is sign extended, logical
        // otherwise.
        BinaryOp::Shr => l >> shift_amount(r, bits),
    };

    Immediate::from_i128(val, &ty).ok_or(ArithError::TypeMismatch)
}

fn shift_amount(amount: i128, bits: u32) -> u32 {
    amount.rem_euclid(bits.into()) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(code: BinaryOp, lhs: impl Into<Immediate>, rhs: impl Into<Immediate>) -> Immediate {
        eval_binary(code, lhs.into(), rhs.into()).unwrap()
    }

    #[test]
    fn integers_wrap() {
        assert_eq!(bin(BinaryOp::Add, 3i32, 4i32), Immediate::I32(7));
        assert_eq!(bin(BinaryOp::Add, i8::MAX, 1i8), Immediate::I8(i8::MIN));
        assert_eq!(bin(BinaryOp::Sub, 0u8, 1u8), Immediate::U8(u8::MAX));
        assert_eq!(bin(BinaryOp::Mul, u64::MAX, u64::MAX), Immediate::U64(1));
        assert_eq!(bin(BinaryOp::Div, i32::MIN, -1i32), Immediate::I32(i32::MIN));
        assert_eq!(bin(BinaryOp::Rem, -7i32, 2i32), Immediate::I32(-1));
    }

    #[test]
    fn shifts() {
        assert_eq!(bin(BinaryOp::Shl, 1i32, 33i32), Immediate::I32(2));
        assert_eq!(bin(BinaryOp::Shr, -8i32, 1i32), Immediate::I32(-4));
        assert_eq!(bin(BinaryOp::Shr, 0xf0u8, 4u8), Immediate::U8(0x0f));
        assert_eq!(bin(BinaryOp::Shr, u64::MAX, 63u64), Immediate::U64(1));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(
            eval_binary(BinaryOp::Div, 5i32.into(), 0i32.into()),
            Err(ArithError::DivisionByZero)
        );
        assert_eq!(
            eval_binary(BinaryOp::Rem, 5u16.into(), 0u16.into()),
            Err(ArithError::DivisionByZero)
        );
        assert_eq!(bin(BinaryOp::Div, 1.0f64, 0.0f64), Immediate::f64(f64::INFINITY));
    }

    #[test]
    fn floats() {
        assert_eq!(bin(BinaryOp::Add, 0.5f32, 0.25f32), Immediate::f32(0.75));
        let nan = bin(BinaryOp::Sub, f64::INFINITY, f64::INFINITY);
        assert!(nan.as_f64().unwrap().is_nan());
        assert_eq!(
            eval_binary(BinaryOp::Xor, 1.0f64.into(), 1.0f64.into()),
            Err(ArithError::TypeMismatch)
        );
    }

    #[test]
    fn unary() {
        assert_eq!(eval_unary(UnaryOp::Neg, i32::MIN.into()), Ok(Immediate::I32(i32::MIN)));
        assert_eq!(eval_unary(UnaryOp::Not, 0u8.into()), Ok(Immediate::U8(0xff)));
        assert_eq!(eval_unary(UnaryOp::Neg, 0.0f64.into()), Ok(Immediate::f64(-0.0)));
        assert_eq!(
            eval_unary(UnaryOp::Not, 1.0f32.into()),
            Err(ArithError::TypeMismatch)
        );
    }

    #[test]
    fn mismatched_types() {
        assert_eq!(
            eval_binary(BinaryOp::Add, 1i32.into(), 1i64.into()),
            Err(ArithError::TypeMismatch)
        );
    }
}
