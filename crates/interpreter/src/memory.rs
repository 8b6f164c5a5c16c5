//! Byte addressed little-endian memory for globals and stack slots.

use byteorder::{ByteOrder, LittleEndian};
use quill_ir::{interpret::EvalValue, Immediate, Type};

use crate::EvalError;

/// Addresses below this are never handed out, so a zero pointer is always
/// out of bounds.
const BASE: u64 = 8;
const ALIGN: usize = 8;

/// Linear memory. Globals are laid out first and live as long as the
/// memory; stack slots are released when the frame that allocated them
/// returns.
///
/// Every byte tracks whether it was written. Reading a byte that was never
/// written, or was last written with an undefined value, yields
/// [`EvalValue::Undef`].
#[derive(Debug, Clone, Default)]
pub struct Memory {
    bytes: Vec<u8>,
    init: Vec<bool>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current top of the memory. Passing it to [`Memory::release`] frees
    /// everything allocated after this call.
    pub fn mark(&self) -> usize {
        self.bytes.len()
    }

    pub fn release(&mut self, mark: usize) {
        self.bytes.truncate(mark);
        self.init.truncate(mark);
    }

    /// Allocates an uninitialized slot of `size` bytes and returns its
    /// address.
    pub fn alloc(&mut self, size: usize) -> u64 {
        let start = self.bytes.len().next_multiple_of(ALIGN);
        // Zero sized slots still get a distinct address.
        let end = start + size.max(1);
        self.bytes.resize(end, 0);
        self.init.resize(end, false);
        BASE + start as u64
    }

    /// Allocates a slot holding `data`, zero padded or truncated to `size`.
    pub fn alloc_init(&mut self, size: usize, data: Option<&[u8]>) -> u64 {
        let addr = self.alloc(size);
        let start = (addr - BASE) as usize;
        let data = data.unwrap_or_default();
        let len = data.len().min(size);
        self.bytes[start..start + len].copy_from_slice(&data[..len]);
        self.init[start..start + size].fill(true);
        addr
    }

    pub fn load(&self, addr: u64, ty: &Type) -> Result<EvalValue, EvalError> {
        let size = scalar_size(ty)?;
        let range = self.range(addr, size)?;
        if !self.init[range.clone()].iter().all(|&b| b) {
            return Ok(EvalValue::Undef);
        }

        let bytes = &self.bytes[range];
        let raw = LittleEndian::read_uint(bytes, size);
        let imm = match ty {
            Type::F32 => Immediate::F32(raw as u32),
            Type::F64 => Immediate::F64(raw),
            _ if ty.is_signed() => {
                let val = LittleEndian::read_int(bytes, size);
                Immediate::from_i128(val.into(), ty).ok_or(EvalError::Unsupported("load"))?
            }
            _ => Immediate::from_i128(raw.into(), ty).ok_or(EvalError::Unsupported("load"))?,
        };
        Ok(EvalValue::Imm(imm))
    }

    pub fn store(&mut self, addr: u64, value: EvalValue, ty: &Type) -> Result<(), EvalError> {
        let size = scalar_size(ty)?;
        let range = self.range(addr, size)?;

        let Some(imm) = value.as_imm() else {
            self.init[range].fill(false);
            return Ok(());
        };
        let raw = match imm {
            Immediate::F32(bits) => bits.into(),
            Immediate::F64(bits) => bits,
            _ => match imm.as_i128() {
                Some(val) => val as u64,
                None => return Err(EvalError::Unsupported("store")),
            },
        };

        // `write_uint` rejects values that don't fit, so cut to the width first.
        let raw = if size == 8 {
            raw
        } else {
            raw & ((1u64 << (size * 8)) - 1)
        };
        LittleEndian::write_uint(&mut self.bytes[range.clone()], raw, size);
        self.init[range].fill(true);
        Ok(())
    }

    fn range(&self, addr: u64, size: usize) -> Result<std::ops::Range<usize>, EvalError> {
        let oob = EvalError::OutOfBounds { addr, size };
        let start = addr.checked_sub(BASE).ok_or(oob.clone())?;
        let start = usize::try_from(start).map_err(|_| oob.clone())?;
        let end = start.checked_add(size).ok_or(oob.clone())?;
        if end > self.bytes.len() {
            return Err(oob);
        }
        Ok(start..end)
    }
}

fn scalar_size(ty: &Type) -> Result<usize, EvalError> {
    if ty.is_scalar() {
        Ok(ty.size_of())
    } else {
        Err(EvalError::Unsupported("memory access of a non-scalar type"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_layout() {
        let mut mem = Memory::new();
        let addr = mem.alloc(8);
        mem.store(addr, EvalValue::Imm(Immediate::I32(-2)), &Type::I32)
            .unwrap();
        assert_eq!(
            mem.load(addr, &Type::I32).unwrap(),
            EvalValue::Imm(Immediate::I32(-2))
        );
        assert_eq!(
            mem.load(addr, &Type::U16).unwrap(),
            EvalValue::Imm(Immediate::U16(0xfffe))
        );
        assert_eq!(
            mem.load(addr + 3, &Type::I8).unwrap(),
            EvalValue::Imm(Immediate::I8(-1))
        );
        // Bytes 4..8 were never written.
        assert_eq!(mem.load(addr, &Type::I64).unwrap(), EvalValue::Undef);
    }

    #[test]
    fn floats_keep_their_bits() {
        let mut mem = Memory::new();
        let addr = mem.alloc(8);
        let nan = Immediate::F64(0x7ff8_0000_0000_0001);
        mem.store(addr, EvalValue::Imm(nan), &Type::F64).unwrap();
        assert_eq!(mem.load(addr, &Type::F64).unwrap(), EvalValue::Imm(nan));
    }

    #[test]
    fn bounds() {
        let mut mem = Memory::new();
        assert!(matches!(
            mem.load(0, &Type::I8),
            Err(EvalError::OutOfBounds { addr: 0, size: 1 })
        ));

        let mark = mem.mark();
        let addr = mem.alloc(4);
        assert!(mem.load(addr + 1, &Type::I32).is_err());
        mem.release(mark);
        assert!(mem.store(addr, EvalValue::Imm(Immediate::I8(1)), &Type::I8).is_err());
    }

    #[test]
    fn initialized_slots() {
        let mut mem = Memory::new();
        let a = mem.alloc_init(4, Some(&[1, 0]));
        let b = mem.alloc_init(2, None);
        assert_eq!(
            mem.load(a, &Type::U32).unwrap(),
            EvalValue::Imm(Immediate::U32(1))
        );
        assert_eq!(
            mem.load(b, &Type::I16).unwrap(),
            EvalValue::Imm(Immediate::I16(0))
        );
        assert_eq!(b % ALIGN as u64, 0);

        mem.store(a, EvalValue::Undef, &Type::U8).unwrap();
        assert_eq!(mem.load(a, &Type::U32).unwrap(), EvalValue::Undef);
    }
}
