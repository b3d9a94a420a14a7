//! Bit-level reader with bounded operations.

use crate::error::{BitError, BitResult};

/// A bit-level reader for decoding packed binary data.
///
/// All read operations are bounds-checked and return errors on failure.
/// The reader never panics on malformed input.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new `BitReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Returns the number of bits remaining to read.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.data
            .len()
            .saturating_mul(8)
            .saturating_sub(self.bit_pos)
    }

    /// Returns the number of whole bytes remaining to read.
    #[must_use]
    pub const fn bytes_remaining(&self) -> usize {
        self.bits_remaining() / 8
    }

    /// Returns `true` if there are no more bits to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Returns the current bit position.
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Reads a single bit as a boolean.
    pub fn read_bit(&mut self) -> BitResult<bool> {
        self.ensure_bits(1)?;
        let byte_idx = self.bit_pos / 8;
        let bit_idx = self.bit_pos % 8;
        let bit = (self.data[byte_idx] >> (7 - bit_idx)) & 1;
        self.bit_pos += 1;
        Ok(bit == 1)
    }

    /// Reads up to 64 bits as an unsigned integer.
    pub fn read_bits(&mut self, bits: u8) -> BitResult<u64> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(0);
        }
        self.ensure_bits(bits as usize)?;

        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Aligns to the next byte boundary.
    pub fn align_to_byte(&mut self) -> BitResult<()> {
        let rem = self.bit_pos % 8;
        if rem == 0 {
            return Ok(());
        }
        let skip = 8 - rem;
        self.ensure_bits(skip)?;
        self.bit_pos += skip;
        Ok(())
    }

    /// Reads a byte-aligned `u8`.
    pub fn read_u8(&mut self) -> BitResult<u8> {
        let [value] = self.read_array::<1>()?;
        Ok(value)
    }

    /// Reads a byte-aligned `u16` (little-endian).
    pub fn read_u16(&mut self) -> BitResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Reads a byte-aligned `u32` (little-endian).
    pub fn read_u32(&mut self) -> BitResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Reads a byte-aligned `u64` (little-endian).
    pub fn read_u64(&mut self) -> BitResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Reads a byte-aligned `i16` (little-endian).
    pub fn read_i16(&mut self) -> BitResult<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    /// Reads a byte-aligned `i32` (little-endian).
    pub fn read_i32(&mut self) -> BitResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Reads a byte-aligned `i64` (little-endian).
    pub fn read_i64(&mut self) -> BitResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Reads a byte-aligned `f32` (little-endian IEEE 754).
    pub fn read_f32(&mut self) -> BitResult<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Reads a byte-aligned `f64` (little-endian IEEE 754).
    pub fn read_f64(&mut self) -> BitResult<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Reads `len` raw bytes, borrowing them from the underlying buffer.
    pub fn read_bytes(&mut self, len: usize) -> BitResult<&'a [u8]> {
        self.ensure_aligned()?;
        self.ensure_bits(len.saturating_mul(8))?;
        let start = self.bit_pos / 8;
        let bytes = &self.data[start..start + len];
        self.bit_pos += len * 8;
        Ok(bytes)
    }

    /// Skips `len` bytes.
    pub fn skip_bytes(&mut self, len: usize) -> BitResult<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Reads a `u16` length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> BitResult<&'a str> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| BitError::InvalidUtf8)
    }

    fn ensure_aligned(&self) -> BitResult<()> {
        if self.bit_pos % 8 != 0 {
            return Err(BitError::MisalignedAccess {
                bit_position: self.bit_pos,
            });
        }
        Ok(())
    }

    fn ensure_bits(&self, bits: usize) -> BitResult<()> {
        let available = self.bits_remaining();
        if bits > available {
            return Err(BitError::UnexpectedEof {
                requested: bits,
                available,
            });
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> BitResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reader() {
        let reader = BitReader::new(&[]);
        assert!(reader.is_empty());
        assert_eq!(reader.bits_remaining(), 0);
        assert_eq!(reader.bit_position(), 0);
    }

    #[test]
    fn read_from_empty_fails() {
        let mut reader = BitReader::new(&[]);
        let result = reader.read_bit();
        assert!(matches!(result, Err(BitError::UnexpectedEof { .. })));
    }

    #[test]
    fn read_bits_across_bytes() {
        let mut reader = BitReader::new(&[0b1111_0000, 0b0000_1111]);
        assert_eq!(reader.read_bits(12).unwrap(), 0b1111_0000_0000);
        assert_eq!(reader.bits_remaining(), 4);
    }

    #[test]
    fn read_aligned_u32() {
        let mut reader = BitReader::new(&[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(reader.read_u32().unwrap(), 0x1234_5678);
        assert!(reader.is_empty());
    }

    #[test]
    fn read_misaligned_fails() {
        let mut reader = BitReader::new(&[0xFF, 0xFF]);
        reader.read_bits(1).unwrap();
        let err = reader.read_u8().unwrap_err();
        assert!(matches!(err, BitError::MisalignedAccess { .. }));
    }

    #[test]
    fn read_truncated_u64_does_not_advance() {
        let mut reader = BitReader::new(&[1, 2, 3]);
        let err = reader.read_u64().unwrap_err();
        assert!(matches!(
            err,
            BitError::UnexpectedEof {
                requested: 64,
                available: 24
            }
        ));
        assert_eq!(reader.bit_position(), 0);
    }

    #[test]
    fn read_bytes_borrows_slice() {
        let data = [1u8, 2, 3, 4];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bytes(3).unwrap(), &[1, 2, 3]);
        assert_eq!(reader.bytes_remaining(), 1);
        assert!(reader.skip_bytes(2).is_err());
        reader.skip_bytes(1).unwrap();
        assert!(reader.is_empty());
    }

    #[test]
    fn read_str_roundtrip_and_invalid_utf8() {
        let mut reader = BitReader::new(&[3, 0, b'a', b'b', b'c']);
        assert_eq!(reader.read_str().unwrap(), "abc");

        let mut bad = BitReader::new(&[1, 0, 0xFF]);
        assert_eq!(bad.read_str().unwrap_err(), BitError::InvalidUtf8);
    }

    #[test]
    fn read_signed_and_float() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-300i16).to_le_bytes());
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-0.25f64).to_le_bytes());
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_i16().unwrap(), -300);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.read_f64().unwrap(), -0.25);
    }
}
