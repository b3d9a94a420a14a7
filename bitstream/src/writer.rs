//! Bit-level writer for encoding packed binary data.

use crate::error::{BitError, BitResult};

/// Largest length a `u16` prefix can frame.
pub const MAX_U16_LEN: usize = u16::MAX as usize;

/// A growable writer for packed binary data.
///
/// Bits are packed MSB-first. Multi-byte values are little-endian and must be
/// written on a byte boundary. Call [`finish`](Self::finish) to get the final
/// byte buffer.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    /// The accumulated bytes.
    bytes: Vec<u8>,
    /// Current byte being written (not yet pushed to bytes).
    current_byte: u8,
    /// Number of bits written to `current_byte` (0-7).
    bit_count: u8,
}

impl BitWriter {
    /// Creates a new empty `BitWriter`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `BitWriter` with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub fn bits_written(&self) -> usize {
        self.bytes.len() * 8 + self.bit_count as usize
    }

    /// Returns the number of complete bytes written so far.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the cursor sits on a byte boundary.
    #[must_use]
    pub const fn is_aligned(&self) -> bool {
        self.bit_count == 0
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, value: bool) {
        self.current_byte = (self.current_byte << 1) | u8::from(value);
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.bytes.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// Writes up to 64 bits from an unsigned integer.
    pub fn write_bits(&mut self, value: u64, bits: u8) -> BitResult<()> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(());
        }
        if bits < 64 && value >= (1u64 << bits) {
            return Err(BitError::ValueOutOfRange { value, bits });
        }

        for i in (0..bits).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
        Ok(())
    }

    /// Pads the current byte with zero bits.
    pub fn align_to_byte(&mut self) {
        while !self.is_aligned() {
            self.write_bit(false);
        }
    }

    /// Writes a byte-aligned `u8`.
    pub fn write_u8(&mut self, value: u8) -> BitResult<()> {
        self.ensure_aligned()?;
        self.bytes.push(value);
        Ok(())
    }

    /// Writes a byte-aligned `u16` (little-endian).
    pub fn write_u16(&mut self, value: u16) -> BitResult<()> {
        self.write_aligned(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `u32` (little-endian).
    pub fn write_u32(&mut self, value: u32) -> BitResult<()> {
        self.write_aligned(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `u64` (little-endian).
    pub fn write_u64(&mut self, value: u64) -> BitResult<()> {
        self.write_aligned(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `i16` (little-endian).
    pub fn write_i16(&mut self, value: i16) -> BitResult<()> {
        self.write_aligned(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `i32` (little-endian).
    pub fn write_i32(&mut self, value: i32) -> BitResult<()> {
        self.write_aligned(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `i64` (little-endian).
    pub fn write_i64(&mut self, value: i64) -> BitResult<()> {
        self.write_aligned(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `f32` (little-endian IEEE 754).
    pub fn write_f32(&mut self, value: f32) -> BitResult<()> {
        self.write_aligned(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `f64` (little-endian IEEE 754).
    pub fn write_f64(&mut self, value: f64) -> BitResult<()> {
        self.write_aligned(&value.to_le_bytes())
    }

    /// Writes raw bytes without a length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> BitResult<()> {
        self.write_aligned(bytes)
    }

    /// Writes a string as `u16` byte length followed by UTF-8 bytes.
    pub fn write_str(&mut self, value: &str) -> BitResult<()> {
        let len = u16::try_from(value.len()).map_err(|_| BitError::LengthOverflow {
            length: value.len(),
            max: MAX_U16_LEN,
        })?;
        self.write_u16(len)?;
        self.write_aligned(value.as_bytes())
    }

    /// Overwrites a previously written `u16` at `offset`.
    ///
    /// Used to back-fill counts and lengths whose value is only known after
    /// the data they describe has been written.
    pub fn patch_u16(&mut self, offset: usize, value: u16) -> BitResult<()> {
        let end = offset.saturating_add(2);
        if end > self.bytes.len() {
            return Err(BitError::PatchOutOfBounds {
                offset,
                written: self.bytes.len(),
            });
        }
        self.bytes[offset..end].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Overwrites a previously written `u8` at `offset`.
    pub fn patch_u8(&mut self, offset: usize, value: u8) -> BitResult<()> {
        match self.bytes.get_mut(offset) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(BitError::PatchOutOfBounds {
                offset,
                written: self.bytes.len(),
            }),
        }
    }

    /// Returns the complete bytes written so far (excluding a partial byte).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Finishes writing and returns the byte buffer.
    ///
    /// If the last byte is incomplete, it is padded with zeros on the right.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.current_byte <<= 8 - self.bit_count;
            self.bytes.push(self.current_byte);
        }
        self.bytes
    }

    /// Finishes writing and appends to the provided buffer.
    pub fn finish_into(self, buf: &mut Vec<u8>) {
        let mut bytes = self.finish();
        buf.append(&mut bytes);
    }

    fn ensure_aligned(&self) -> BitResult<()> {
        if !self.is_aligned() {
            return Err(BitError::MisalignedAccess {
                bit_position: self.bits_written(),
            });
        }
        Ok(())
    }

    fn write_aligned(&mut self, bytes: &[u8]) -> BitResult<()> {
        self.ensure_aligned()?;
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }
}
