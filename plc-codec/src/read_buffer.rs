//! Bit-addressable read buffer

use crate::bits::{check_width, f16_bits_to_f32, low_mask, sign_extend};
use crate::encoding::StringEncoding;
use crate::error::{PlcError, PlcResult};
use bytes::Bytes;

/// Sequential bit reader over a received message
///
/// Mirror image of `WriteBuffer`: fields are read most significant bit
/// first, starting at any bit offset. A read that would run past the end
/// fails with `PlcError::OutOfRange` and leaves the cursor where it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBuffer {
    data: Bytes,
    byte_pos: usize,
    bit_pos: u8,
}

impl ReadBuffer {
    /// Wrap received bytes without copying
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Wrap a copy of `data`
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Total buffer length in bytes
    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }

    /// Current byte position
    pub fn get_pos(&self) -> usize {
        self.byte_pos
    }

    /// Current bit position within the current byte (0..=7)
    pub fn bit_offset(&self) -> u8 {
        self.bit_pos
    }

    /// Absolute cursor position in bits
    pub fn bit_position(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// Number of bits left to read
    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bit_position()
    }

    /// Check if at least `num_bits` more bits can be read
    pub fn has_more(&self, num_bits: usize) -> bool {
        self.remaining_bits() >= num_bits
    }

    /// Look at the byte `offset` bytes after the current byte position
    /// without moving the cursor
    pub fn peek_byte(&self, offset: usize) -> PlcResult<u8> {
        let out_of_range = || {
            PlcError::OutOfRange(format!(
                "Peek {} bytes past position {} exceeds buffer length {}",
                offset,
                self.byte_pos,
                self.data.len()
            ))
        };
        let index = self.byte_pos.checked_add(offset).ok_or_else(out_of_range)?;
        self.data.get(index).copied().ok_or_else(out_of_range)
    }

    /// Get the bytes in `start..end` (absolute byte positions)
    pub fn get_bytes(&self, start: usize, end: usize) -> PlcResult<&[u8]> {
        if end < start {
            return Err(PlcError::InvalidArgument(format!(
                "End position {} lies before start position {}",
                end, start
            )));
        }
        if end > self.data.len() {
            return Err(PlcError::OutOfRange(format!(
                "End position {} exceeds buffer length {}",
                end,
                self.data.len()
            )));
        }
        Ok(&self.data[start..end])
    }

    /// Read a single bit
    pub fn read_bit(&mut self) -> PlcResult<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Read one byte as a character (U+0000..=U+00FF)
    pub fn read_char(&mut self) -> PlcResult<char> {
        Ok(char::from(self.read_bits(8)? as u8))
    }

    /// Read a `num_bits` wide unsigned field
    pub fn read_unsigned_8(&mut self, num_bits: u8) -> PlcResult<u8> {
        check_width(num_bits, 8)?;
        Ok(self.read_bits(num_bits)? as u8)
    }

    /// Read a `num_bits` wide unsigned field
    pub fn read_unsigned_16(&mut self, num_bits: u8) -> PlcResult<u16> {
        check_width(num_bits, 16)?;
        Ok(self.read_bits(num_bits)? as u16)
    }

    /// Read a `num_bits` wide unsigned field
    pub fn read_unsigned_32(&mut self, num_bits: u8) -> PlcResult<u32> {
        check_width(num_bits, 32)?;
        Ok(self.read_bits(num_bits)? as u32)
    }

    /// Read a `num_bits` wide unsigned field
    pub fn read_unsigned_64(&mut self, num_bits: u8) -> PlcResult<u64> {
        check_width(num_bits, 64)?;
        self.read_bits(num_bits)
    }

    /// Read a `num_bits` wide two's-complement field, sign-extended
    pub fn read_signed_8(&mut self, num_bits: u8) -> PlcResult<i8> {
        check_width(num_bits, 8)?;
        Ok(sign_extend(self.read_bits(num_bits)?, num_bits) as i8)
    }

    /// Read a `num_bits` wide two's-complement field, sign-extended
    pub fn read_signed_16(&mut self, num_bits: u8) -> PlcResult<i16> {
        check_width(num_bits, 16)?;
        Ok(sign_extend(self.read_bits(num_bits)?, num_bits) as i16)
    }

    /// Read a `num_bits` wide two's-complement field, sign-extended
    pub fn read_signed_32(&mut self, num_bits: u8) -> PlcResult<i32> {
        check_width(num_bits, 32)?;
        Ok(sign_extend(self.read_bits(num_bits)?, num_bits) as i32)
    }

    /// Read a `num_bits` wide two's-complement field, sign-extended
    pub fn read_signed_64(&mut self, num_bits: u8) -> PlcResult<i64> {
        check_width(num_bits, 64)?;
        Ok(sign_extend(self.read_bits(num_bits)?, num_bits))
    }

    /// Read an IEEE 754 float of 16 (half) or 32 (single) bits
    pub fn read_float(&mut self, num_bits: u8) -> PlcResult<f32> {
        match num_bits {
            16 => Ok(f16_bits_to_f32(self.read_bits(16)? as u16)),
            32 => Ok(f32::from_bits(self.read_bits(32)? as u32)),
            _ => Err(PlcError::InvalidArgument(format!(
                "Floats can only be read with 16 or 32 bits, not {}",
                num_bits
            ))),
        }
    }

    /// Read an IEEE 754 double of 32 (widened from single) or 64 bits
    pub fn read_double(&mut self, num_bits: u8) -> PlcResult<f64> {
        match num_bits {
            32 => Ok(f32::from_bits(self.read_bits(32)? as u32) as f64),
            64 => Ok(f64::from_bits(self.read_bits(64)?)),
            _ => Err(PlcError::InvalidArgument(format!(
                "Doubles can only be read with 32 or 64 bits, not {}",
                num_bits
            ))),
        }
    }

    /// Read `num_bits / 8` bytes and decode them under `encoding`
    ///
    /// Trailing NUL padding is dropped. If decoding fails the cursor is
    /// restored to where it was before the call.
    pub fn read_string(&mut self, num_bits: u32, encoding: StringEncoding) -> PlcResult<String> {
        if num_bits % encoding.unit_bits() != 0 {
            return Err(PlcError::InvalidArgument(format!(
                "{} bits is not a whole number of {} code units",
                num_bits, encoding
            )));
        }
        let saved = (self.byte_pos, self.bit_pos);
        let raw = self.read_bytes((num_bits / 8) as usize)?;
        encoding.decode(&raw).inspect_err(|_| {
            (self.byte_pos, self.bit_pos) = saved;
        })
    }

    /// Read `count` raw bytes at the current (possibly unaligned) position
    pub fn read_bytes(&mut self, count: usize) -> PlcResult<Vec<u8>> {
        self.ensure_available(count * 8)?;
        if self.bit_pos == 0 {
            let start = self.byte_pos;
            self.byte_pos += count;
            return Ok(self.data[start..start + count].to_vec());
        }
        let mut bytes = Vec::with_capacity(count);
        for _ in 0..count {
            bytes.push(self.read_bits(8)? as u8);
        }
        Ok(bytes)
    }

    fn ensure_available(&self, num_bits: usize) -> PlcResult<()> {
        if !self.has_more(num_bits) {
            return Err(PlcError::OutOfRange(format!(
                "Reading {} bits at bit {} exceeds buffer of {} bytes",
                num_bits,
                self.bit_position(),
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Read `num_bits` (1..=64) bits into the low end of a `u64`
    fn read_bits(&mut self, num_bits: u8) -> PlcResult<u64> {
        self.ensure_available(num_bits as usize)?;

        let mut result = 0u64;
        let mut remaining = num_bits as u32;
        while remaining > 0 {
            let free = 8 - self.bit_pos as u32;
            let take = remaining.min(free);
            let shift = free - take;
            let chunk = (self.data[self.byte_pos] as u64 >> shift) & low_mask(take);
            result = (result << take) | chunk;

            let total = self.bit_pos as u32 + take;
            self.byte_pos += (total / 8) as usize;
            self.bit_pos = (total % 8) as u8;
            remaining -= take;
        }
        Ok(result)
    }
}

impl From<Vec<u8>> for ReadBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_msb_first() {
        let mut buffer = ReadBuffer::from_slice(&[0b1010_0001]);
        assert!(buffer.read_bit().unwrap());
        assert!(!buffer.read_bit().unwrap());
        assert_eq!(buffer.read_unsigned_8(6).unwrap(), 0b10_0001);
        assert!(!buffer.has_more(1));
    }

    #[test]
    fn test_read_nibbles() {
        let mut buffer = ReadBuffer::from_slice(&[0xA5]);
        assert_eq!(buffer.read_unsigned_8(4).unwrap(), 0xA);
        assert_eq!(buffer.read_unsigned_8(4).unwrap(), 0x5);
    }

    #[test]
    fn test_read_straddling_field() {
        let mut buffer = ReadBuffer::from_slice(&[0b1010_1111, 0b0011_0000]);
        assert_eq!(buffer.read_unsigned_8(5).unwrap(), 0b10101);
        assert_eq!(buffer.read_unsigned_8(7).unwrap(), 0b111_0011);
        assert_eq!((buffer.get_pos(), buffer.bit_offset()), (1, 4));
    }

    #[test]
    fn test_read_big_endian_words() {
        let mut buffer = ReadBuffer::from_slice(&[0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(buffer.read_unsigned_16(16).unwrap(), 0x1234);
        assert_eq!(buffer.read_unsigned_32(32).unwrap(), 0xDEADBEEF);
    }

    #[test]
    fn test_sign_extension() {
        let mut buffer = ReadBuffer::from_slice(&[0xFF, 0xF0]);
        assert_eq!(buffer.read_signed_16(12).unwrap(), -1);

        let mut buffer = ReadBuffer::from_slice(&[0b0111_1000]);
        assert_eq!(buffer.read_signed_8(4).unwrap(), 7);
        assert_eq!(buffer.read_signed_8(4).unwrap(), -8);
    }

    #[test]
    fn test_out_of_range_keeps_cursor() {
        let mut buffer = ReadBuffer::from_slice(&[0xFF, 0x00]);
        buffer.read_unsigned_8(5).unwrap();
        let result = buffer.read_unsigned_16(12);
        assert!(matches!(result, Err(PlcError::OutOfRange(_))));
        assert_eq!((buffer.get_pos(), buffer.bit_offset()), (0, 5));
        assert_eq!(buffer.read_unsigned_16(11).unwrap(), 0b111_0000_0000);
    }

    #[test]
    fn test_invalid_width() {
        let mut buffer = ReadBuffer::from_slice(&[0; 8]);
        assert!(matches!(
            buffer.read_unsigned_32(33),
            Err(PlcError::OutOfRange(_))
        ));
        assert!(matches!(
            buffer.read_double(16),
            Err(PlcError::InvalidArgument(_))
        ));
        assert_eq!(buffer.bit_position(), 0);
    }

    #[test]
    fn test_read_floats() {
        let mut buffer = ReadBuffer::from_slice(&[
            0x3F, 0x80, 0x00, 0x00, 0x3C, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]);
        assert_eq!(buffer.read_float(32).unwrap(), 1.0);
        assert_eq!(buffer.read_float(16).unwrap(), 1.0);
        assert_eq!(buffer.read_double(64).unwrap(), 2.0);
    }

    #[test]
    fn test_read_string_strips_padding() {
        let mut buffer = ReadBuffer::from_slice(b"ab\0\0cd");
        assert_eq!(buffer.read_string(32, StringEncoding::Utf8).unwrap(), "ab");
        assert_eq!(buffer.read_string(16, StringEncoding::Utf8).unwrap(), "cd");
    }

    #[test]
    fn test_read_string_failure_restores_cursor() {
        let mut buffer = ReadBuffer::from_slice(&[0x41, 0xFF, 0xFE]);
        buffer.read_char().unwrap();
        assert!(buffer.read_string(16, StringEncoding::Utf8).is_err());
        assert_eq!(buffer.get_pos(), 1);
        assert!(buffer.read_string(24, StringEncoding::Utf8).is_err());
        assert_eq!(buffer.get_pos(), 1);
    }

    #[test]
    fn test_peek_and_slices() {
        let mut buffer = ReadBuffer::from_slice(&[1, 2, 3, 4]);
        buffer.read_unsigned_8(8).unwrap();
        assert_eq!(buffer.peek_byte(0).unwrap(), 2);
        assert_eq!(buffer.peek_byte(2).unwrap(), 4);
        assert!(buffer.peek_byte(3).is_err());
        assert_eq!(buffer.get_bytes(1, 3).unwrap(), &[2, 3]);
        assert!(buffer.get_bytes(3, 5).is_err());
        assert_eq!(buffer.get_pos(), 1);
    }

    #[test]
    fn test_peek_far_past_the_end() {
        let mut buffer = ReadBuffer::from_slice(&[1, 2]);
        buffer.read_unsigned_8(8).unwrap();
        assert!(matches!(buffer.peek_byte(usize::MAX), Err(PlcError::OutOfRange(_))));
        assert_eq!(buffer.peek_byte(0).unwrap(), 2);
    }

    #[test]
    fn test_read_unaligned_bytes() {
        let mut buffer = ReadBuffer::from_slice(&[0x0F, 0xF0, 0x0F]);
        buffer.read_unsigned_8(4).unwrap();
        assert_eq!(buffer.read_bytes(2).unwrap(), vec![0xFF, 0x00]);
        assert_eq!(buffer.remaining_bits(), 4);
    }
}
