//! Bit-addressable write buffer

use crate::bits::{check_width, f32_to_f16_bits, low_mask};
use crate::encoding::StringEncoding;
use crate::error::{PlcError, PlcResult};
use bytes::Bytes;

/// Sequential bit writer over a fixed-size, zero-initialized byte array
///
/// Bits are written most significant bit first. A field may start at any
/// bit offset and may straddle byte boundaries; bits of the partially filled
/// head and tail bytes that lie outside the field are preserved.
///
/// # Invariant
/// `byte_pos * 8 + bit_pos <= data.len() * 8` at all times. Operations that
/// would break it fail with `PlcError::OutOfRange` before anything changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBuffer {
    data: Vec<u8>,
    byte_pos: usize,
    bit_pos: u8,
}

impl WriteBuffer {
    /// Create a zero-initialized buffer of `length` bytes
    ///
    /// # Errors
    /// Returns `PlcError::NoMemory` if the allocation cannot be satisfied.
    pub fn new(length: usize) -> PlcResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(length)
            .map_err(|_| PlcError::NoMemory(length))?;
        data.resize(length, 0);
        Ok(Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        })
    }

    /// Total buffer length in bytes
    pub fn length(&self) -> usize {
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

    /// Number of bits that can still be written
    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bit_position()
    }

    /// Check if `num_bits` more bits fit into the buffer
    pub fn has_more(&self, num_bits: usize) -> bool {
        self.remaining_bits() >= num_bits
    }

    /// The whole underlying byte array
    pub fn data(&self) -> &[u8] {
        &self.data
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

    /// Consume the buffer, handing its bytes off
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.data)
    }

    /// Write a single bit
    pub fn write_bit(&mut self, value: bool) -> PlcResult<()> {
        self.write_bits(1, value as u64)
    }

    /// Write a character as one byte
    ///
    /// Only characters in the range U+0000..=U+00FF fit into one byte.
    pub fn write_char(&mut self, value: char) -> PlcResult<()> {
        let code = value as u32;
        if code > 0xFF {
            return Err(PlcError::InvalidArgument(format!(
                "Character {:?} does not fit into a single byte",
                value
            )));
        }
        self.write_bits(8, code as u64)
    }

    /// Write the lowest `num_bits` bits of `value`
    pub fn write_unsigned_8(&mut self, num_bits: u8, value: u8) -> PlcResult<()> {
        check_width(num_bits, 8)?;
        self.write_bits(num_bits, value as u64)
    }

    /// Write the lowest `num_bits` bits of `value`
    pub fn write_unsigned_16(&mut self, num_bits: u8, value: u16) -> PlcResult<()> {
        check_width(num_bits, 16)?;
        self.write_bits(num_bits, value as u64)
    }

    /// Write the lowest `num_bits` bits of `value`
    pub fn write_unsigned_32(&mut self, num_bits: u8, value: u32) -> PlcResult<()> {
        check_width(num_bits, 32)?;
        self.write_bits(num_bits, value as u64)
    }

    /// Write the lowest `num_bits` bits of `value`
    pub fn write_unsigned_64(&mut self, num_bits: u8, value: u64) -> PlcResult<()> {
        check_width(num_bits, 64)?;
        self.write_bits(num_bits, value)
    }

    /// Write `value` as a `num_bits` wide two's-complement field
    ///
    /// The value is sign-extended before truncation, so every bit above the
    /// field's sign bit that ends up in the partial top byte carries the sign.
    pub fn write_signed_8(&mut self, num_bits: u8, value: i8) -> PlcResult<()> {
        check_width(num_bits, 8)?;
        self.write_bits(num_bits, value as i64 as u64)
    }

    /// Write `value` as a `num_bits` wide two's-complement field
    pub fn write_signed_16(&mut self, num_bits: u8, value: i16) -> PlcResult<()> {
        check_width(num_bits, 16)?;
        self.write_bits(num_bits, value as i64 as u64)
    }

    /// Write `value` as a `num_bits` wide two's-complement field
    pub fn write_signed_32(&mut self, num_bits: u8, value: i32) -> PlcResult<()> {
        check_width(num_bits, 32)?;
        self.write_bits(num_bits, value as i64 as u64)
    }

    /// Write `value` as a `num_bits` wide two's-complement field
    pub fn write_signed_64(&mut self, num_bits: u8, value: i64) -> PlcResult<()> {
        check_width(num_bits, 64)?;
        self.write_bits(num_bits, value as u64)
    }

    /// Write an IEEE 754 float of 16 (half) or 32 (single) bits
    pub fn write_float(&mut self, num_bits: u8, value: f32) -> PlcResult<()> {
        match num_bits {
            16 => self.write_bits(16, f32_to_f16_bits(value) as u64),
            32 => self.write_bits(32, value.to_bits() as u64),
            _ => Err(PlcError::InvalidArgument(format!(
                "Floats can only be written with 16 or 32 bits, not {}",
                num_bits
            ))),
        }
    }

    /// Write an IEEE 754 double of 32 (narrowed to single) or 64 bits
    pub fn write_double(&mut self, num_bits: u8, value: f64) -> PlcResult<()> {
        match num_bits {
            32 => self.write_bits(32, (value as f32).to_bits() as u64),
            64 => self.write_bits(64, value.to_bits()),
            _ => Err(PlcError::InvalidArgument(format!(
                "Doubles can only be written with 32 or 64 bits, not {}",
                num_bits
            ))),
        }
    }

    /// Write `value` as exactly `num_bits / 8` bytes in `encoding`
    ///
    /// Shorter strings are padded with NUL bytes, longer ones are truncated.
    pub fn write_string(
        &mut self,
        num_bits: u32,
        encoding: StringEncoding,
        value: &str,
    ) -> PlcResult<()> {
        if num_bits % encoding.unit_bits() != 0 {
            return Err(PlcError::InvalidArgument(format!(
                "{} bits is not a whole number of {} code units",
                num_bits, encoding
            )));
        }
        let num_bytes = (num_bits / 8) as usize;
        self.ensure_space(num_bits as usize)?;

        let mut encoded = encoding.encode(value);
        encoded.resize(num_bytes, 0);
        for byte in encoded {
            self.write_bits(8, byte as u64)?;
        }
        Ok(())
    }

    /// Write raw bytes at the current (possibly unaligned) position
    pub fn write_bytes(&mut self, bytes: &[u8]) -> PlcResult<()> {
        self.ensure_space(bytes.len() * 8)?;
        for byte in bytes {
            self.write_bits(8, *byte as u64)?;
        }
        Ok(())
    }

    fn ensure_space(&self, num_bits: usize) -> PlcResult<()> {
        if !self.has_more(num_bits) {
            return Err(PlcError::OutOfRange(format!(
                "Writing {} bits at bit {} exceeds buffer of {} bytes",
                num_bits,
                self.bit_position(),
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Write the lowest `num_bits` (1..=64) bits of `value`
    ///
    /// Splits the field into a head chunk filling the current partial byte,
    /// whole middle bytes, and a tail chunk. Each chunk is merged into its
    /// byte with a mask so neighbouring bits are kept.
    fn write_bits(&mut self, num_bits: u8, value: u64) -> PlcResult<()> {
        self.ensure_space(num_bits as usize)?;

        let mut remaining = num_bits as u32;
        while remaining > 0 {
            let free = 8 - self.bit_pos as u32;
            let take = remaining.min(free);
            let chunk = ((value >> (remaining - take)) & low_mask(take)) as u8;
            let shift = free - take;
            let field_mask = (low_mask(take) as u8) << shift;

            let byte = &mut self.data[self.byte_pos];
            *byte = (*byte & !field_mask) | (chunk << shift);

            self.advance(take);
            remaining -= take;
        }
        Ok(())
    }

    fn advance(&mut self, num_bits: u32) {
        let total = self.bit_pos as u32 + num_bits;
        self.byte_pos += (total / 8) as usize;
        self.bit_pos = (total % 8) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_buffer::ReadBuffer;

    #[test]
    fn test_new_is_zeroed() {
        let buffer = WriteBuffer::new(4).unwrap();
        assert_eq!(buffer.data(), &[0, 0, 0, 0]);
        assert_eq!(buffer.get_pos(), 0);
        assert_eq!(buffer.remaining_bits(), 32);
    }

    #[test]
    fn test_write_bits_low_bit_last() {
        let mut buffer = WriteBuffer::new(1).unwrap();
        for _ in 0..7 {
            buffer.write_bit(false).unwrap();
        }
        buffer.write_bit(true).unwrap();
        assert_eq!(buffer.data(), &[0x01]);
        assert_eq!(buffer.get_pos(), 1);
        assert_eq!(buffer.bit_offset(), 0);
    }

    #[test]
    fn test_write_bit_cursor_progress() {
        let mut buffer = WriteBuffer::new(2).unwrap();
        buffer.write_bit(true).unwrap();
        assert_eq!((buffer.get_pos(), buffer.bit_offset()), (0, 1));
        buffer.write_bit(false).unwrap();
        buffer.write_bit(true).unwrap();
        assert_eq!((buffer.get_pos(), buffer.bit_offset()), (0, 3));
        assert_eq!(buffer.data()[0], 0b1010_0000);
    }

    #[test]
    fn test_two_nibbles_share_a_byte() {
        let mut buffer = WriteBuffer::new(1).unwrap();
        buffer.write_unsigned_8(4, 0xA).unwrap();
        buffer.write_unsigned_8(4, 0x5).unwrap();
        assert_eq!(buffer.data(), &[(0xA << 4) | 0x5]);
    }

    #[test]
    fn test_seven_bits_straddle_from_offset_five() {
        let mut buffer = WriteBuffer::new(2).unwrap();
        buffer.write_unsigned_8(5, 0b10101).unwrap();
        buffer.write_unsigned_8(7, 0b111_0011).unwrap();
        // 10101 111 | 0011 0000
        assert_eq!(buffer.data(), &[0b1010_1111, 0b0011_0000]);
        assert_eq!((buffer.get_pos(), buffer.bit_offset()), (1, 4));
    }

    #[test]
    fn test_merge_keeps_neighbour_bits() {
        let mut buffer = WriteBuffer::new(2).unwrap();
        buffer.write_unsigned_16(16, 0xFFFF).unwrap();
        let mut rewrite = WriteBuffer {
            data: buffer.data().to_vec(),
            byte_pos: 0,
            bit_pos: 3,
        };
        rewrite.write_unsigned_8(6, 0).unwrap();
        // Bits 3..9 cleared, everything else kept
        assert_eq!(rewrite.data(), &[0b1110_0000, 0b0111_1111]);
    }

    #[test]
    fn test_write_multi_byte_big_endian() {
        let mut buffer = WriteBuffer::new(8).unwrap();
        buffer.write_unsigned_16(16, 0x1234).unwrap();
        buffer.write_unsigned_32(32, 0xDEADBEEF).unwrap();
        buffer.write_unsigned_16(12, 0xABC).unwrap();
        assert_eq!(
            buffer.data(),
            &[0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF, 0xAB, 0xC0]
        );
        assert_eq!((buffer.get_pos(), buffer.bit_offset()), (7, 4));
    }

    #[test]
    fn test_signed_fills_sign_bits() {
        let mut buffer = WriteBuffer::new(2).unwrap();
        buffer.write_signed_16(12, -1).unwrap();
        assert_eq!(buffer.data(), &[0xFF, 0xF0]);

        let mut buffer = WriteBuffer::new(1).unwrap();
        buffer.write_signed_8(4, -2).unwrap();
        assert_eq!(buffer.data(), &[0b1110_0000]);
    }

    #[test]
    fn test_out_of_range_leaves_buffer_unchanged() {
        let mut buffer = WriteBuffer::new(2).unwrap();
        buffer.write_unsigned_8(5, 0b10101).unwrap();
        let before = buffer.clone();

        let result = buffer.write_unsigned_16(12, 0xFFF);
        assert!(matches!(result, Err(PlcError::OutOfRange(_))));
        assert_eq!(buffer, before);

        let result = buffer.write_string(16, StringEncoding::Utf8, "ab");
        assert!(matches!(result, Err(PlcError::OutOfRange(_))));
        assert_eq!(buffer, before);
    }

    #[test]
    fn test_invalid_width_rejected() {
        let mut buffer = WriteBuffer::new(4).unwrap();
        assert!(buffer.write_unsigned_8(9, 0).is_err());
        assert!(buffer.write_unsigned_16(0, 0).is_err());
        assert!(buffer.write_float(64, 1.0).is_err());
        assert_eq!(buffer.bit_position(), 0);
    }

    #[test]
    fn test_float_and_double_bit_patterns() {
        let mut buffer = WriteBuffer::new(14).unwrap();
        buffer.write_float(32, 1.0).unwrap();
        buffer.write_float(16, -2.0).unwrap();
        buffer.write_double(64, 1.0).unwrap();
        assert_eq!(
            buffer.data(),
            &[
                0x3F, 0x80, 0x00, 0x00, 0xC0, 0x00, 0x3F, 0xF0, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00
            ]
        );
    }

    #[test]
    fn test_write_string_pads_and_truncates() {
        let mut buffer = WriteBuffer::new(6).unwrap();
        buffer.write_string(32, StringEncoding::Utf8, "ab").unwrap();
        buffer.write_string(16, StringEncoding::Utf8, "xyz").unwrap();
        assert_eq!(buffer.data(), b"ab\0\0xy");
    }

    #[test]
    fn test_write_char() {
        let mut buffer = WriteBuffer::new(1).unwrap();
        assert!(buffer.write_char('€').is_err());
        buffer.write_char('A').unwrap();
        assert_eq!(buffer.data(), b"A");
    }

    #[test]
    fn test_unsigned_round_trip_every_width() {
        for num_bits in 1..=64u8 {
            let max = low_mask(num_bits as u32);
            for value in [0, 1, max / 3, max] {
                let mut buffer = WriteBuffer::new(9).unwrap();
                // Start off-aligned to exercise the head/tail split
                buffer.write_unsigned_8(3, 0b101).unwrap();
                buffer.write_unsigned_64(num_bits, value).unwrap();

                let mut reader = ReadBuffer::new(buffer.into_bytes());
                assert_eq!(reader.read_unsigned_8(3).unwrap(), 0b101);
                assert_eq!(
                    reader.read_unsigned_64(num_bits).unwrap(),
                    value,
                    "{} bits",
                    num_bits
                );
            }
        }
    }

    #[test]
    fn test_signed_round_trip_every_width() {
        for num_bits in 1..=64u8 {
            let min = if num_bits == 64 { i64::MIN } else { -(1i64 << (num_bits - 1)) };
            let max = if num_bits == 64 { i64::MAX } else { (1i64 << (num_bits - 1)) - 1 };
            for value in [min, -1, 0, max] {
                if value < min || value > max {
                    continue;
                }
                let mut buffer = WriteBuffer::new(9).unwrap();
                buffer.write_bit(true).unwrap();
                buffer.write_signed_64(num_bits, value).unwrap();

                let mut reader = ReadBuffer::new(buffer.into_bytes());
                assert!(reader.read_bit().unwrap());
                assert_eq!(
                    reader.read_signed_64(num_bits).unwrap(),
                    value,
                    "{} bits",
                    num_bits
                );
            }
        }
    }
}
