//! Shared bit helpers for the read and write buffers

use crate::error::{PlcError, PlcResult};

/// Mask with the lowest `num_bits` bits set
pub fn low_mask(num_bits: u32) -> u64 {
    if num_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << num_bits) - 1
    }
}

/// Sign-extend the lowest `num_bits` bits of `raw` to a full `i64`
pub fn sign_extend(raw: u64, num_bits: u8) -> i64 {
    let shift = 64 - num_bits as u32;
    ((raw << shift) as i64) >> shift
}

/// Validate a requested bit count against the native width of the target type
pub fn check_width(num_bits: u8, native_width: u8) -> PlcResult<()> {
    if num_bits == 0 || num_bits > native_width {
        return Err(PlcError::OutOfRange(format!(
            "{} bits requested for a {}-bit value",
            num_bits, native_width
        )));
    }
    Ok(())
}

/// Convert an `f32` into IEEE 754 half-precision bits
///
/// Values too large for half precision become infinity; values too small
/// become signed zero. Rounding is round-half-up on the dropped mantissa bits.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x007F_FFFF;

    if exponent == 0xFF {
        let nan_bit = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7C00 | nan_bit;
    }

    let unbiased = exponent - 127 + 15;
    if unbiased >= 0x1F {
        return sign | 0x7C00;
    }
    if unbiased <= 0 {
        if unbiased < -10 {
            return sign;
        }
        // Subnormal half: shift the full mantissa (with its implicit bit) down
        let full = mantissa | 0x0080_0000;
        let shift = (14 - unbiased) as u32;
        let half_mantissa = (full >> shift) + ((full >> (shift - 1)) & 1);
        return sign | half_mantissa as u16;
    }

    let half = sign | ((unbiased as u16) << 10) | ((mantissa >> 13) as u16);
    if mantissa & 0x1000 != 0 {
        // Carry may roll into the exponent, which is the correct rounding
        half + 1
    } else {
        half
    }
}

/// Convert IEEE 754 half-precision bits into an `f32`
pub fn f16_bits_to_f32(half: u16) -> f32 {
    let sign = ((half & 0x8000) as u32) << 16;
    let exponent = ((half >> 10) & 0x1F) as u32;
    let mantissa = (half & 0x03FF) as u32;

    let bits = match (exponent, mantissa) {
        (0, 0) => sign,
        (0, m) => {
            let mut e: i32 = -14;
            let mut m = m;
            while m & 0x0400 == 0 {
                m <<= 1;
                e -= 1;
            }
            m &= 0x03FF;
            sign | (((e + 127) as u32) << 23) | (m << 13)
        }
        (0x1F, m) => sign | 0x7F80_0000 | (m << 13),
        (e, m) => sign | ((e + 127 - 15) << 23) | (m << 13),
    };
    f32::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_mask() {
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(3), 0b111);
        assert_eq!(low_mask(64), u64::MAX);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b1111, 4), -1);
        assert_eq!(sign_extend(0b0111, 4), 7);
        assert_eq!(sign_extend(0x800, 12), -2048);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn test_half_precision_known_values() {
        assert_eq!(f32_to_f16_bits(1.0), 0x3C00);
        assert_eq!(f32_to_f16_bits(-2.0), 0xC000);
        assert_eq!(f32_to_f16_bits(0.5), 0x3800);
        assert_eq!(f32_to_f16_bits(65504.0), 0x7BFF);
        assert_eq!(f32_to_f16_bits(1.0e6), 0x7C00);
        assert_eq!(f16_bits_to_f32(0x3C00), 1.0);
        assert_eq!(f16_bits_to_f32(0xC000), -2.0);
        assert_eq!(f16_bits_to_f32(0x7BFF), 65504.0);
        assert!(f16_bits_to_f32(0x7C00).is_infinite());
        assert!(f16_bits_to_f32(0x7E00).is_nan());
    }

    #[test]
    fn test_half_precision_subnormal() {
        // Smallest positive subnormal half: 2^-24
        let tiny = 2.0f32.powi(-24);
        assert_eq!(f32_to_f16_bits(tiny), 0x0001);
        assert_eq!(f16_bits_to_f32(0x0001), tiny);
        assert_eq!(f16_bits_to_f32(0x0200), 2.0f32.powi(-15));
    }
}
