//! String encodings understood by the buffers

use crate::error::{PlcError, PlcResult};
use std::fmt;
use std::str::FromStr;

/// Character encoding used by `read_string` / `write_string`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StringEncoding {
    /// One byte per code unit
    #[default]
    Utf8,
    /// Two big-endian bytes per code unit
    Utf16,
}

impl StringEncoding {
    /// Width of one code unit in bits
    pub fn unit_bits(&self) -> u32 {
        match self {
            StringEncoding::Utf8 => 8,
            StringEncoding::Utf16 => 16,
        }
    }

    /// Encode `value` into raw bytes of this encoding
    pub fn encode(&self, value: &str) -> Vec<u8> {
        match self {
            StringEncoding::Utf8 => value.as_bytes().to_vec(),
            StringEncoding::Utf16 => value
                .encode_utf16()
                .flat_map(|unit| unit.to_be_bytes())
                .collect(),
        }
    }

    /// Decode raw bytes of this encoding, dropping trailing NUL characters
    pub fn decode(&self, bytes: &[u8]) -> PlcResult<String> {
        let mut decoded = match self {
            StringEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| PlcError::Parse(format!("Invalid UTF-8 string: {}", e)))?,
            StringEncoding::Utf16 => {
                if bytes.len() % 2 != 0 {
                    return Err(PlcError::Parse(format!(
                        "UTF-16 string has odd byte length {}",
                        bytes.len()
                    )));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units)
                    .map_err(|e| PlcError::Parse(format!("Invalid UTF-16 string: {}", e)))?
            }
        };
        let trimmed = decoded.trim_end_matches('\0').len();
        decoded.truncate(trimmed);
        Ok(decoded)
    }
}

impl FromStr for StringEncoding {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Ok(StringEncoding::Utf8),
            "UTF-16" | "UTF16" => Ok(StringEncoding::Utf16),
            _ => Err(PlcError::InvalidArgument(format!(
                "Unsupported string encoding: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for StringEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StringEncoding::Utf8 => f.write_str("UTF-8"),
            StringEncoding::Utf16 => f.write_str("UTF-16"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encoding_names() {
        assert_eq!("UTF-8".parse::<StringEncoding>().unwrap(), StringEncoding::Utf8);
        assert_eq!("utf-16".parse::<StringEncoding>().unwrap(), StringEncoding::Utf16);
        assert!("latin-1".parse::<StringEncoding>().is_err());
    }

    #[test]
    fn test_utf16_encode_decode() {
        let bytes = StringEncoding::Utf16.encode("Hi");
        assert_eq!(bytes, vec![0x00, 0x48, 0x00, 0x69]);
        assert_eq!(StringEncoding::Utf16.decode(&bytes).unwrap(), "Hi");
    }

    #[test]
    fn test_decode_strips_padding() {
        assert_eq!(StringEncoding::Utf8.decode(b"ab\0\0").unwrap(), "ab");
    }
}
