//! Value container exchanged between drivers and callers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Container holding a value written to or read from a PLC
///
/// Variants follow the IEC 61131-3 elementary types. Arrays and bit strings
/// are represented as `List`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlcValue {
    /// Boolean value
    Bool(bool),
    /// Signed 8-bit integer
    Sint(i8),
    /// Unsigned 8-bit integer
    Usint(u8),
    /// Signed 16-bit integer
    Int(i16),
    /// Unsigned 16-bit integer
    Uint(u16),
    /// Signed 32-bit integer
    Dint(i32),
    /// Unsigned 32-bit integer
    Udint(u32),
    /// Signed 64-bit integer
    Lint(i64),
    /// Unsigned 64-bit integer
    Ulint(u64),
    /// 32-bit float
    Real(f32),
    /// 64-bit float
    Lreal(f64),
    /// Single character
    Char(char),
    /// Character string
    String(String),
    /// Ordered list of values (arrays, bit strings)
    List(Vec<PlcValue>),
}

/// Type enumeration for PlcValue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlcValueType {
    Bool,
    Sint,
    Usint,
    Int,
    Uint,
    Dint,
    Udint,
    Lint,
    Ulint,
    Real,
    Lreal,
    Char,
    String,
    List,
}

impl PlcValueType {
    /// IEC 61131-3 type name
    pub fn name(&self) -> &'static str {
        match self {
            PlcValueType::Bool => "BOOL",
            PlcValueType::Sint => "SINT",
            PlcValueType::Usint => "USINT",
            PlcValueType::Int => "INT",
            PlcValueType::Uint => "UINT",
            PlcValueType::Dint => "DINT",
            PlcValueType::Udint => "UDINT",
            PlcValueType::Lint => "LINT",
            PlcValueType::Ulint => "ULINT",
            PlcValueType::Real => "REAL",
            PlcValueType::Lreal => "LREAL",
            PlcValueType::Char => "CHAR",
            PlcValueType::String => "STRING",
            PlcValueType::List => "LIST",
        }
    }

    /// Check if this type is a number type
    pub fn is_number(&self) -> bool {
        !matches!(
            self,
            PlcValueType::Bool | PlcValueType::Char | PlcValueType::String | PlcValueType::List
        )
    }
}

impl PlcValue {
    /// Get the type of this value
    pub fn value_type(&self) -> PlcValueType {
        match self {
            PlcValue::Bool(_) => PlcValueType::Bool,
            PlcValue::Sint(_) => PlcValueType::Sint,
            PlcValue::Usint(_) => PlcValueType::Usint,
            PlcValue::Int(_) => PlcValueType::Int,
            PlcValue::Uint(_) => PlcValueType::Uint,
            PlcValue::Dint(_) => PlcValueType::Dint,
            PlcValue::Udint(_) => PlcValueType::Udint,
            PlcValue::Lint(_) => PlcValueType::Lint,
            PlcValue::Ulint(_) => PlcValueType::Ulint,
            PlcValue::Real(_) => PlcValueType::Real,
            PlcValue::Lreal(_) => PlcValueType::Lreal,
            PlcValue::Char(_) => PlcValueType::Char,
            PlcValue::String(_) => PlcValueType::String,
            PlcValue::List(_) => PlcValueType::List,
        }
    }

    /// Expand an 8-bit word into a list of booleans, most significant bit first
    pub fn from_u8_bits(word: u8) -> Self {
        Self::bits_of(word as u64, 8)
    }

    /// Expand a 16-bit word into a list of booleans, most significant bit first
    pub fn from_u16_bits(word: u16) -> Self {
        Self::bits_of(word as u64, 16)
    }

    /// Expand a 32-bit word into a list of booleans, most significant bit first
    pub fn from_u32_bits(word: u32) -> Self {
        Self::bits_of(word as u64, 32)
    }

    /// Expand a 64-bit word into a list of booleans, most significant bit first
    pub fn from_u64_bits(word: u64) -> Self {
        Self::bits_of(word, 64)
    }

    fn bits_of(word: u64, width: u32) -> Self {
        PlcValue::List(
            (0..width)
                .rev()
                .map(|bit| PlcValue::Bool((word >> bit) & 1 == 1))
                .collect(),
        )
    }

    /// Get the value as a boolean, if it is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PlcValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Widen any integer variant to `i128`
    ///
    /// Floats, strings and lists return `None`.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            PlcValue::Bool(b) => Some(*b as i128),
            PlcValue::Sint(v) => Some(*v as i128),
            PlcValue::Usint(v) => Some(*v as i128),
            PlcValue::Int(v) => Some(*v as i128),
            PlcValue::Uint(v) => Some(*v as i128),
            PlcValue::Dint(v) => Some(*v as i128),
            PlcValue::Udint(v) => Some(*v as i128),
            PlcValue::Lint(v) => Some(*v as i128),
            PlcValue::Ulint(v) => Some(*v as i128),
            _ => None,
        }
    }

    /// Get any numeric variant as `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PlcValue::Real(v) => Some(*v as f64),
            PlcValue::Lreal(v) => Some(*v),
            other => other.as_integer().map(|v| v as f64),
        }
    }

    /// Get the value as a string slice, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PlcValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get list elements, treating a scalar as a one-element list
    pub fn elements(&self) -> Vec<&PlcValue> {
        match self {
            PlcValue::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }
}

impl fmt::Display for PlcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlcValue::Bool(v) => write!(f, "{}", v),
            PlcValue::Sint(v) => write!(f, "{}", v),
            PlcValue::Usint(v) => write!(f, "{}", v),
            PlcValue::Int(v) => write!(f, "{}", v),
            PlcValue::Uint(v) => write!(f, "{}", v),
            PlcValue::Dint(v) => write!(f, "{}", v),
            PlcValue::Udint(v) => write!(f, "{}", v),
            PlcValue::Lint(v) => write!(f, "{}", v),
            PlcValue::Ulint(v) => write!(f, "{}", v),
            PlcValue::Real(v) => write!(f, "{}", v),
            PlcValue::Lreal(v) => write!(f, "{}", v),
            PlcValue::Char(v) => write!(f, "{}", v),
            PlcValue::String(v) => write!(f, "{}", v),
            PlcValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_string_expansion() {
        let bits = PlcValue::from_u8_bits(0b1000_0001);
        let PlcValue::List(items) = bits else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 8);
        assert_eq!(items[0], PlcValue::Bool(true));
        assert_eq!(items[1], PlcValue::Bool(false));
        assert_eq!(items[7], PlcValue::Bool(true));
    }

    #[test]
    fn test_display_list() {
        let value = PlcValue::List(vec![PlcValue::Dint(-3), PlcValue::Bool(true)]);
        assert_eq!(value.to_string(), "[-3, true]");
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(PlcValue::Uint(65535).as_integer(), Some(65535));
        assert_eq!(PlcValue::Sint(-1).as_integer(), Some(-1));
        assert_eq!(PlcValue::Real(1.5).as_f64(), Some(1.5));
        assert_eq!(PlcValue::String("x".into()).as_integer(), None);
        assert!(PlcValueType::Lreal.is_number());
        assert!(!PlcValueType::String.is_number());
    }

    #[test]
    fn test_serde_round_trip() {
        let value = PlcValue::List(vec![PlcValue::Int(7), PlcValue::String("ab".into())]);
        let json = serde_json::to_string(&value).unwrap();
        let back: PlcValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
