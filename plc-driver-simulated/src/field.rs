//! Simulated field addresses
//!
//! # Format
//!
//! ```text
//! [TYPE/]name:DATATYPE[[count]]
//!
//! RANDOM/temperature:REAL
//! STATE/setpoint:INTEGER[4]
//! STDOUT/message:STRING
//! ```

use crate::error::{PlcError, PlcResult};
use once_cell::sync::Lazy;
use plc_core::{PlcValue, PlcValueType};
use plc_runtime::PlcField;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::str::FromStr;

static ADDRESS_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<type>[A-Z]+)/)?(?P<name>[^/:\[\]]+):(?P<datatype>[A-Z]+)(?:\[(?P<count>\d+)\])?$")
        .ok()
});

/// Behaviour of a simulated field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulatedFieldType {
    /// Every read produces a fresh random value
    Random,
    /// Reads return the last value written under the same name
    State,
    /// Writes are logged
    Stdout,
}

impl SimulatedFieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulatedFieldType::Random => "RANDOM",
            SimulatedFieldType::State => "STATE",
            SimulatedFieldType::Stdout => "STDOUT",
        }
    }
}

impl FromStr for SimulatedFieldType {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RANDOM" => Ok(SimulatedFieldType::Random),
            "STATE" => Ok(SimulatedFieldType::State),
            "STDOUT" => Ok(SimulatedFieldType::Stdout),
            other => Err(PlcError::InvalidAddress(format!(
                "Unknown simulated field type {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SimulatedFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Datatype of a simulated field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulatedDatatype {
    Bool,
    Integer,
    Real,
    String,
}

impl SimulatedDatatype {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulatedDatatype::Bool => "BOOL",
            SimulatedDatatype::Integer => "INTEGER",
            SimulatedDatatype::Real => "REAL",
            SimulatedDatatype::String => "STRING",
        }
    }

    /// Check if a scalar value can be stored in a field of this datatype
    pub fn accepts(&self, value: &PlcValue) -> bool {
        let value_type = value.value_type();
        match self {
            SimulatedDatatype::Bool => value_type == PlcValueType::Bool,
            SimulatedDatatype::Integer => value.as_integer().is_some() && value_type != PlcValueType::Bool,
            SimulatedDatatype::Real => matches!(value_type, PlcValueType::Real | PlcValueType::Lreal),
            SimulatedDatatype::String => matches!(value_type, PlcValueType::String | PlcValueType::Char),
        }
    }
}

impl FromStr for SimulatedDatatype {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOL" => Ok(SimulatedDatatype::Bool),
            "INTEGER" => Ok(SimulatedDatatype::Integer),
            "REAL" => Ok(SimulatedDatatype::Real),
            "STRING" => Ok(SimulatedDatatype::String),
            other => Err(PlcError::InvalidAddress(format!(
                "Unknown simulated datatype {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SimulatedDatatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed simulated address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedField {
    pub field_type: SimulatedFieldType,
    pub name: String,
    pub datatype: SimulatedDatatype,
    pub num_elements: usize,
}

impl SimulatedField {
    /// Parse a simulated address string
    ///
    /// # Errors
    ///
    /// `PlcError::InvalidAddress` if the string does not match the format,
    /// names an unknown type or datatype, or asks for zero elements.
    pub fn parse(address: &str) -> PlcResult<Self> {
        let pattern = ADDRESS_PATTERN
            .as_ref()
            .ok_or_else(|| PlcError::internal("Simulated address pattern failed to compile"))?;
        let captures = pattern
            .captures(address)
            .ok_or_else(|| PlcError::InvalidAddress(address.to_string()))?;

        let field_type = match captures.name("type") {
            Some(m) => m.as_str().parse()?,
            None => SimulatedFieldType::Random,
        };
        let datatype = captures["datatype"].parse()?;
        let num_elements = match captures.name("count") {
            Some(m) => m
                .as_str()
                .parse::<usize>()
                .map_err(|_| PlcError::InvalidAddress(address.to_string()))?,
            None => 1,
        };
        if num_elements == 0 {
            return Err(PlcError::InvalidAddress(format!(
                "{}: element count must be positive",
                address
            )));
        }

        Ok(Self {
            field_type,
            name: captures["name"].to_string(),
            datatype,
            num_elements,
        })
    }

    /// Check if a value fits this field's datatype and element count
    pub fn accepts(&self, value: &PlcValue) -> bool {
        if self.num_elements == 1 {
            return self.datatype.accepts(value);
        }
        match value {
            PlcValue::List(items) => {
                items.len() == self.num_elements
                    && items.iter().all(|item| self.datatype.accepts(item))
            }
            _ => false,
        }
    }
}

impl FromStr for SimulatedField {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SimulatedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.field_type, self.name, self.datatype)?;
        if self.num_elements != 1 {
            write!(f, "[{}]", self.num_elements)?;
        }
        Ok(())
    }
}

impl PlcField for SimulatedField {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn num_elements(&self) -> usize {
        self.num_elements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_address() {
        let field = SimulatedField::parse("STATE/setpoint:INTEGER[4]").unwrap();
        assert_eq!(field.field_type, SimulatedFieldType::State);
        assert_eq!(field.name, "setpoint");
        assert_eq!(field.datatype, SimulatedDatatype::Integer);
        assert_eq!(field.num_elements, 4);
        assert_eq!(field.to_string(), "STATE/setpoint:INTEGER[4]");
    }

    #[test]
    fn test_type_defaults_to_random() {
        let field: SimulatedField = "temperature:REAL".parse().unwrap();
        assert_eq!(field.field_type, SimulatedFieldType::Random);
        assert_eq!(field.num_elements, 1);
    }

    #[test]
    fn test_invalid_addresses() {
        for address in [
            "",
            "RANDOM/x",
            "MAGIC/x:BOOL",
            "STATE/x:DOUBLE",
            "STATE/x:BOOL[0]",
            "STATE/x:BOOL[",
            "STATE/:BOOL",
        ] {
            assert!(
                matches!(SimulatedField::parse(address), Err(PlcError::InvalidAddress(_))),
                "{} should be rejected",
                address
            );
        }
    }

    #[test]
    fn test_accepts_values() {
        let scalar = SimulatedField::parse("STATE/x:INTEGER").unwrap();
        assert!(scalar.accepts(&PlcValue::Dint(3)));
        assert!(scalar.accepts(&PlcValue::Usint(3)));
        assert!(!scalar.accepts(&PlcValue::Bool(true)));
        assert!(!scalar.accepts(&PlcValue::Real(1.0)));

        let array = SimulatedField::parse("STATE/x:BOOL[2]").unwrap();
        assert!(array.accepts(&PlcValue::List(vec![PlcValue::Bool(true), PlcValue::Bool(false)])));
        assert!(!array.accepts(&PlcValue::List(vec![PlcValue::Bool(true)])));
        assert!(!array.accepts(&PlcValue::Bool(true)));
    }

    #[test]
    fn test_field_serializes() {
        let field = SimulatedField::parse("STDOUT/log:STRING").unwrap();
        let json = serde_json::to_string(&field).unwrap();
        let back: SimulatedField = serde_json::from_str(&json).unwrap();
        assert_eq!(back, field);
    }
}
