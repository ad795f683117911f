//! Modbus field addresses
//!
//! # Format
//!
//! ```text
//! <area>:<address>[:<TYPE>][[<count>]]
//!
//! coil:1
//! discrete-input:17[8]
//! holding-register:100:REAL
//! input-register:1:INT[10]
//! ```
//!
//! Addresses are 1-based as printed in device manuals; the wire carries
//! `address - 1`. Bit areas only hold `BOOL`; register areas default to
//! `INT`.

use crate::error::{PlcError, PlcResult};
use once_cell::sync::Lazy;
use plc_runtime::PlcField;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::str::FromStr;

static ADDRESS_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^(?P<area>[a-z-]+):(?P<address>\d+)(?::(?P<type>[A-Z]+))?(?:\[(?P<count>\d+)\])?$",
    )
    .ok()
});

/// Most coils or discrete inputs one read may cover
pub const MAX_READ_BITS: usize = 2000;
/// Most registers one read may cover
pub const MAX_READ_REGISTERS: usize = 125;
/// Most coils one write may cover
pub const MAX_WRITE_BITS: usize = 1968;
/// Most registers one write may cover
pub const MAX_WRITE_REGISTERS: usize = 123;

/// Modbus data model table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModbusArea {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

impl ModbusArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModbusArea::Coil => "coil",
            ModbusArea::DiscreteInput => "discrete-input",
            ModbusArea::HoldingRegister => "holding-register",
            ModbusArea::InputRegister => "input-register",
        }
    }

    /// Check if the area holds single bits rather than 16-bit registers
    pub fn is_bit_area(&self) -> bool {
        matches!(self, ModbusArea::Coil | ModbusArea::DiscreteInput)
    }

    /// Check if the area accepts writes
    pub fn is_writable(&self) -> bool {
        matches!(self, ModbusArea::Coil | ModbusArea::HoldingRegister)
    }
}

impl FromStr for ModbusArea {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coil" => Ok(ModbusArea::Coil),
            "discrete-input" => Ok(ModbusArea::DiscreteInput),
            "holding-register" => Ok(ModbusArea::HoldingRegister),
            "input-register" => Ok(ModbusArea::InputRegister),
            other => Err(PlcError::InvalidAddress(format!("Unknown Modbus area {}", other))),
        }
    }
}

impl fmt::Display for ModbusArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data type stored at a Modbus address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModbusDataType {
    Bool,
    Int,
    Uint,
    Word,
    Dint,
    Udint,
    Dword,
    Lint,
    Ulint,
    Real,
    Lreal,
}

impl ModbusDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModbusDataType::Bool => "BOOL",
            ModbusDataType::Int => "INT",
            ModbusDataType::Uint => "UINT",
            ModbusDataType::Word => "WORD",
            ModbusDataType::Dint => "DINT",
            ModbusDataType::Udint => "UDINT",
            ModbusDataType::Dword => "DWORD",
            ModbusDataType::Lint => "LINT",
            ModbusDataType::Ulint => "ULINT",
            ModbusDataType::Real => "REAL",
            ModbusDataType::Lreal => "LREAL",
        }
    }

    /// Width of one element on the wire
    pub fn bit_size(&self) -> usize {
        match self {
            ModbusDataType::Bool => 1,
            ModbusDataType::Int | ModbusDataType::Uint | ModbusDataType::Word => 16,
            ModbusDataType::Dint
            | ModbusDataType::Udint
            | ModbusDataType::Dword
            | ModbusDataType::Real => 32,
            ModbusDataType::Lint | ModbusDataType::Ulint | ModbusDataType::Lreal => 64,
        }
    }

    /// Registers one element occupies
    pub fn register_count(&self) -> usize {
        self.bit_size().div_ceil(16)
    }
}

impl FromStr for ModbusDataType {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOL" => Ok(ModbusDataType::Bool),
            "INT" => Ok(ModbusDataType::Int),
            "UINT" => Ok(ModbusDataType::Uint),
            "WORD" => Ok(ModbusDataType::Word),
            "DINT" => Ok(ModbusDataType::Dint),
            "UDINT" => Ok(ModbusDataType::Udint),
            "DWORD" => Ok(ModbusDataType::Dword),
            "LINT" => Ok(ModbusDataType::Lint),
            "ULINT" => Ok(ModbusDataType::Ulint),
            "REAL" => Ok(ModbusDataType::Real),
            "LREAL" => Ok(ModbusDataType::Lreal),
            other => Err(PlcError::InvalidAddress(format!(
                "Unknown Modbus data type {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ModbusDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed Modbus address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModbusField {
    pub area: ModbusArea,
    /// Address as written, 1-based
    pub address: u32,
    pub data_type: ModbusDataType,
    pub quantity: usize,
}

impl ModbusField {
    /// Parse a Modbus address string
    ///
    /// # Errors
    ///
    /// `PlcError::InvalidAddress` for malformed strings, unknown areas or
    /// types, `BOOL` mismatches between area and type, address 0, and
    /// ranges that run past the end of the table or exceed one read.
    pub fn parse(address: &str) -> PlcResult<Self> {
        let pattern = ADDRESS_PATTERN
            .as_ref()
            .ok_or_else(|| PlcError::internal("Modbus address pattern failed to compile"))?;
        let captures = pattern
            .captures(address)
            .ok_or_else(|| PlcError::InvalidAddress(address.to_string()))?;
        let invalid = |reason: &str| PlcError::InvalidAddress(format!("{}: {}", address, reason));

        let area: ModbusArea = captures["area"].parse()?;
        let number: u32 = captures["address"]
            .parse()
            .map_err(|_| invalid("address out of range"))?;
        let data_type = match captures.name("type") {
            Some(m) => m.as_str().parse()?,
            None if area.is_bit_area() => ModbusDataType::Bool,
            None => ModbusDataType::Int,
        };
        let quantity = match captures.name("count") {
            Some(m) => m
                .as_str()
                .parse::<usize>()
                .map_err(|_| invalid("element count out of range"))?,
            None => 1,
        };

        if area.is_bit_area() != (data_type == ModbusDataType::Bool) {
            return Err(invalid("BOOL is the only type of coils and discrete inputs"));
        }
        if number == 0 {
            return Err(invalid("addresses start at 1"));
        }
        if quantity == 0 {
            return Err(invalid("element count must be positive"));
        }

        let field = Self {
            area,
            address: number,
            data_type,
            quantity,
        };
        let limit = if area.is_bit_area() {
            MAX_READ_BITS
        } else {
            MAX_READ_REGISTERS
        };
        if field.wire_quantity() > limit {
            return Err(invalid("range exceeds a single request"));
        }
        if (number as usize - 1) + field.wire_quantity() > 0x1_0000 {
            return Err(invalid("range runs past the end of the table"));
        }
        Ok(field)
    }

    /// Starting address on the wire, 0-based
    pub fn wire_address(&self) -> u16 {
        (self.address - 1) as u16
    }

    /// Number of coils or registers covered on the wire
    pub fn wire_quantity(&self) -> usize {
        if self.area.is_bit_area() {
            self.quantity
        } else {
            self.quantity * self.data_type.register_count()
        }
    }
}

impl FromStr for ModbusField {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ModbusField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.area, self.address, self.data_type)?;
        if self.quantity != 1 {
            write!(f, "[{}]", self.quantity)?;
        }
        Ok(())
    }
}

impl PlcField for ModbusField {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn num_elements(&self) -> usize {
        self.quantity
    }
}
