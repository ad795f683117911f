//! Modbus-TCP application data units
//!
//! # Frame Structure
//!
//! ```text
//! +----------------+-------------+--------+---------+---------------+
//! | Transaction ID | Protocol ID | Length | Unit ID | PDU           |
//! | 2 bytes        | 2 bytes (0) | 2 bytes| 1 byte  | function+data |
//! +----------------+-------------+--------+---------+---------------+
//! ```
//!
//! `Length` counts the unit id and the PDU. All multi-byte fields are big
//! endian.

use crate::error::{PlcError, PlcResult};
use plc_codec::{ReadBuffer, WriteBuffer};
use plc_transport::framing::MODBUS_TCP_HEADER_SIZE;
use std::fmt;

/// Protocol id carried by every Modbus-TCP frame
pub const MODBUS_PROTOCOL_ID: u16 = 0;

/// Set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// MBAP header preceding every PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    fn decode(buffer: &mut ReadBuffer) -> PlcResult<Self> {
        Ok(Self {
            transaction_id: buffer.read_unsigned_16(16)?,
            protocol_id: buffer.read_unsigned_16(16)?,
            length: buffer.read_unsigned_16(16)?,
            unit_id: buffer.read_unsigned_8(8)?,
        })
    }
}

/// Request PDU sent to a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    /// Coil states packed least significant bit first
    WriteMultipleCoils {
        address: u16,
        quantity: u16,
        values: Vec<u8>,
    },
    /// Register contents, big endian
    WriteMultipleRegisters {
        address: u16,
        quantity: u16,
        values: Vec<u8>,
    },
}

impl ModbusRequest {
    pub fn function_code(&self) -> u8 {
        match self {
            ModbusRequest::ReadCoils { .. } => FC_READ_COILS,
            ModbusRequest::ReadDiscreteInputs { .. } => FC_READ_DISCRETE_INPUTS,
            ModbusRequest::ReadHoldingRegisters { .. } => FC_READ_HOLDING_REGISTERS,
            ModbusRequest::ReadInputRegisters { .. } => FC_READ_INPUT_REGISTERS,
            ModbusRequest::WriteMultipleCoils { .. } => FC_WRITE_MULTIPLE_COILS,
            ModbusRequest::WriteMultipleRegisters { .. } => FC_WRITE_MULTIPLE_REGISTERS,
        }
    }

    /// Encoded PDU length, function code included
    pub fn pdu_len(&self) -> usize {
        match self {
            ModbusRequest::ReadCoils { .. }
            | ModbusRequest::ReadDiscreteInputs { .. }
            | ModbusRequest::ReadHoldingRegisters { .. }
            | ModbusRequest::ReadInputRegisters { .. } => 5,
            ModbusRequest::WriteMultipleCoils { values, .. }
            | ModbusRequest::WriteMultipleRegisters { values, .. } => 6 + values.len(),
        }
    }

    fn encode(&self, buffer: &mut WriteBuffer) -> PlcResult<()> {
        buffer.write_unsigned_8(8, self.function_code())?;
        match self {
            ModbusRequest::ReadCoils { address, quantity }
            | ModbusRequest::ReadDiscreteInputs { address, quantity }
            | ModbusRequest::ReadHoldingRegisters { address, quantity }
            | ModbusRequest::ReadInputRegisters { address, quantity } => {
                buffer.write_unsigned_16(16, *address)?;
                buffer.write_unsigned_16(16, *quantity)?;
            }
            ModbusRequest::WriteMultipleCoils {
                address,
                quantity,
                values,
            }
            | ModbusRequest::WriteMultipleRegisters {
                address,
                quantity,
                values,
            } => {
                let byte_count = u8::try_from(values.len()).map_err(|_| {
                    PlcError::OutOfRange(format!("{} data bytes in one write", values.len()))
                })?;
                buffer.write_unsigned_16(16, *address)?;
                buffer.write_unsigned_16(16, *quantity)?;
                buffer.write_unsigned_8(8, byte_count)?;
                buffer.write_bytes(values)?;
            }
        }
        Ok(())
    }

    /// Encode the request as a complete Modbus-TCP frame
    pub fn to_adu(&self, transaction_id: u16, unit_id: u8) -> PlcResult<Vec<u8>> {
        let pdu_len = self.pdu_len();
        let mut buffer = WriteBuffer::new(MODBUS_TCP_HEADER_SIZE + 1 + pdu_len)?;
        buffer.write_unsigned_16(16, transaction_id)?;
        buffer.write_unsigned_16(16, MODBUS_PROTOCOL_ID)?;
        buffer.write_unsigned_16(16, (pdu_len + 1) as u16)?;
        buffer.write_unsigned_8(8, unit_id)?;
        self.encode(&mut buffer)?;
        Ok(buffer.into_bytes().to_vec())
    }
}

/// Response PDU received from a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    /// Coil or discrete input states, packed least significant bit first
    Bits { function_code: u8, data: Vec<u8> },
    /// Register contents, big endian
    Registers { function_code: u8, data: Vec<u8> },
    /// Acknowledged write
    WriteAck {
        function_code: u8,
        address: u16,
        quantity: u16,
    },
    Exception {
        function_code: u8,
        exception_code: u8,
    },
}

impl ModbusResponse {
    /// Function code of the request this response answers
    pub fn function_code(&self) -> u8 {
        match self {
            ModbusResponse::Bits { function_code, .. }
            | ModbusResponse::Registers { function_code, .. }
            | ModbusResponse::WriteAck { function_code, .. }
            | ModbusResponse::Exception { function_code, .. } => *function_code,
        }
    }

    fn decode(buffer: &mut ReadBuffer) -> PlcResult<Self> {
        let raw = buffer.read_unsigned_8(8)?;
        if raw & EXCEPTION_FLAG != 0 {
            return Ok(ModbusResponse::Exception {
                function_code: raw & !EXCEPTION_FLAG,
                exception_code: buffer.read_unsigned_8(8)?,
            });
        }
        match raw {
            FC_READ_COILS | FC_READ_DISCRETE_INPUTS => {
                let count = buffer.read_unsigned_8(8)? as usize;
                Ok(ModbusResponse::Bits {
                    function_code: raw,
                    data: buffer.read_bytes(count)?,
                })
            }
            FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
                let count = buffer.read_unsigned_8(8)? as usize;
                Ok(ModbusResponse::Registers {
                    function_code: raw,
                    data: buffer.read_bytes(count)?,
                })
            }
            FC_WRITE_MULTIPLE_COILS | FC_WRITE_MULTIPLE_REGISTERS => Ok(ModbusResponse::WriteAck {
                function_code: raw,
                address: buffer.read_unsigned_16(16)?,
                quantity: buffer.read_unsigned_16(16)?,
            }),
            other => Err(PlcError::Parse(format!(
                "Unsupported Modbus function code 0x{:02X}",
                other
            ))),
        }
    }
}

/// A received frame split into header and PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusAdu {
    pub header: MbapHeader,
    pub response: ModbusResponse,
}

impl ModbusAdu {
    /// Decode one frame taken off the transport
    ///
    /// # Errors
    ///
    /// `PlcError::Parse` if the protocol id is not 0, the length field
    /// disagrees with the frame, or the PDU is malformed.
    pub fn decode(mut buffer: ReadBuffer) -> PlcResult<Self> {
        let header = MbapHeader::decode(&mut buffer)
            .map_err(|e| PlcError::Parse(format!("Truncated MBAP header: {}", e)))?;
        if header.protocol_id != MODBUS_PROTOCOL_ID {
            return Err(PlcError::Parse(format!(
                "Unexpected Modbus protocol id {}",
                header.protocol_id
            )));
        }
        if header.length as usize + MODBUS_TCP_HEADER_SIZE != buffer.total_bytes() {
            return Err(PlcError::Parse(format!(
                "Modbus length field {} does not match a {} byte frame",
                header.length,
                buffer.total_bytes()
            )));
        }
        let response = ModbusResponse::decode(&mut buffer)
            .map_err(|e| PlcError::Parse(format!("Malformed Modbus PDU: {}", e)))?;
        Ok(Self { header, response })
    }
}

/// Modbus exception code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetNoResponse,
    Unknown(u8),
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::ServerDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::ServerDeviceBusy,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetNoResponse,
            other => ExceptionCode::Unknown(other),
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionCode::IllegalFunction => f.write_str("ILLEGAL_FUNCTION"),
            ExceptionCode::IllegalDataAddress => f.write_str("ILLEGAL_DATA_ADDRESS"),
            ExceptionCode::IllegalDataValue => f.write_str("ILLEGAL_DATA_VALUE"),
            ExceptionCode::ServerDeviceFailure => f.write_str("SERVER_DEVICE_FAILURE"),
            ExceptionCode::Acknowledge => f.write_str("ACKNOWLEDGE"),
            ExceptionCode::ServerDeviceBusy => f.write_str("SERVER_DEVICE_BUSY"),
            ExceptionCode::MemoryParityError => f.write_str("MEMORY_PARITY_ERROR"),
            ExceptionCode::GatewayPathUnavailable => f.write_str("GATEWAY_PATH_UNAVAILABLE"),
            ExceptionCode::GatewayTargetNoResponse => f.write_str("GATEWAY_TARGET_NO_RESPONSE"),
            ExceptionCode::Unknown(code) => write!(f, "UNKNOWN(0x{:02X})", code),
        }
    }
}
