//! Modbus-TCP driver
//!
//! Protocol code `modbus-tcp`, default transport `tcp` on port 502.
//!
//! # Connection String
//!
//! ```text
//! modbus-tcp://192.168.0.10
//! modbus-tcp:tcp://192.168.0.10:5020?unit-identifier=17
//! ```
//!
//! # Addresses
//!
//! See [`field`] for the address grammar. Reads use function codes 1 to 4,
//! writes use 15 (coils) and 16 (holding registers). Exception responses
//! answer the affected item only.

pub mod configuration;
pub mod driver;
pub mod error;
pub mod field;
pub mod pdu;
mod tasks;
pub mod value;

pub use configuration::{ModbusConfiguration, ModbusSession};
pub use driver::{MODBUS_TCP_DEFAULT_PORT, MODBUS_TCP_PROTOCOL_CODE, ModbusTcpDriver};
pub use error::{PlcError, PlcResult};
pub use field::{ModbusArea, ModbusDataType, ModbusField};
pub use pdu::{ExceptionCode, MbapHeader, ModbusAdu, ModbusRequest, ModbusResponse};
