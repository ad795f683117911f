//! Error types for the Modbus driver

pub use plc_core::error::{PlcError, PlcResult, ReturnCode};
