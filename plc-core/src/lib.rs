//! Core types and utilities for the plc4r runtime
//!
//! This crate provides the error type, the return-code taxonomy shared by
//! every layer, per-item response codes and the `PlcValue` container used
//! to carry decoded data between drivers and callers.

pub mod error;
pub mod response_code;
pub mod value;

pub use error::{PlcError, PlcResult, ReturnCode};
pub use response_code::ResponseCode;
pub use value::{PlcValue, PlcValueType};
