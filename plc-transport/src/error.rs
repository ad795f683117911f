//! Error types for the transport layer

pub use plc_core::error::{PlcError, PlcResult, ReturnCode};
