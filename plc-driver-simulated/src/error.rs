//! Error types for the simulated driver

pub use plc_core::error::{PlcError, PlcResult, ReturnCode};
