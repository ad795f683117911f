//! Error types for the runtime

pub use plc_core::error::{PlcError, PlcResult, ReturnCode};
