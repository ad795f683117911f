//! Error re-exports for the codec layer

pub use plc_core::error::{PlcError, PlcResult, ReturnCode};
