//! Simulated PLC driver
//!
//! Protocol code `simulated`. Fields never touch a device:
//!
//! - `RANDOM/name:TYPE` reads fresh random values and refuses writes
//! - `STATE/name:TYPE` reads back whatever was last written under `name`
//! - `STDOUT/name:TYPE` logs written values and has nothing to read
//!
//! The type prefix is optional and defaults to `RANDOM`. Datatypes are
//! `BOOL`, `INTEGER`, `REAL` and `STRING`; a trailing `[n]` addresses an
//! array of `n` elements.
//!
//! The driver is mostly useful for trying out the runtime and for tests:
//! every Task finishes within a tick or two, and the disconnect Task still
//! waits for in-flight requests like a real driver does.

pub mod driver;
pub mod error;
pub mod field;
pub mod state;
mod tasks;

pub use driver::{SIMULATED_PROTOCOL_CODE, SimulatedDriver};
pub use error::{PlcError, PlcResult};
pub use field::{SimulatedDatatype, SimulatedField, SimulatedFieldType};
pub use state::SimulatedState;
