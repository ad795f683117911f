//! Bit-level codec module for PLC wire messages
//!
//! Wire messages of industrial protocols carry fields that are not byte
//! aligned (single flags, 4-bit nibbles, 12-bit counters). `ReadBuffer` and
//! `WriteBuffer` keep a byte cursor plus a bit cursor and read or write an
//! arbitrary number of bits, most significant bit first.
//!
//! Every operation checks the remaining space before touching the cursor or
//! the data, so a failed call leaves the buffer exactly as it was.

pub mod bits;
pub mod encoding;
pub mod error;
pub mod read_buffer;
pub mod write_buffer;

pub use encoding::StringEncoding;
pub use error::{PlcError, PlcResult};
pub use read_buffer::ReadBuffer;
pub use write_buffer::WriteBuffer;
