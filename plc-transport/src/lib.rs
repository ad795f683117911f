//! Transport layer module for the plc4r runtime
//!
//! A transport moves raw bytes between the runtime and one device. It never
//! blocks: sends are queued when the socket is busy and receives only pick
//! up what has already arrived. Drivers extract complete messages from the
//! received byte stream with a protocol specific `FrameSelector`.

pub mod error;
pub mod frame;
pub mod framing;
pub mod loopback;
pub mod serial;
pub mod tcp;
pub mod transport;

pub use error::{PlcError, PlcResult};
pub use frame::{FrameAccumulator, FrameResult, FrameSelector};
pub use loopback::{LoopbackPeer, LoopbackTransport, LoopbackTransportFactory};
pub use serial::{SerialParity, SerialSettings, SerialTransport, SerialTransportFactory};
pub use tcp::{TcpSettings, TcpTransport, TcpTransportFactory};
pub use transport::{Parameters, Transport, TransportFactory, parse_parameter};
