//! Protocol driver trait

use crate::error::PlcResult;
use crate::execution::ExecutionSink;
use crate::request::{PlcField, ReadRequest, WriteRequest};
use crate::response::{ReadResponse, WriteResponse};
use crate::task::Task;
use plc_transport::Parameters;
use std::any::Any;
use std::rc::Rc;

/// One wire protocol plugged into a `PlcSystem`
///
/// A driver never does I/O itself: `connect`, `disconnect`, `read` and
/// `write` only build the Task whose steps do the work.
pub trait Driver {
    /// Code used in connection strings (`modbus-tcp`, `simulated`, ...)
    fn protocol_code(&self) -> &'static str;

    /// Human-readable protocol name
    fn protocol_name(&self) -> &'static str;

    /// Transport used when the connection string names none
    fn default_transport_code(&self) -> Option<&'static str>;

    /// Port passed to transports that need one
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Build the driver configuration stored on a new connection
    ///
    /// Tasks read it back with `ConnectionContext::configuration`.
    fn configure(&self, parameters: &Parameters) -> PlcResult<Box<dyn Any>>;

    /// Parse a protocol address string into a field
    fn parse_address(&self, address: &str) -> PlcResult<Rc<dyn PlcField>>;

    /// Build the Task establishing the connection
    fn connect(&self) -> PlcResult<Task>;

    /// Build the Task tearing the connection down
    ///
    /// The Task must not mark the connection disconnected while other
    /// Tasks are still running on it.
    fn disconnect(&self) -> PlcResult<Task>;

    /// Build the Task serving a read request
    fn read(&self, request: &ReadRequest, sink: ExecutionSink<ReadResponse>) -> PlcResult<Task>;

    /// Build the Task serving a write request
    fn write(&self, request: &WriteRequest, sink: ExecutionSink<WriteResponse>)
    -> PlcResult<Task>;
}
