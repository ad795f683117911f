//! Transport and transport factory traits

use crate::error::{PlcError, PlcResult};
use crate::frame::{FrameAccumulator, FrameSelector};
use plc_codec::ReadBuffer;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// `key=value` parameters taken from a connection string
pub type Parameters = BTreeMap<String, String>;

/// Non-blocking byte transport to one device
///
/// Apart from `open`, none of the methods may block on the network: a
/// Task step calls them once per scheduler tick and expects to return
/// promptly.
pub trait Transport: fmt::Debug {
    /// Short code the transport is registered under (`tcp`, `serial`, ...)
    fn transport_code(&self) -> &'static str;

    /// Open the underlying channel
    ///
    /// This is the one call allowed to wait. Establishing a TCP connection
    /// holds the scheduler thread for up to the `connect-timeout`
    /// parameter (5 s by default).
    fn open(&mut self) -> PlcResult<()>;

    /// Close the underlying channel, dropping anything still buffered
    fn close(&mut self) -> PlcResult<()>;

    /// Check if the channel is open
    fn is_open(&self) -> bool;

    /// Hand one complete message to the transport for sending
    ///
    /// Bytes the channel cannot take right now are queued and flushed on
    /// later calls.
    fn send_message(&mut self, message: &[u8]) -> PlcResult<()>;

    /// Move whatever bytes have already arrived into the receive buffer
    ///
    /// # Returns
    ///
    /// Number of bytes moved, 0 if nothing was waiting
    fn fill_receive_buffer(&mut self) -> PlcResult<usize>;

    /// Received bytes not yet handed out as messages
    fn receive_buffer(&mut self) -> &mut FrameAccumulator;

    /// Try to take the next complete message off the transport
    ///
    /// # Arguments
    ///
    /// * `min_size` - Bytes that must be buffered before `selector` runs
    /// * `selector` - Protocol rule marking where a message ends
    ///
    /// # Returns
    ///
    /// `Ok(None)` when no complete message has arrived yet. Transport
    /// errors are returned as they are.
    fn select_message(
        &mut self,
        min_size: usize,
        selector: FrameSelector,
    ) -> PlcResult<Option<ReadBuffer>> {
        self.fill_receive_buffer()?;
        self.receive_buffer().select(min_size, selector)
    }
}

/// Creates transports of one kind from connection-string data
pub trait TransportFactory {
    /// Code used in connection strings (`modbus-tcp:<code>://...`)
    fn transport_code(&self) -> &'static str;

    /// Human-readable transport name
    fn transport_name(&self) -> &'static str;

    /// Create a transport for `connect_info`
    ///
    /// # Arguments
    ///
    /// * `connect_info` - Part of the connection string after `://`
    /// * `default_port` - Port of the driver's protocol, for transports that need one
    /// * `parameters` - Query parameters of the connection string
    fn create(
        &self,
        connect_info: &str,
        default_port: Option<u16>,
        parameters: &Parameters,
    ) -> PlcResult<Box<dyn Transport>>;
}

/// Parse an optional parameter, falling back to `default` when absent
pub fn parse_parameter<T: FromStr>(parameters: &Parameters, key: &str, default: T) -> PlcResult<T> {
    match parameters.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            PlcError::InvalidArgument(format!("Invalid value '{}' for parameter '{}'", raw, key))
        }),
    }
}
