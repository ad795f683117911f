//! TCP transport implementation

use crate::error::{PlcError, PlcResult};
use crate::frame::FrameAccumulator;
use crate::transport::{Parameters, Transport, TransportFactory, parse_parameter};
use bytes::{Buf, BytesMut};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

const READ_CHUNK_SIZE: usize = 4096;

/// TCP transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
    /// Upper bound for establishing the connection in `open`
    ///
    /// `open` blocks the calling thread, and with it the scheduler, for at
    /// most this long. Must not be 0.
    pub connect_timeout_ms: u64,
    pub no_delay: bool,
}

impl TcpSettings {
    /// Create new TCP settings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout_ms: 5000,
            no_delay: true,
        }
    }

    /// Build settings from `host[:port]` connect info
    ///
    /// IPv6 hosts must be bracketed when a port is given (`[::1]:502`).
    ///
    /// # Arguments
    ///
    /// * `connect_info` - `host` or `host:port`
    /// * `default_port` - Port used when `connect_info` carries none
    /// * `parameters` - Optional `connect-timeout` (ms) and `no-delay`
    pub fn from_connect_info(
        connect_info: &str,
        default_port: Option<u16>,
        parameters: &Parameters,
    ) -> PlcResult<Self> {
        let (host, port) = split_host_port(connect_info)?;
        let port = match port.or(default_port) {
            Some(port) => port,
            None => {
                return Err(PlcError::InvalidConnectionString(format!(
                    "No port given in '{}' and the protocol has no default port",
                    connect_info
                )));
            }
        };
        let mut settings = Self::new(host, port);
        settings.connect_timeout_ms =
            parse_parameter(parameters, "connect-timeout", settings.connect_timeout_ms)?;
        if settings.connect_timeout_ms == 0 {
            return Err(PlcError::InvalidArgument(
                "Parameter 'connect-timeout' must be at least 1 ms".to_string(),
            ));
        }
        settings.no_delay = parse_parameter(parameters, "no-delay", settings.no_delay)?;
        Ok(settings)
    }

    fn resolve(&self) -> PlcResult<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                PlcError::Transport(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Could not resolve host '{}'", self.host),
                ))
            })
    }
}

fn split_host_port(connect_info: &str) -> PlcResult<(&str, Option<u16>)> {
    let (host, port) = if let Some(rest) = connect_info.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| {
            PlcError::InvalidConnectionString(format!("Unterminated IPv6 host in '{}'", connect_info))
        })?;
        (host, tail.strip_prefix(':'))
    } else {
        match connect_info.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (connect_info, None),
        }
    };
    if host.is_empty() {
        return Err(PlcError::InvalidConnectionString(format!(
            "Missing host in '{}'",
            connect_info
        )));
    }
    let port = port
        .map(|port| {
            port.parse::<u16>().map_err(|_| {
                PlcError::InvalidConnectionString(format!("Invalid port '{}'", port))
            })
        })
        .transpose()?;
    Ok((host, port))
}

/// Non-blocking TCP transport
#[derive(Debug)]
pub struct TcpTransport {
    settings: TcpSettings,
    stream: Option<TcpStream>,
    outbound: BytesMut,
    inbound: FrameAccumulator,
}

impl TcpTransport {
    /// Create a new, not yet opened TCP transport
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            settings,
            stream: None,
            outbound: BytesMut::new(),
            inbound: FrameAccumulator::new(),
        }
    }

    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }

    /// Bytes queued for sending that the socket has not accepted yet
    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    fn stream_mut(&mut self) -> PlcResult<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            PlcError::Transport(io::Error::new(
                io::ErrorKind::NotConnected,
                "TCP stream not connected",
            ))
        })
    }

    /// Push queued bytes into the socket until it would block
    fn flush_outbound(&mut self) -> PlcResult<()> {
        while !self.outbound.is_empty() {
            let Some(stream) = self.stream.as_mut() else {
                return Err(PlcError::Transport(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "TCP stream not connected",
                )));
            };
            match stream.write(&self.outbound) {
                Ok(0) => {
                    return Err(PlcError::Transport(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "Failed to write to TCP stream",
                    )));
                }
                Ok(n) => {
                    trace!("Sent {} bytes: {:02X?}", n, &self.outbound[..n]);
                    self.outbound.advance(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn transport_code(&self) -> &'static str {
        "tcp"
    }

    fn open(&mut self) -> PlcResult<()> {
        if self.stream.is_some() {
            return Err(PlcError::AlreadyConnected);
        }
        let address = self.settings.resolve()?;
        debug!("Opening TCP connection to {}", address);
        let stream = TcpStream::connect_timeout(
            &address,
            Duration::from_millis(self.settings.connect_timeout_ms),
        )?;
        stream.set_nodelay(self.settings.no_delay)?;
        stream.set_nonblocking(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> PlcResult<()> {
        if let Some(stream) = self.stream.take() {
            debug!("Closing TCP connection to {}:{}", self.settings.host, self.settings.port);
            // The peer may already have gone away
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.outbound.clear();
        self.inbound.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn send_message(&mut self, message: &[u8]) -> PlcResult<()> {
        self.stream_mut()?;
        self.outbound.extend_from_slice(message);
        self.flush_outbound()
    }

    fn fill_receive_buffer(&mut self) -> PlcResult<usize> {
        self.flush_outbound()?;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut total = 0;
        loop {
            match self.stream_mut()?.read(&mut chunk) {
                Ok(0) => {
                    debug!("TCP connection closed by peer");
                    self.stream = None;
                    if total > 0 {
                        return Ok(total);
                    }
                    return Err(PlcError::Transport(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "Connection closed by peer",
                    )));
                }
                Ok(n) => {
                    self.inbound.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn receive_buffer(&mut self) -> &mut FrameAccumulator {
        &mut self.inbound
    }
}

/// Factory for `tcp` transports
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransportFactory;

impl TransportFactory for TcpTransportFactory {
    fn transport_code(&self) -> &'static str {
        "tcp"
    }

    fn transport_name(&self) -> &'static str {
        "TCP"
    }

    fn create(
        &self,
        connect_info: &str,
        default_port: Option<u16>,
        parameters: &Parameters,
    ) -> PlcResult<Box<dyn Transport>> {
        let settings = TcpSettings::from_connect_info(connect_info, default_port, parameters)?;
        Ok(Box::new(TcpTransport::new(settings)))
    }
}
