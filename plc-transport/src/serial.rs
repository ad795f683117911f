//! Serial port transport implementation

use crate::error::{PlcError, PlcResult};
use crate::frame::FrameAccumulator;
use crate::transport::{Parameters, Transport, TransportFactory, parse_parameter};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use std::time::Duration;

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialParity {
    #[default]
    None,
    Odd,
    Even,
}

impl FromStr for SerialParity {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            _ => Err(PlcError::InvalidArgument(format!("Unknown parity '{}'", s))),
        }
    }
}

/// Serial port transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    /// 5, 6, 7 or 8
    pub data_bits: u8,
    /// 1 or 2
    pub stop_bits: u8,
    pub parity: SerialParity,
}

impl SerialSettings {
    /// Create new serial settings with 8N1 framing
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
        }
    }

    /// Build settings from a device path plus `baud-rate`, `data-bits`,
    /// `stop-bits` and `parity` parameters
    pub fn from_connect_info(connect_info: &str, parameters: &Parameters) -> PlcResult<Self> {
        if connect_info.is_empty() {
            return Err(PlcError::InvalidConnectionString(
                "Missing serial device name".to_string(),
            ));
        }
        let mut settings = Self::new(connect_info, 19200);
        settings.baud_rate = parse_parameter(parameters, "baud-rate", settings.baud_rate)?;
        settings.data_bits = parse_parameter(parameters, "data-bits", settings.data_bits)?;
        settings.stop_bits = parse_parameter(parameters, "stop-bits", settings.stop_bits)?;
        settings.parity = parse_parameter(parameters, "parity", settings.parity)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> PlcResult<()> {
        if !(5..=8).contains(&self.data_bits) {
            return Err(PlcError::InvalidArgument(format!(
                "Unsupported data bits: {}",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(PlcError::InvalidArgument(format!(
                "Unsupported stop bits: {}",
                self.stop_bits
            )));
        }
        Ok(())
    }

    fn data_bits(&self) -> DataBits {
        match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        }
    }

    fn stop_bits(&self) -> StopBits {
        match self.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        }
    }

    fn parity(&self) -> Parity {
        match self.parity {
            SerialParity::None => Parity::None,
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
        }
    }
}

/// Wrapper for the boxed port that implements Debug
struct DebugSerialPort(Box<dyn SerialPort>);

impl fmt::Debug for DebugSerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPort").field("name", &self.0.name()).finish()
    }
}

/// Serial port transport
///
/// Reads only what the driver reports as already received, so polling
/// never waits on the line.
#[derive(Debug)]
pub struct SerialTransport {
    settings: SerialSettings,
    port: Option<DebugSerialPort>,
    inbound: FrameAccumulator,
}

impl SerialTransport {
    /// Create a new, not yet opened serial transport
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
            inbound: FrameAccumulator::new(),
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn port_mut(&mut self) -> PlcResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().map(|port| &mut port.0).ok_or_else(|| {
            PlcError::Transport(io::Error::new(
                io::ErrorKind::NotConnected,
                "Serial port not open",
            ))
        })
    }
}

impl Transport for SerialTransport {
    fn transport_code(&self) -> &'static str {
        "serial"
    }

    fn open(&mut self) -> PlcResult<()> {
        if self.port.is_some() {
            return Err(PlcError::AlreadyConnected);
        }
        debug!(
            "Opening serial port {} @ {} baud",
            self.settings.port_name, self.settings.baud_rate
        );
        let port = serialport::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits())
            .stop_bits(self.settings.stop_bits())
            .parity(self.settings.parity())
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(io::Error::from)?;
        self.port = Some(DebugSerialPort(port));
        Ok(())
    }

    fn close(&mut self) -> PlcResult<()> {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.settings.port_name);
        }
        self.inbound.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn send_message(&mut self, message: &[u8]) -> PlcResult<()> {
        let port = self.port_mut()?;
        port.write_all(message)?;
        port.flush()?;
        trace!("Sent {} bytes: {:02X?}", message.len(), message);
        Ok(())
    }

    fn fill_receive_buffer(&mut self) -> PlcResult<usize> {
        let port = self.port_mut()?;
        let available = port.bytes_to_read().map_err(io::Error::from)? as usize;
        if available == 0 {
            return Ok(0);
        }
        let mut chunk = vec![0u8; available];
        let n = match port.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => 0,
            Err(e) => return Err(e.into()),
        };
        self.inbound.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn receive_buffer(&mut self) -> &mut FrameAccumulator {
        &mut self.inbound
    }
}

/// Factory for `serial` transports
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialTransportFactory;

impl TransportFactory for SerialTransportFactory {
    fn transport_code(&self) -> &'static str {
        "serial"
    }

    fn transport_name(&self) -> &'static str {
        "Serial"
    }

    fn create(
        &self,
        connect_info: &str,
        _default_port: Option<u16>,
        parameters: &Parameters,
    ) -> PlcResult<Box<dyn Transport>> {
        let settings = SerialSettings::from_connect_info(connect_info, parameters)?;
        Ok(Box::new(SerialTransport::new(settings)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_parameters() {
        let mut parameters = Parameters::new();
        parameters.insert("baud-rate".into(), "9600".into());
        parameters.insert("parity".into(), "even".into());
        parameters.insert("stop-bits".into(), "2".into());

        let settings = SerialSettings::from_connect_info("/dev/ttyUSB0", &parameters).unwrap();
        assert_eq!(settings.port_name, "/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, 8);
        assert_eq!(settings.stop_bits, 2);
        assert_eq!(settings.parity, SerialParity::Even);
    }

    #[test]
    fn test_settings_rejects_bad_values() {
        let mut parameters = Parameters::new();
        parameters.insert("data-bits".into(), "9".into());
        assert!(SerialSettings::from_connect_info("/dev/ttyS0", &parameters).is_err());

        let mut parameters = Parameters::new();
        parameters.insert("parity".into(), "mark".into());
        assert!(SerialSettings::from_connect_info("/dev/ttyS0", &parameters).is_err());

        assert!(SerialSettings::from_connect_info("", &Parameters::new()).is_err());
    }

    #[test]
    fn test_unopened_port_reports_not_connected() {
        let mut transport = SerialTransport::new(SerialSettings::new("/dev/ttyS0", 9600));
        assert!(!transport.is_open());
        let err = transport.send_message(&[0x01]).unwrap_err();
        assert!(matches!(err, PlcError::Transport(ref e) if e.kind() == io::ErrorKind::NotConnected));
    }
}
