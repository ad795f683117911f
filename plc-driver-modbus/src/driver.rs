//! Modbus-TCP driver registration

use crate::configuration::{ModbusConfiguration, ModbusSession};
use crate::error::PlcResult;
use crate::field::ModbusField;
use crate::tasks::{ConnectStep, DisconnectStep, ReadStep, WriteStep};
use plc_runtime::{
    Driver, ExecutionSink, PlcField, ReadRequest, ReadResponse, Task, TaskKind, WriteRequest,
    WriteResponse,
};
use plc_transport::Parameters;
use std::any::Any;
use std::rc::Rc;

/// Protocol code of the Modbus-TCP driver
pub const MODBUS_TCP_PROTOCOL_CODE: &str = "modbus-tcp";

/// Registered Modbus-TCP port
pub const MODBUS_TCP_DEFAULT_PORT: u16 = 502;

/// Driver for Modbus-TCP devices and gateways
#[derive(Debug, Default, Clone, Copy)]
pub struct ModbusTcpDriver;

impl ModbusTcpDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Driver for ModbusTcpDriver {
    fn protocol_code(&self) -> &'static str {
        MODBUS_TCP_PROTOCOL_CODE
    }

    fn protocol_name(&self) -> &'static str {
        "Modbus TCP"
    }

    fn default_transport_code(&self) -> Option<&'static str> {
        Some("tcp")
    }

    fn default_port(&self) -> Option<u16> {
        Some(MODBUS_TCP_DEFAULT_PORT)
    }

    fn configure(&self, parameters: &Parameters) -> PlcResult<Box<dyn Any>> {
        let configuration = ModbusConfiguration::from_parameters(parameters)?;
        log::debug!("Modbus configuration: {:?}", configuration);
        Ok(Box::new(ModbusSession::new(configuration)))
    }

    fn parse_address(&self, address: &str) -> PlcResult<Rc<dyn PlcField>> {
        Ok(Rc::new(ModbusField::parse(address)?))
    }

    fn connect(&self) -> PlcResult<Task> {
        Ok(Task::new(TaskKind::Connect, ConnectStep::new()))
    }

    fn disconnect(&self) -> PlcResult<Task> {
        Ok(Task::new(TaskKind::Disconnect, DisconnectStep::new()))
    }

    fn read(&self, request: &ReadRequest, sink: ExecutionSink<ReadResponse>) -> PlcResult<Task> {
        Ok(Task::new(TaskKind::Read, ReadStep::new(request.clone(), sink)))
    }

    fn write(&self, request: &WriteRequest, sink: ExecutionSink<WriteResponse>) -> PlcResult<Task> {
        Ok(Task::new(TaskKind::Write, WriteStep::new(request.clone(), sink)))
    }
}
