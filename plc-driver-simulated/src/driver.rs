//! Simulated driver registration

use crate::error::PlcResult;
use crate::field::SimulatedField;
use crate::state::SimulatedState;
use crate::tasks::{ConnectStep, DisconnectStep, ReadStep, WriteStep};
use plc_runtime::{
    Driver, ExecutionSink, PlcField, ReadRequest, ReadResponse, Task, TaskKind, WriteRequest,
    WriteResponse,
};
use plc_transport::Parameters;
use std::any::Any;
use std::rc::Rc;

/// Protocol code of the simulated driver
pub const SIMULATED_PROTOCOL_CODE: &str = "simulated";

/// Driver for an in-memory PLC
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedDriver;

impl SimulatedDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Driver for SimulatedDriver {
    fn protocol_code(&self) -> &'static str {
        SIMULATED_PROTOCOL_CODE
    }

    fn protocol_name(&self) -> &'static str {
        "Simulated PLC"
    }

    fn default_transport_code(&self) -> Option<&'static str> {
        Some("loopback")
    }

    fn configure(&self, parameters: &Parameters) -> PlcResult<Box<dyn Any>> {
        Ok(Box::new(SimulatedState::from_parameters(parameters)?))
    }

    fn parse_address(&self, address: &str) -> PlcResult<Rc<dyn PlcField>> {
        Ok(Rc::new(SimulatedField::parse(address)?))
    }

    fn connect(&self) -> PlcResult<Task> {
        Ok(Task::new(TaskKind::Connect, ConnectStep))
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
