//! State machines of the simulated driver

use crate::error::{PlcError, PlcResult};
use crate::field::{SimulatedField, SimulatedFieldType};
use crate::state::SimulatedState;
use plc_core::{PlcValue, ResponseCode};
use plc_runtime::{
    ConnectionContext, ConnectionId, ExecutionSink, ReadRequest, ReadResponse, StepOutcome, TaskStep,
    WriteRequest, WriteResponse, downcast_field,
};

/// Marks the connection established in one step
pub(crate) struct ConnectStep;

impl TaskStep for ConnectStep {
    fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
        if context.is_connected() {
            return StepOutcome::Failed(PlcError::AlreadyConnected);
        }
        context.set_connected(true);
        log::debug!("Simulated connection {}: connected", context.id());
        StepOutcome::Complete
    }

    fn state_name(&self) -> &'static str {
        "CONNECT"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisconnectState {
    Init,
    WaitTasksFinished,
    Finished,
}

impl DisconnectState {
    fn as_str(&self) -> &'static str {
        match self {
            DisconnectState::Init => "INIT",
            DisconnectState::WaitTasksFinished => "WAIT_TASKS_FINISHED",
            DisconnectState::Finished => "FINISHED",
        }
    }
}

/// Waits until it is the only Task left, then drops the link
pub(crate) struct DisconnectStep {
    state: DisconnectState,
}

impl DisconnectStep {
    pub(crate) fn new() -> Self {
        Self {
            state: DisconnectState::Init,
        }
    }
}

impl TaskStep for DisconnectStep {
    fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
        match self.state {
            DisconnectState::Init => {
                self.state = DisconnectState::WaitTasksFinished;
                StepOutcome::Progress
            }
            // The disconnect Task itself is counted
            DisconnectState::WaitTasksFinished if context.running_task_count() > 1 => {
                StepOutcome::Pending
            }
            DisconnectState::WaitTasksFinished => {
                context.set_connected(false);
                self.state = DisconnectState::Finished;
                log::debug!("Simulated connection {}: disconnected", context.id());
                StepOutcome::Complete
            }
            DisconnectState::Finished => StepOutcome::Complete,
        }
    }

    fn state_name(&self) -> &'static str {
        self.state.as_str()
    }
}

/// Answers every item of a read request in a single step
pub(crate) struct ReadStep {
    request: ReadRequest,
    sink: ExecutionSink<ReadResponse>,
}

impl ReadStep {
    pub(crate) fn new(request: ReadRequest, sink: ExecutionSink<ReadResponse>) -> Self {
        Self { request, sink }
    }

    fn run(&mut self, context: &mut ConnectionContext) -> PlcResult<StepOutcome> {
        let state = context.configuration_mut::<SimulatedState>()?;
        let mut items = Vec::with_capacity(self.request.len());
        for item in self.request.items() {
            let field = downcast_field::<SimulatedField>(item.field.as_ref())?;
            items.push(read_item(state, field));
        }
        self.sink.complete(ReadResponse::assemble(&self.request, items)?)?;
        Ok(StepOutcome::Complete)
    }
}

fn read_item(state: &mut SimulatedState, field: &SimulatedField) -> (ResponseCode, Option<PlcValue>) {
    match field.field_type {
        SimulatedFieldType::Random => (ResponseCode::Ok, Some(state.random_value(field))),
        SimulatedFieldType::State => match state.get(&field.name) {
            Some(value) => (ResponseCode::Ok, Some(value.clone())),
            None => (ResponseCode::NotFound, None),
        },
        SimulatedFieldType::Stdout => (ResponseCode::NotFound, None),
    }
}

impl TaskStep for ReadStep {
    fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
        self.run(context).into()
    }

    fn state_name(&self) -> &'static str {
        "READ"
    }
}

/// Applies every item of a write request in a single step
pub(crate) struct WriteStep {
    request: WriteRequest,
    sink: ExecutionSink<WriteResponse>,
}

impl WriteStep {
    pub(crate) fn new(request: WriteRequest, sink: ExecutionSink<WriteResponse>) -> Self {
        Self { request, sink }
    }

    fn run(&mut self, context: &mut ConnectionContext) -> PlcResult<StepOutcome> {
        let id = context.id();
        let state = context.configuration_mut::<SimulatedState>()?;
        let mut codes = Vec::with_capacity(self.request.len());
        for item in self.request.items() {
            let field = downcast_field::<SimulatedField>(item.item.field.as_ref())?;
            codes.push(write_item(id, state, field, &item.value));
        }
        self.sink.complete(WriteResponse::assemble(&self.request, codes)?)?;
        Ok(StepOutcome::Complete)
    }
}

fn write_item(
    id: ConnectionId,
    state: &mut SimulatedState,
    field: &SimulatedField,
    value: &PlcValue,
) -> ResponseCode {
    if field.field_type == SimulatedFieldType::Random {
        return ResponseCode::InvalidAddress;
    }
    if !field.accepts(value) {
        log::warn!(
            "Simulated connection {}: {} is a {} but {} expects {}",
            id,
            value,
            value.value_type().name(),
            field,
            field.datatype
        );
        return ResponseCode::InvalidDatatype;
    }
    match field.field_type {
        SimulatedFieldType::State => {
            state.set(field.name.clone(), value.clone());
        }
        SimulatedFieldType::Stdout => {
            log::info!(
                "Simulated connection {}: ({}) {} = {}",
                id,
                value.value_type().name(),
                field.name,
                value
            );
        }
        SimulatedFieldType::Random => {}
    }
    ResponseCode::Ok
}

impl TaskStep for WriteStep {
    fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
        self.run(context).into()
    }

    fn state_name(&self) -> &'static str {
        "WRITE"
    }
}
