//! State machines of the Modbus-TCP driver
//!
//! Read and write Tasks send one request per item and wait for its
//! response before moving to the next item, so a Task never has more than
//! one transaction in flight.

use crate::configuration::ModbusSession;
use crate::error::{PlcError, PlcResult};
use crate::field::{MAX_WRITE_BITS, MAX_WRITE_REGISTERS, ModbusArea, ModbusField};
use crate::pdu::{ExceptionCode, ModbusAdu, ModbusRequest, ModbusResponse};
use crate::value::{decode_bits, decode_registers, encode_bits, encode_registers};
use plc_codec::ReadBuffer;
use plc_core::{PlcValue, ResponseCode};
use plc_runtime::{
    ConnectionContext, ConnectionId, ExecutionSink, ReadRequest, ReadResponse, StepOutcome, TaskStep,
    WriteRequest, WriteResponse, downcast_field,
};
use plc_transport::framing::{MODBUS_TCP_HEADER_SIZE, select_modbus_tcp};

/// Opens the transport and marks the connection established
pub(crate) struct ConnectStep {
    finished: bool,
}

impl ConnectStep {
    pub(crate) fn new() -> Self {
        Self { finished: false }
    }
}

impl TaskStep for ConnectStep {
    fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
        if self.finished {
            return StepOutcome::Complete;
        }
        if context.is_connected() {
            return StepOutcome::Failed(PlcError::AlreadyConnected);
        }
        if let Err(e) = context.transport().open() {
            return StepOutcome::Failed(e);
        }
        context.set_connected(true);
        self.finished = true;
        log::debug!("Modbus connection {}: transport open", context.id());
        StepOutcome::Complete
    }

    fn state_name(&self) -> &'static str {
        if self.finished {
            "FINISHED"
        } else {
            "OPEN_TRANSPORT"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisconnectState {
    WaitTasksFinished,
    CloseTransport,
    Finished,
}

/// Waits for the other Tasks to leave, then closes the transport
pub(crate) struct DisconnectStep {
    state: DisconnectState,
}

impl DisconnectStep {
    pub(crate) fn new() -> Self {
        Self {
            state: DisconnectState::WaitTasksFinished,
        }
    }
}

impl TaskStep for DisconnectStep {
    fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
        match self.state {
            // The disconnect Task itself is counted
            DisconnectState::WaitTasksFinished if context.running_task_count() > 1 => {
                StepOutcome::Pending
            }
            DisconnectState::WaitTasksFinished => {
                self.state = DisconnectState::CloseTransport;
                log::debug!("Modbus connection {}: {}", context.id(), self.state_name());
                StepOutcome::Progress
            }
            DisconnectState::CloseTransport => {
                if let Err(e) = context.transport().close() {
                    return StepOutcome::Failed(e);
                }
                context.set_connected(false);
                self.state = DisconnectState::Finished;
                log::debug!("Modbus connection {}: transport closed", context.id());
                StepOutcome::Complete
            }
            DisconnectState::Finished => StepOutcome::Complete,
        }
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            DisconnectState::WaitTasksFinished => "WAIT_TASKS_FINISHED",
            DisconnectState::CloseTransport => "CLOSE_TRANSPORT",
            DisconnectState::Finished => "FINISHED",
        }
    }
}

/// Where a request/response Task stands with its current item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangeState {
    SendRequest,
    AwaitResponse { transaction_id: u16 },
    Finished,
}

impl ExchangeState {
    fn as_str(&self) -> &'static str {
        match self {
            ExchangeState::SendRequest => "SEND_REQUEST",
            ExchangeState::AwaitResponse { .. } => "AWAIT_RESPONSE",
            ExchangeState::Finished => "FINISHED",
        }
    }
}

/// Reads the items of a request one transaction at a time
pub(crate) struct ReadStep {
    request: ReadRequest,
    sink: ExecutionSink<ReadResponse>,
    state: ExchangeState,
    results: Vec<(ResponseCode, Option<PlcValue>)>,
}

impl ReadStep {
    pub(crate) fn new(request: ReadRequest, sink: ExecutionSink<ReadResponse>) -> Self {
        let results = Vec::with_capacity(request.len());
        Self {
            request,
            sink,
            state: ExchangeState::SendRequest,
            results,
        }
    }

    fn current_field(&self) -> PlcResult<&ModbusField> {
        let item = self
            .request
            .items()
            .get(self.results.len())
            .ok_or_else(|| PlcError::internal("No read item left"))?;
        downcast_field::<ModbusField>(item.field.as_ref())
    }

    fn run(&mut self, context: &mut ConnectionContext) -> PlcResult<StepOutcome> {
        match self.state {
            ExchangeState::SendRequest => {
                if self.results.len() == self.request.len() {
                    return self.finish();
                }
                let field = self.current_field()?;
                let request = read_request_for(field);
                let transaction_id = send_request(context, &request)?;
                self.state = ExchangeState::AwaitResponse { transaction_id };
                Ok(StepOutcome::Progress)
            }
            ExchangeState::AwaitResponse { transaction_id } => {
                let Some(adu) = poll_response(context, transaction_id)? else {
                    return Ok(StepOutcome::Pending);
                };
                context
                    .configuration_mut::<ModbusSession>()?
                    .end_transaction(transaction_id);
                let field = self.current_field()?;
                let result = read_result(context.id(), field, &adu.response);
                self.results.push(result);
                self.state = ExchangeState::SendRequest;
                if self.results.len() == self.request.len() {
                    return self.finish();
                }
                Ok(StepOutcome::Progress)
            }
            ExchangeState::Finished => Ok(StepOutcome::Complete),
        }
    }

    fn finish(&mut self) -> PlcResult<StepOutcome> {
        let results = std::mem::take(&mut self.results);
        self.sink.complete(ReadResponse::assemble(&self.request, results)?)?;
        self.state = ExchangeState::Finished;
        Ok(StepOutcome::Complete)
    }
}

impl TaskStep for ReadStep {
    fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
        let result = self.run(context);
        if result.is_err() {
            abandon(context, self.state);
        }
        result.into()
    }

    fn state_name(&self) -> &'static str {
        self.state.as_str()
    }
}

/// Writes the items of a request one transaction at a time
///
/// Items whose value cannot be encoded, or that target a read-only area,
/// get their response code without anything being sent.
pub(crate) struct WriteStep {
    request: WriteRequest,
    sink: ExecutionSink<WriteResponse>,
    state: ExchangeState,
    codes: Vec<ResponseCode>,
}

impl WriteStep {
    pub(crate) fn new(request: WriteRequest, sink: ExecutionSink<WriteResponse>) -> Self {
        let codes = Vec::with_capacity(request.len());
        Self {
            request,
            sink,
            state: ExchangeState::SendRequest,
            codes,
        }
    }

    fn current_item(&self) -> PlcResult<(&ModbusField, &PlcValue)> {
        let item = self
            .request
            .items()
            .get(self.codes.len())
            .ok_or_else(|| PlcError::internal("No write item left"))?;
        let field = downcast_field::<ModbusField>(item.item.field.as_ref())?;
        Ok((field, &item.value))
    }

    fn run(&mut self, context: &mut ConnectionContext) -> PlcResult<StepOutcome> {
        match self.state {
            ExchangeState::SendRequest => {
                while self.codes.len() < self.request.len() {
                    let (field, value) = self.current_item()?;
                    match write_request_for(field, value) {
                        Ok(request) => {
                            let transaction_id = send_request(context, &request)?;
                            self.state = ExchangeState::AwaitResponse { transaction_id };
                            return Ok(StepOutcome::Progress);
                        }
                        Err(code) => self.codes.push(code),
                    }
                }
                self.finish()
            }
            ExchangeState::AwaitResponse { transaction_id } => {
                let Some(adu) = poll_response(context, transaction_id)? else {
                    return Ok(StepOutcome::Pending);
                };
                context
                    .configuration_mut::<ModbusSession>()?
                    .end_transaction(transaction_id);
                let (field, _) = self.current_item()?;
                let code = write_result(context.id(), field, &adu.response);
                self.codes.push(code);
                self.state = ExchangeState::SendRequest;
                if self.codes.len() == self.request.len() {
                    return self.finish();
                }
                Ok(StepOutcome::Progress)
            }
            ExchangeState::Finished => Ok(StepOutcome::Complete),
        }
    }

    fn finish(&mut self) -> PlcResult<StepOutcome> {
        let codes = std::mem::take(&mut self.codes);
        self.sink.complete(WriteResponse::assemble(&self.request, codes)?)?;
        self.state = ExchangeState::Finished;
        Ok(StepOutcome::Complete)
    }
}

impl TaskStep for WriteStep {
    fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
        let result = self.run(context);
        if result.is_err() {
            abandon(context, self.state);
        }
        result.into()
    }

    fn state_name(&self) -> &'static str {
        self.state.as_str()
    }
}

/// Release the transaction of a Task that is about to be abandoned
fn abandon(context: &mut ConnectionContext, state: ExchangeState) {
    if let ExchangeState::AwaitResponse { transaction_id } = state {
        if let Ok(session) = context.configuration_mut::<ModbusSession>() {
            session.end_transaction(transaction_id);
        }
    }
}

fn read_request_for(field: &ModbusField) -> ModbusRequest {
    let address = field.wire_address();
    let quantity = field.wire_quantity() as u16;
    match field.area {
        ModbusArea::Coil => ModbusRequest::ReadCoils { address, quantity },
        ModbusArea::DiscreteInput => ModbusRequest::ReadDiscreteInputs { address, quantity },
        ModbusArea::HoldingRegister => ModbusRequest::ReadHoldingRegisters { address, quantity },
        ModbusArea::InputRegister => ModbusRequest::ReadInputRegisters { address, quantity },
    }
}

/// Build the request writing `value`, or the code answering the item right away
fn write_request_for(field: &ModbusField, value: &PlcValue) -> Result<ModbusRequest, ResponseCode> {
    let address = field.wire_address();
    let quantity = field.wire_quantity();
    match field.area {
        ModbusArea::DiscreteInput | ModbusArea::InputRegister => Err(ResponseCode::AccessDenied),
        ModbusArea::Coil if quantity > MAX_WRITE_BITS => Err(ResponseCode::InvalidAddress),
        ModbusArea::HoldingRegister if quantity > MAX_WRITE_REGISTERS => {
            Err(ResponseCode::InvalidAddress)
        }
        ModbusArea::Coil => encode_bits(field, value)
            .map(|values| ModbusRequest::WriteMultipleCoils {
                address,
                quantity: quantity as u16,
                values,
            })
            .map_err(|_| ResponseCode::InvalidDatatype),
        ModbusArea::HoldingRegister => encode_registers(field, value)
            .map(|values| ModbusRequest::WriteMultipleRegisters {
                address,
                quantity: quantity as u16,
                values,
            })
            .map_err(|_| ResponseCode::InvalidDatatype),
    }
}

/// Encode and send a request under a fresh transaction id
fn send_request(context: &mut ConnectionContext, request: &ModbusRequest) -> PlcResult<u16> {
    let session = context.configuration_mut::<ModbusSession>()?;
    let unit_id = session.unit_identifier();
    let transaction_id = session.begin_transaction()?;
    let sent = request
        .to_adu(transaction_id, unit_id)
        .and_then(|adu| context.transport().send_message(&adu));
    if let Err(e) = sent {
        context
            .configuration_mut::<ModbusSession>()?
            .end_transaction(transaction_id);
        return Err(e);
    }
    log::trace!(
        "Modbus connection {}: sent transaction {} (function 0x{:02X})",
        context.id(),
        transaction_id,
        request.function_code()
    );
    Ok(transaction_id)
}

/// Take the response to `transaction_id` off the transport, if it arrived
///
/// Frames answering another Task's transaction are parked for it, frames
/// nobody waits for are dropped. A frame for `transaction_id` that cannot
/// be decoded fails the caller with `PlcError::Parse`.
fn poll_response(
    context: &mut ConnectionContext,
    transaction_id: u16,
) -> PlcResult<Option<ModbusAdu>> {
    if let Some(parked) = context
        .configuration_mut::<ModbusSession>()?
        .take_parked(transaction_id)
    {
        return parked.map(Some);
    }

    context.transport().fill_receive_buffer()?;
    loop {
        let Some(frame) = context
            .transport()
            .receive_buffer()
            .select(MODBUS_TCP_HEADER_SIZE, select_modbus_tcp)?
        else {
            return Ok(None);
        };
        let id = context.id();
        let Some(received) = frame_transaction_id(&frame) else {
            log::warn!("Modbus connection {}: dropping frame without MBAP header", id);
            continue;
        };
        // A broken answer still belongs to the transaction it names
        let decoded = ModbusAdu::decode(frame);
        if received == transaction_id {
            return decoded.map(Some);
        }

        let session = context.configuration_mut::<ModbusSession>()?;
        if session.is_outstanding(received) {
            session.park(received, decoded);
        } else {
            log::warn!(
                "Modbus connection {}: dropping response to unknown transaction {}",
                id,
                received
            );
        }
    }
}

fn frame_transaction_id(frame: &ReadBuffer) -> Option<u16> {
    Some(u16::from_be_bytes([
        frame.peek_byte(0).ok()?,
        frame.peek_byte(1).ok()?,
    ]))
}

fn read_result(
    id: ConnectionId,
    field: &ModbusField,
    response: &ModbusResponse,
) -> (ResponseCode, Option<PlcValue>) {
    let expected = read_request_for(field).function_code();
    let decoded = match response {
        ModbusResponse::Exception { exception_code, .. } => {
            return (exception_response_code(id, field, *exception_code), None);
        }
        ModbusResponse::Bits {
            function_code,
            data,
        } if *function_code == expected => decode_bits(field, data),
        ModbusResponse::Registers {
            function_code,
            data,
        } if *function_code == expected => decode_registers(field, data),
        other => Err(PlcError::Parse(format!(
            "function 0x{:02X} answered with function 0x{:02X}",
            expected,
            other.function_code()
        ))),
    };
    match decoded {
        Ok(value) => (ResponseCode::Ok, Some(value)),
        Err(e) => {
            log::warn!("Modbus connection {}: reading {}: {}", id, field, e);
            (ResponseCode::InvalidData, None)
        }
    }
}

fn write_result(id: ConnectionId, field: &ModbusField, response: &ModbusResponse) -> ResponseCode {
    match response {
        ModbusResponse::Exception { exception_code, .. } => {
            exception_response_code(id, field, *exception_code)
        }
        ModbusResponse::WriteAck {
            address, quantity, ..
        } if *address == field.wire_address() && *quantity as usize == field.wire_quantity() => {
            ResponseCode::Ok
        }
        other => {
            log::warn!(
                "Modbus connection {}: unexpected answer to writing {}: {:?}",
                id,
                field,
                other
            );
            ResponseCode::InvalidData
        }
    }
}

fn exception_response_code(id: ConnectionId, field: &ModbusField, exception_code: u8) -> ResponseCode {
    let exception = ExceptionCode::from(exception_code);
    log::warn!("Modbus connection {}: {} answered {}", id, field, exception);
    match exception {
        ExceptionCode::IllegalFunction => ResponseCode::Unsupported,
        ExceptionCode::IllegalDataAddress => ResponseCode::InvalidAddress,
        ExceptionCode::IllegalDataValue => ResponseCode::InvalidData,
        ExceptionCode::Acknowledge | ExceptionCode::ServerDeviceBusy => ResponseCode::RemoteBusy,
        ExceptionCode::ServerDeviceFailure
        | ExceptionCode::MemoryParityError
        | ExceptionCode::GatewayPathUnavailable
        | ExceptionCode::GatewayTargetNoResponse
        | ExceptionCode::Unknown(_) => ResponseCode::RemoteError,
    }
}
