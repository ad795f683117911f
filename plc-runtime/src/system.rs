//! The system loop: driver/transport registries and the Task scheduler

use crate::connection::{Connection, ConnectionId, ConnectionState, TaskReport};
use crate::connection_string::ConnectionString;
use crate::context::ConnectionContext;
use crate::driver::Driver;
use crate::error::{PlcError, PlcResult};
use crate::execution::{Execution, ReadExecution, WriteExecution};
use crate::listener::SystemListener;
use crate::request::{ReadRequest, WriteRequest};
use crate::task::TaskKind;
use plc_core::PlcValue;
use plc_transport::TransportFactory;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Single-threaded runtime owning every connection
///
/// Nothing happens in the background: each call to `tick` steps every
/// active Task of every connection exactly once, and callers keep ticking
/// until the Executions they wait for are finished.
///
/// # Example
///
/// ```ignore
/// let mut system = PlcSystem::new();
/// system.add_driver(SimulatedDriver::new());
/// system.add_transport(LoopbackTransportFactory::new());
///
/// let id = system.connect("simulated://plc")?;
/// system.poll_until(10, |s| s.is_connected(id));
/// ```
#[derive(Default)]
pub struct PlcSystem {
    drivers: Vec<Rc<dyn Driver>>,
    transports: Vec<Box<dyn TransportFactory>>,
    connections: BTreeMap<ConnectionId, Connection>,
    next_connection_id: ConnectionId,
    listener: Option<Box<dyn SystemListener>>,
    ticks: u64,
}

impl PlcSystem {
    /// Create a system with empty registries
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a protocol driver
    ///
    /// A driver registered later under the same protocol code takes precedence.
    pub fn add_driver(&mut self, driver: impl Driver + 'static) {
        log::debug!(
            "Registered driver {} ({})",
            driver.protocol_code(),
            driver.protocol_name()
        );
        self.drivers.insert(0, Rc::new(driver));
    }

    /// Register a transport factory
    pub fn add_transport(&mut self, factory: impl TransportFactory + 'static) {
        log::debug!(
            "Registered transport {} ({})",
            factory.transport_code(),
            factory.transport_name()
        );
        self.transports.insert(0, Box::new(factory));
    }

    /// Install the lifecycle listener
    pub fn set_listener(&mut self, listener: Box<dyn SystemListener>) {
        self.listener = Some(listener);
    }

    /// Look up a driver by protocol code
    pub fn driver(&self, protocol_code: &str) -> Option<&Rc<dyn Driver>> {
        self.drivers
            .iter()
            .find(|driver| driver.protocol_code() == protocol_code)
    }

    /// Look up a transport factory by transport code
    pub fn transport(&self, transport_code: &str) -> Option<&dyn TransportFactory> {
        self.transports
            .iter()
            .find(|factory| factory.transport_code() == transport_code)
            .map(|factory| factory.as_ref())
    }

    /// Number of scheduler ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Create a connection and spawn its connect Task
    ///
    /// The connection is usable once `is_connected` reports `true`.
    ///
    /// # Errors
    ///
    /// Registry and connection-string errors (`NoDriverAvailable`,
    /// `NoTransportAvailable`, `InvalidConnectionString`, `UnknownDriver`,
    /// `UnspecifiedTransport`, `UnknownTransport`) plus whatever the driver
    /// and transport factory report while configuring.
    pub fn connect(&mut self, connection_string: &str) -> PlcResult<ConnectionId> {
        if self.drivers.is_empty() {
            return Err(PlcError::NoDriverAvailable);
        }
        if self.transports.is_empty() {
            return Err(PlcError::NoTransportAvailable);
        }
        let connection_string = ConnectionString::parse(connection_string)?;

        let driver = self
            .driver(&connection_string.protocol_code)
            .cloned()
            .ok_or_else(|| PlcError::UnknownDriver(connection_string.protocol_code.clone()))?;

        let transport_code = match connection_string.transport_code.as_deref() {
            Some(code) => code,
            None => driver.default_transport_code().ok_or_else(|| {
                PlcError::UnspecifiedTransport(connection_string.protocol_code.clone())
            })?,
        };
        let factory = self
            .transport(transport_code)
            .ok_or_else(|| PlcError::UnknownTransport(transport_code.to_string()))?;

        let transport = factory.create(
            &connection_string.transport_connect_info,
            driver.default_port(),
            &connection_string.parameters,
        )?;
        let configuration = driver.configure(&connection_string.parameters)?;
        let connect_task = driver.connect()?;

        self.next_connection_id += 1;
        let id = self.next_connection_id;
        let context = ConnectionContext::new(id, transport, configuration);
        let mut connection = Connection::new(context, connection_string, driver);
        connection.transition(ConnectionState::Connecting)?;
        connection.spawn(connect_task);

        log::debug!("Connection {}: created for {}", id, connection.connection_string());
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Spawn the disconnect Task of a connected connection
    ///
    /// Asking again while the disconnect is underway is a no-op.
    pub fn disconnect(&mut self, id: ConnectionId) -> PlcResult<()> {
        let connection = self.connection_mut(id)?;
        match connection.state() {
            ConnectionState::Connected => {}
            ConnectionState::Disconnecting => return Ok(()),
            state => {
                return Err(PlcError::NotConnected(format!(
                    "Connection {} is {}",
                    id, state
                )));
            }
        }
        let task = connection.driver().disconnect()?;
        connection.request_disconnect();
        connection.transition(ConnectionState::Disconnecting)?;
        connection.spawn(task);
        Ok(())
    }

    /// Remove a connection that reached `Disconnected`
    pub fn remove_connection(&mut self, id: ConnectionId) -> PlcResult<Connection> {
        let state = self.connection(id)?.state();
        if state != ConnectionState::Disconnected {
            return Err(PlcError::InvalidArgument(format!(
                "Connection {} cannot be removed while {}",
                id, state
            )));
        }
        self.connections
            .remove(&id)
            .ok_or(PlcError::UnknownConnection(id))
    }

    pub fn connection(&self, id: ConnectionId) -> PlcResult<&Connection> {
        self.connections
            .get(&id)
            .ok_or(PlcError::UnknownConnection(id))
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> PlcResult<&mut Connection> {
        self.connections
            .get_mut(&id)
            .ok_or(PlcError::UnknownConnection(id))
    }

    /// Ids of all connections, oldest first
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Check if a connection exists and is in `Connected`
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|connection| connection.state() == ConnectionState::Connected)
    }

    /// Check if a connection exists and is back in `Disconnected`
    pub fn is_disconnected(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|connection| connection.state() == ConnectionState::Disconnected)
    }

    /// Build a read request by parsing every address with the connection's driver
    pub fn read_request(&self, id: ConnectionId, addresses: &[&str]) -> PlcResult<ReadRequest> {
        let connection = self.connection(id)?;
        let mut request = ReadRequest::new(id);
        for address in addresses {
            request.add_item(*address, connection.parse_address(address)?);
        }
        Ok(request)
    }

    /// Build a write request by parsing every address with the connection's driver
    pub fn write_request(
        &self,
        id: ConnectionId,
        items: &[(&str, PlcValue)],
    ) -> PlcResult<WriteRequest> {
        let connection = self.connection(id)?;
        let mut request = WriteRequest::new(id);
        for (address, value) in items {
            request.add_item(*address, connection.parse_address(address)?, value.clone());
        }
        Ok(request)
    }

    /// Spawn the Task serving a read request
    pub fn read(&mut self, request: ReadRequest) -> PlcResult<ReadExecution> {
        let connection = self.ready_connection(request.connection_id())?;
        let (mut execution, sink) = Execution::new(request.connection_id(), request);
        let task = connection.driver().read(execution.request(), sink.clone())?;
        let task_id = connection.spawn(task.with_execution(Box::new(sink)));
        execution.set_task_id(task_id);
        Ok(execution)
    }

    /// Spawn the Task serving a write request
    pub fn write(&mut self, request: WriteRequest) -> PlcResult<WriteExecution> {
        let connection = self.ready_connection(request.connection_id())?;
        let (mut execution, sink) = Execution::new(request.connection_id(), request);
        let task = connection.driver().write(execution.request(), sink.clone())?;
        let task_id = connection.spawn(task.with_execution(Box::new(sink)));
        execution.set_task_id(task_id);
        Ok(execution)
    }

    fn ready_connection(&mut self, id: ConnectionId) -> PlcResult<&mut Connection> {
        let connection = self.connection_mut(id)?;
        if !connection.state().is_ready() || connection.is_disconnect_requested() {
            return Err(PlcError::NotConnected(format!(
                "Connection {} is {}",
                id,
                connection.state()
            )));
        }
        Ok(connection)
    }

    /// Run one scheduler pass over every connection
    ///
    /// A failing Task is reported and dropped; it never stops the other
    /// Tasks or connections from being serviced in the same pass.
    pub fn tick(&mut self) {
        self.ticks += 1;
        log::trace!("Tick {} over {} connections", self.ticks, self.connections.len());
        for (id, connection) in self.connections.iter_mut() {
            if connection.tasks().is_empty() {
                continue;
            }
            let reports = connection.tick();
            if let Some(listener) = self.listener.as_mut() {
                for report in &reports {
                    notify(listener.as_mut(), *id, report);
                }
            }
        }
    }

    /// Tick until `done` holds or `max_ticks` passes ran
    ///
    /// # Returns
    ///
    /// `true` if `done` held before the budget ran out
    pub fn poll_until<F>(&mut self, max_ticks: usize, mut done: F) -> bool
    where
        F: FnMut(&PlcSystem) -> bool,
    {
        for _ in 0..max_ticks {
            if done(self) {
                return true;
            }
            self.tick();
        }
        done(self)
    }
}

fn notify(listener: &mut dyn SystemListener, id: ConnectionId, report: &TaskReport) {
    match (report.kind, &report.error) {
        (TaskKind::Connect, None) => listener.on_connect_success(id),
        (TaskKind::Connect, Some(error)) => listener.on_connect_failure(id, error),
        (TaskKind::Disconnect, None) => listener.on_disconnect_success(id),
        (TaskKind::Disconnect, Some(error)) => listener.on_disconnect_failure(id, error),
        (kind, Some(error)) => listener.on_loop_failure(id, kind, error),
        (_, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConnectionContext;
    use crate::execution::ExecutionSink;
    use crate::listener::MockSystemListener;
    use crate::request::{PlcField, downcast_field};
    use crate::response::{ReadResponse, WriteResponse};
    use crate::task::{StepOutcome, Task, TaskStep};
    use plc_core::{ResponseCode, ReturnCode};
    use plc_transport::{LoopbackTransportFactory, Parameters};
    use std::any::Any;
    use std::cell::RefCell;

    /// Address `steps` stands for a read taking that many steps; `fail`
    /// makes the read Task fail
    #[derive(Debug)]
    struct Steps(Option<u32>);

    impl PlcField for Steps {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct TestDriver {
        default_transport: Option<&'static str>,
    }

    impl TestDriver {
        fn new() -> Self {
            Self {
                default_transport: Some("loopback"),
            }
        }
    }

    struct ConnectStep;

    impl TaskStep for ConnectStep {
        fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
            if context.is_connected() {
                return StepOutcome::Failed(PlcError::AlreadyConnected);
            }
            if let Err(e) = context.transport().open() {
                return StepOutcome::Failed(e);
            }
            context.set_connected(true);
            StepOutcome::Complete
        }

        fn state_name(&self) -> &'static str {
            "CONNECT"
        }
    }

    struct DisconnectStep;

    impl TaskStep for DisconnectStep {
        fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
            if context.running_task_count() > 1 {
                return StepOutcome::Pending;
            }
            if let Err(e) = context.transport().close() {
                return StepOutcome::Failed(e);
            }
            context.set_connected(false);
            StepOutcome::Complete
        }

        fn state_name(&self) -> &'static str {
            "WAIT_TASKS_FINISHED"
        }
    }

    struct ReadStep {
        remaining: u32,
        request: ReadRequest,
        sink: ExecutionSink<ReadResponse>,
    }

    impl ReadStep {
        fn finish(&self) -> PlcResult<StepOutcome> {
            let values = self
                .request
                .items()
                .iter()
                .enumerate()
                .map(|(i, _)| (ResponseCode::Ok, Some(PlcValue::Int(i as i16))))
                .collect();
            self.sink.complete(ReadResponse::assemble(&self.request, values)?)?;
            Ok(StepOutcome::Complete)
        }
    }

    impl TaskStep for ReadStep {
        fn step(&mut self, _context: &mut ConnectionContext) -> StepOutcome {
            for item in self.request.items() {
                match downcast_field::<Steps>(item.field.as_ref()) {
                    Ok(Steps(None)) => {
                        return StepOutcome::Failed(PlcError::InvalidAddress(item.address.clone()));
                    }
                    Ok(_) => {}
                    Err(e) => return StepOutcome::Failed(e),
                }
            }
            if self.remaining > 1 {
                self.remaining -= 1;
                return StepOutcome::Progress;
            }
            self.finish().into()
        }

        fn state_name(&self) -> &'static str {
            "READ"
        }
    }

    impl Driver for TestDriver {
        fn protocol_code(&self) -> &'static str {
            "test"
        }

        fn protocol_name(&self) -> &'static str {
            "Test protocol"
        }

        fn default_transport_code(&self) -> Option<&'static str> {
            self.default_transport
        }

        fn configure(&self, _parameters: &Parameters) -> PlcResult<Box<dyn Any>> {
            Ok(Box::new(()))
        }

        fn parse_address(&self, address: &str) -> PlcResult<Rc<dyn PlcField>> {
            match address {
                "fail" => Ok(Rc::new(Steps(None))),
                steps => steps
                    .parse()
                    .map(|n| Rc::new(Steps(Some(n))) as Rc<dyn PlcField>)
                    .map_err(|_| PlcError::InvalidAddress(address.to_string())),
            }
        }

        fn connect(&self) -> PlcResult<Task> {
            Ok(Task::new(TaskKind::Connect, ConnectStep))
        }

        fn disconnect(&self) -> PlcResult<Task> {
            Ok(Task::new(TaskKind::Disconnect, DisconnectStep))
        }

        fn read(&self, request: &ReadRequest, sink: ExecutionSink<ReadResponse>) -> PlcResult<Task> {
            let remaining = request
                .items()
                .iter()
                .filter_map(|item| downcast_field::<Steps>(item.field.as_ref()).ok()?.0)
                .max()
                .unwrap_or(1);
            Ok(Task::new(
                TaskKind::Read,
                ReadStep {
                    remaining,
                    request: request.clone(),
                    sink,
                },
            ))
        }

        fn write(
            &self,
            _request: &WriteRequest,
            _sink: ExecutionSink<WriteResponse>,
        ) -> PlcResult<Task> {
            Err(PlcError::NotImplemented("write".to_string()))
        }
    }

    fn system() -> PlcSystem {
        let mut system = PlcSystem::new();
        system.add_driver(TestDriver::new());
        system.add_transport(LoopbackTransportFactory::new());
        system
    }

    fn connected(system: &mut PlcSystem) -> ConnectionId {
        let id = system.connect("test://device").unwrap();
        assert!(system.poll_until(5, |s| s.is_connected(id)));
        id
    }

    #[test]
    fn test_connect_registry_errors() {
        let mut empty = PlcSystem::new();
        assert!(matches!(empty.connect("test://x"), Err(PlcError::NoDriverAvailable)));
        empty.add_driver(TestDriver::new());
        assert!(matches!(empty.connect("test://x"), Err(PlcError::NoTransportAvailable)));

        let mut system = system();
        let code = |r: PlcResult<ConnectionId>| r.unwrap_err().return_code();
        assert_eq!(code(system.connect("")), ReturnCode::InvalidConnectionString);
        assert_eq!(code(system.connect("s7://x")), ReturnCode::UnknownDriver);
        assert_eq!(code(system.connect("test:udp://x")), ReturnCode::UnknownTransport);

        let mut system = PlcSystem::new();
        system.add_driver(TestDriver {
            default_transport: None,
        });
        system.add_transport(LoopbackTransportFactory::new());
        assert_eq!(code(system.connect("test://x")), ReturnCode::UnspecifiedTransport);
        assert!(system.connect("test:loopback://x").is_ok());
    }

    #[test]
    fn test_connect_lifecycle_and_listener() {
        let mut listener = MockSystemListener::new();
        listener
            .expect_on_connect_success()
            .withf(|id| *id == 1)
            .times(1)
            .return_const(());
        listener
            .expect_on_disconnect_success()
            .withf(|id| *id == 1)
            .times(1)
            .return_const(());

        let mut system = system();
        system.set_listener(Box::new(listener));
        let id = system.connect("test://device").unwrap();
        assert_eq!(system.connection(id).unwrap().state(), ConnectionState::Connecting);
        assert!(!system.connection(id).unwrap().is_connected());

        system.tick();
        let connection = system.connection(id).unwrap();
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert!(connection.is_connected());
        assert_eq!(connection.running_task_count(), 0);

        system.disconnect(id).unwrap();
        assert_eq!(system.connection(id).unwrap().state(), ConnectionState::Disconnecting);
        system.tick();
        assert!(system.is_disconnected(id));
        assert!(!system.connection(id).unwrap().is_connected());
    }

    #[test]
    fn test_read_completes_in_request_order() {
        let mut system = system();
        let id = connected(&mut system);

        let request = system.read_request(id, &["3", "1", "2"]).unwrap();
        let execution = system.read(request).unwrap();
        system.tick();
        system.tick();
        assert!(!execution.is_finished());
        system.tick();
        assert!(execution.is_finished());

        let response = execution.take_response().unwrap();
        let addresses: Vec<_> = response.items().iter().map(|i| i.item.address.as_str()).collect();
        assert_eq!(addresses, ["3", "1", "2"]);
        assert_eq!(response.value("2"), Some(&PlcValue::Int(2)));
        assert_eq!(system.connection(id).unwrap().running_task_count(), 0);
    }

    #[test]
    fn test_disconnect_waits_for_running_tasks() {
        let mut system = system();
        let id = connected(&mut system);

        let execution = system.read(system.read_request(id, &["3"]).unwrap()).unwrap();
        system.disconnect(id).unwrap();
        assert_eq!(system.connection(id).unwrap().running_task_count(), 2);

        // New requests are refused once a disconnect is underway
        let late = system.read_request(id, &["1"]).unwrap();
        assert!(matches!(system.read(late), Err(PlcError::NotConnected(_))));

        system.tick();
        system.tick();
        assert!(system.connection(id).unwrap().is_connected());

        // The read finishes this tick, but is only removed after every Task stepped
        system.tick();
        assert!(execution.is_finished());
        let connection = system.connection(id).unwrap();
        assert!(connection.is_connected());
        assert_eq!(connection.running_task_count(), 1);

        system.tick();
        let connection = system.connection(id).unwrap();
        assert!(!connection.is_connected());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(connection.running_task_count(), 0);
    }

    #[test]
    fn test_failed_task_does_not_stop_the_loop() {
        let failures = Rc::new(RefCell::new(Vec::new()));

        let mut listener = MockSystemListener::new();
        listener.expect_on_connect_success().times(2).return_const(());
        listener
            .expect_on_loop_failure()
            .withf(|_, kind, error| *kind == TaskKind::Read && error.return_code() == ReturnCode::InvalidAddress)
            .times(1)
            .return_const(());

        let mut system = system();
        system.set_listener(Box::new(listener));
        let first = connected(&mut system);
        let second = connected(&mut system);

        let sink = Rc::clone(&failures);
        system
            .connection_mut(first)
            .unwrap()
            .set_failure_callback(move |id, kind, error| {
                sink.borrow_mut().push((id, kind, error.return_code()));
            });

        let failing = system.read(system.read_request(first, &["fail"]).unwrap()).unwrap();
        let healthy = system.read(system.read_request(second, &["1"]).unwrap()).unwrap();
        system.tick();

        assert_eq!(failing.failure_code(), Some(ReturnCode::InvalidAddress));
        assert!(failing.take_response().is_none());
        assert!(healthy.take_response().is_some());
        assert_eq!(
            failures.borrow().as_slice(),
            &[(first, TaskKind::Read, ReturnCode::InvalidAddress)]
        );

        let connection = system.connection(first).unwrap();
        assert_eq!(connection.running_task_count(), 0);
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(connection.statistics().tasks_failed, 1);
    }

    #[test]
    fn test_requests_need_a_connected_connection() {
        let mut system = system();
        let id = system.connect("test://device").unwrap();
        let request = system.read_request(id, &["1"]).unwrap();
        assert!(matches!(system.read(request), Err(PlcError::NotConnected(_))));
        assert!(matches!(system.disconnect(id), Err(PlcError::NotConnected(_))));
        assert!(matches!(system.connection(99), Err(PlcError::UnknownConnection(99))));
        assert!(matches!(
            system.read_request(id, &["x"]),
            Err(PlcError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_remove_only_disconnected_connections() {
        let mut system = system();
        let id = connected(&mut system);
        assert!(system.remove_connection(id).is_err());

        system.disconnect(id).unwrap();
        assert!(system.poll_until(5, |s| s.is_disconnected(id)));
        let removed = system.remove_connection(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(system.connection_ids().is_empty());
    }

    #[test]
    fn test_write_errors_surface_at_spawn() {
        let mut system = system();
        let id = connected(&mut system);
        let request = system.write_request(id, &[("1", PlcValue::Bool(true))]).unwrap();
        assert!(matches!(system.write(request), Err(PlcError::NotImplemented(_))));
        assert_eq!(system.connection(id).unwrap().running_task_count(), 0);
    }
}
