//! Connections and their lifecycle state machine

use crate::connection_string::ConnectionString;
use crate::context::ConnectionContext;
use crate::driver::Driver;
use crate::error::{PlcError, PlcResult};
use crate::request::PlcField;
use crate::statistics::ConnectionStatistics;
use crate::task::{StepOutcome, Task, TaskId, TaskKind};
use std::fmt;
use std::rc::Rc;

/// Identifier of a connection within its `PlcSystem`
pub type ConnectionId = u64;

/// Callback fired for every abandoned Task of a connection
pub type FailureCallback = Box<dyn FnMut(ConnectionId, TaskKind, &PlcError)>;

/// Connection lifecycle state
///
/// # State Transitions
/// ```text
/// Disconnected -> Connecting     (connect Task spawned)
/// Connecting -> Connected        (connect Task completed)
/// Connecting -> Disconnected     (connect Task failed)
/// Connected -> Disconnecting     (disconnect Task spawned)
/// Disconnecting -> Disconnected  (disconnect Task completed)
/// Disconnecting -> Connected     (disconnect Task failed, link still up)
/// ```
///
/// A connection that went back to `Disconnected` is not reconnected;
/// callers open a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnecting => "DISCONNECTING",
        }
    }

    /// Check if read and write requests are accepted
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Validate state transition
    ///
    /// # Returns
    /// `Ok(())` if transition is valid, `Err` otherwise
    pub fn validate_transition(&self, new_state: ConnectionState) -> PlcResult<()> {
        use ConnectionState::*;
        let valid = matches!(
            (*self, new_state),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnecting)
                | (Disconnecting, Disconnected)
                | (Disconnecting, Connected)
        );
        if valid {
            Ok(())
        } else {
            Err(PlcError::internal(format!(
                "Invalid state transition: {} -> {}",
                self.as_str(),
                new_state.as_str()
            )))
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a Task that left the connection during a tick
#[derive(Debug)]
pub(crate) struct TaskReport {
    pub kind: TaskKind,
    pub error: Option<PlcError>,
}

/// One device connection and the Tasks running on it
pub struct Connection {
    context: ConnectionContext,
    connection_string: ConnectionString,
    driver: Rc<dyn Driver>,
    tasks: Vec<Task>,
    state: ConnectionState,
    statistics: ConnectionStatistics,
    failure_callback: Option<FailureCallback>,
    next_task_id: TaskId,
}

impl Connection {
    pub(crate) fn new(
        context: ConnectionContext,
        connection_string: ConnectionString,
        driver: Rc<dyn Driver>,
    ) -> Self {
        Self {
            context,
            connection_string,
            driver,
            tasks: Vec::new(),
            state: ConnectionState::Disconnected,
            statistics: ConnectionStatistics::new(),
            failure_callback: None,
            next_task_id: 1,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.context.id()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the driver reported the link as established
    pub fn is_connected(&self) -> bool {
        self.context.is_connected()
    }

    pub fn is_disconnect_requested(&self) -> bool {
        self.context.is_disconnect_requested()
    }

    pub fn running_task_count(&self) -> usize {
        self.context.running_task_count()
    }

    /// Active Tasks in insertion order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    pub fn driver(&self) -> &Rc<dyn Driver> {
        &self.driver
    }

    pub fn statistics(&self) -> &ConnectionStatistics {
        &self.statistics
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ConnectionContext {
        &mut self.context
    }

    /// Register a callback fired whenever a Task of this connection fails
    pub fn set_failure_callback<F>(&mut self, callback: F)
    where
        F: FnMut(ConnectionId, TaskKind, &PlcError) + 'static,
    {
        self.failure_callback = Some(Box::new(callback));
    }

    /// Parse an address with this connection's driver
    pub fn parse_address(&self, address: &str) -> PlcResult<Rc<dyn PlcField>> {
        self.driver.parse_address(address)
    }

    /// Hand a Task to the connection; it is stepped from the next tick on
    pub fn spawn(&mut self, mut task: Task) -> TaskId {
        let id = self.next_task_id;
        self.next_task_id += 1;
        task.set_id(id);
        log::debug!(
            "Connection {}: spawned {} task {} in state {}",
            self.id(),
            task.kind(),
            id,
            task.state_name()
        );
        self.tasks.push(task);
        self.context.task_spawned();
        self.statistics.increment_tasks_spawned();
        id
    }

    pub(crate) fn transition(&mut self, new_state: ConnectionState) -> PlcResult<()> {
        self.state.validate_transition(new_state)?;
        log::debug!(
            "Connection {}: {} -> {}",
            self.id(),
            self.state,
            new_state
        );
        self.state = new_state;
        Ok(())
    }

    pub(crate) fn request_disconnect(&mut self) {
        self.context.set_disconnect_requested(true);
    }

    /// Step every active Task once, then drop finished and abandoned ones
    pub(crate) fn tick(&mut self) -> Vec<TaskReport> {
        self.statistics.increment_ticks_served();
        let id = self.context.id();
        let mut reports = Vec::new();

        for task in self.tasks.iter_mut() {
            match task.run_step(&mut self.context) {
                StepOutcome::Progress | StepOutcome::Pending => {}
                StepOutcome::Complete => {
                    log::debug!("Connection {}: {} task {} completed", id, task.kind(), task.id());
                    self.statistics.increment_tasks_completed();
                    reports.push(TaskReport {
                        kind: task.kind(),
                        error: None,
                    });
                }
                StepOutcome::Failed(error) => {
                    log::warn!(
                        "Connection {}: {} task {} failed in state {}: {}",
                        id,
                        task.kind(),
                        task.id(),
                        task.state_name(),
                        error
                    );
                    self.statistics.increment_tasks_failed();
                    if let Some(callback) = self.failure_callback.as_mut() {
                        callback(id, task.kind(), &error);
                    }
                    reports.push(TaskReport {
                        kind: task.kind(),
                        error: Some(error),
                    });
                }
            }
        }

        let before = self.tasks.len();
        self.tasks.retain(|task| !task.is_completed() && !task.is_failed());
        self.context.tasks_removed(before - self.tasks.len());

        for report in &reports {
            self.apply_report(report);
        }
        reports
    }

    /// Move the lifecycle state along after a connect or disconnect Task ended
    fn apply_report(&mut self, report: &TaskReport) {
        let next = match (report.kind, &report.error) {
            (TaskKind::Connect, None) => ConnectionState::Connected,
            (TaskKind::Connect, Some(_)) => ConnectionState::Disconnected,
            (TaskKind::Disconnect, None) => ConnectionState::Disconnected,
            (TaskKind::Disconnect, Some(_)) if self.context.is_connected() => {
                ConnectionState::Connected
            }
            (TaskKind::Disconnect, Some(_)) => ConnectionState::Disconnected,
            (TaskKind::Read | TaskKind::Write, _) => return,
        };
        if report.kind == TaskKind::Disconnect {
            self.context.set_disconnect_requested(false);
        }
        if let Err(e) = self.transition(next) {
            log::warn!("Connection {}: {}", self.id(), e);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("connection_string", &self.connection_string.to_string())
            .field("driver", &self.driver.protocol_code())
            .field("state", &self.state)
            .field("tasks", &self.tasks)
            .field("statistics", &self.statistics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use ConnectionState::*;
        assert!(Disconnected.validate_transition(Connecting).is_ok());
        assert!(Connecting.validate_transition(Connected).is_ok());
        assert!(Connecting.validate_transition(Disconnected).is_ok());
        assert!(Connected.validate_transition(Disconnecting).is_ok());
        assert!(Disconnecting.validate_transition(Disconnected).is_ok());
        assert!(Disconnecting.validate_transition(Connected).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        use ConnectionState::*;
        assert!(Disconnected.validate_transition(Connected).is_err());
        assert!(Connected.validate_transition(Connecting).is_err());
        assert!(Connected.validate_transition(Disconnected).is_err());
        assert!(Disconnected.validate_transition(Disconnecting).is_err());
        assert!(Connected.validate_transition(Connected).is_err());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ConnectionState::Disconnecting.to_string(), "DISCONNECTING");
        assert!(ConnectionState::Connected.is_ready());
        assert!(!ConnectionState::Connecting.is_ready());
    }
}
