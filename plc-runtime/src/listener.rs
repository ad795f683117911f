//! System lifecycle callbacks

use crate::connection::ConnectionId;
use crate::error::PlcError;
use crate::task::TaskKind;

/// Observer of connection lifecycle events
///
/// All methods default to doing nothing.
#[cfg_attr(test, mockall::automock)]
pub trait SystemListener {
    fn on_connect_success(&mut self, _connection: ConnectionId) {}

    fn on_connect_failure(&mut self, _connection: ConnectionId, _error: &PlcError) {}

    fn on_disconnect_success(&mut self, _connection: ConnectionId) {}

    fn on_disconnect_failure(&mut self, _connection: ConnectionId, _error: &PlcError) {}

    /// A read or write Task was abandoned
    fn on_loop_failure(&mut self, _connection: ConnectionId, _task: TaskKind, _error: &PlcError) {}
}
