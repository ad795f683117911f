//! State a connection shares with the Tasks it runs

use crate::connection::ConnectionId;
use crate::error::{PlcError, PlcResult};
use plc_transport::Transport;
use std::any::Any;
use std::fmt;

/// Transport, driver configuration and bookkeeping of one connection
///
/// Tasks receive the context by `&mut` in every step; it is the only way
/// they reach the transport.
///
/// # Contents
/// - **Transport**: the channel created by the transport factory, opened
///   and closed by the driver's connect and disconnect Tasks
/// - **Configuration**: whatever `Driver::configure` returned, stored
///   type-erased and recovered by type
/// - **Bookkeeping**: the connected flag, the pending-disconnect flag and
///   the number of Tasks still registered on the connection
///
/// # Usage
/// ```ignore
/// fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
///     let session = match context.configuration_mut::<ModbusSession>() {
///         Ok(session) => session,
///         Err(e) => return StepOutcome::Failed(e),
///     };
///     // ...
/// }
/// ```
///
/// A disconnect Task checks `running_task_count() == 1` (itself) before it
/// closes the transport.
pub struct ConnectionContext {
    id: ConnectionId,
    transport: Box<dyn Transport>,
    configuration: Box<dyn Any>,
    connected: bool,
    disconnect_requested: bool,
    running_task_count: usize,
}

impl ConnectionContext {
    pub fn new(
        id: ConnectionId,
        transport: Box<dyn Transport>,
        configuration: Box<dyn Any>,
    ) -> Self {
        Self {
            id,
            transport,
            configuration,
            connected: false,
            disconnect_requested: false,
            running_task_count: 0,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn transport(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    /// Driver configuration produced by `Driver::configure`
    ///
    /// # Errors
    ///
    /// `PlcError::Internal` if the configuration is not a `T`.
    pub fn configuration<T: Any>(&self) -> PlcResult<&T> {
        self.configuration.downcast_ref::<T>().ok_or_else(|| {
            PlcError::internal(format!(
                "Connection {} carries no {} configuration",
                self.id,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Mutable access to the driver configuration
    pub fn configuration_mut<T: Any>(&mut self) -> PlcResult<&mut T> {
        let id = self.id;
        self.configuration.downcast_mut::<T>().ok_or_else(|| {
            PlcError::internal(format!(
                "Connection {} carries no {} configuration",
                id,
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn is_disconnect_requested(&self) -> bool {
        self.disconnect_requested
    }

    pub(crate) fn set_disconnect_requested(&mut self, requested: bool) {
        self.disconnect_requested = requested;
    }

    /// Number of Tasks owned by the connection, a running disconnect Task included
    pub fn running_task_count(&self) -> usize {
        self.running_task_count
    }

    pub(crate) fn task_spawned(&mut self) {
        self.running_task_count += 1;
    }

    pub(crate) fn tasks_removed(&mut self, count: usize) {
        self.running_task_count = self.running_task_count.saturating_sub(count);
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("connected", &self.connected)
            .field("disconnect_requested", &self.disconnect_requested)
            .field("running_task_count", &self.running_task_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plc_transport::{LoopbackPeer, LoopbackTransport};

    #[derive(Debug, PartialEq)]
    struct Settings {
        unit: u8,
    }

    fn context() -> ConnectionContext {
        ConnectionContext::new(
            3,
            Box::new(LoopbackTransport::new(LoopbackPeer::new())),
            Box::new(Settings { unit: 1 }),
        )
    }

    #[test]
    fn test_typed_configuration() {
        let mut ctx = context();
        assert_eq!(ctx.configuration::<Settings>().unwrap(), &Settings { unit: 1 });
        ctx.configuration_mut::<Settings>().unwrap().unit = 9;
        assert_eq!(ctx.configuration::<Settings>().unwrap().unit, 9);
    }

    #[test]
    fn test_configuration_type_mismatch_is_internal_error() {
        let ctx = context();
        let err = ctx.configuration::<String>().unwrap_err();
        assert!(matches!(err, PlcError::Internal(_)));
    }

    #[test]
    fn test_task_count_never_negative() {
        let mut ctx = context();
        ctx.task_spawned();
        ctx.tasks_removed(3);
        assert_eq!(ctx.running_task_count(), 0);
        assert_eq!(ctx.transport().transport_code(), "loopback");
    }
}
