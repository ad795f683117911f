//! plc4r - cooperative PLC communication runtime
//!
//! This library talks to programmable logic controllers from a single
//! thread: every protocol exchange is a Task whose steps never block, and
//! one `PlcSystem::tick` advances every Task of every connection once.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `plc-core`: Error type, return and response codes, `PlcValue`
//! - `plc-codec`: Bit-addressable read and write buffers
//! - `plc-transport`: Transport traits, frame selectors, TCP, serial and loopback transports
//! - `plc-runtime`: Tasks, scheduler, connections and executions
//! - `plc-driver-simulated`: In-memory simulated PLC
//! - `plc-driver-modbus`: Modbus-TCP driver
//!
//! # Usage
//!
//! ```no_run
//! use plc4r::{PlcSystem, PlcSystemExt};
//!
//! let mut system = PlcSystem::with_default_drivers();
//! let id = system.connect("modbus-tcp://192.168.0.10?unit-identifier=1")?;
//! system.poll_until(100, |s| s.is_connected(id));
//!
//! let request = system.read_request(id, &["holding-register:1:DINT"])?;
//! let execution = system.read(request)?;
//! while !execution.is_finished() {
//!     system.tick();
//! }
//! if let Some(response) = execution.take_response() {
//!     println!("{:?}", response.value("holding-register:1:DINT"));
//! }
//! # Ok::<(), plc4r::PlcError>(())
//! ```

// Re-export core types
pub use plc_core::{PlcError, PlcResult, PlcValue, PlcValueType, ResponseCode, ReturnCode};

// Re-export runtime API
pub use plc_runtime::{
    Connection, ConnectionId, ConnectionState, ConnectionString, Driver, Execution, Failure,
    PlcField, PlcSystem, ReadExecution, ReadRequest, ReadResponse, SystemListener, TaskKind,
    WriteExecution, WriteRequest, WriteResponse,
};

// Re-export buffers
pub mod codec {
    pub use plc_codec::*;
}

// Re-export transports
pub mod transport {
    pub use plc_transport::*;
}

// Re-export runtime internals for driver authors
pub mod runtime {
    pub use plc_runtime::*;
}

// Re-export drivers
pub mod drivers {
    pub mod simulated {
        pub use plc_driver_simulated::*;
    }

    pub mod modbus {
        pub use plc_driver_modbus::*;
    }
}

use plc_driver_modbus::ModbusTcpDriver;
use plc_driver_simulated::SimulatedDriver;
use plc_transport::{LoopbackTransportFactory, SerialTransportFactory, TcpTransportFactory};

/// Registration of the bundled drivers and transports
pub trait PlcSystemExt {
    /// Create a system with every bundled driver and transport registered
    fn with_default_drivers() -> Self;

    /// Register the bundled drivers (`simulated`, `modbus-tcp`) and
    /// transports (`tcp`, `serial`, `loopback`)
    fn add_default_drivers(&mut self);
}

impl PlcSystemExt for PlcSystem {
    fn with_default_drivers() -> Self {
        let mut system = PlcSystem::new();
        system.add_default_drivers();
        system
    }

    fn add_default_drivers(&mut self) {
        self.add_transport(TcpTransportFactory);
        self.add_transport(SerialTransportFactory);
        self.add_transport(LoopbackTransportFactory::new());
        self.add_driver(SimulatedDriver::new());
        self.add_driver(ModbusTcpDriver::new());
        log::info!("Registered bundled drivers and transports");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::eq;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    mock! {
        Listener {}
        impl SystemListener for Listener {
            fn on_connect_success(&mut self, connection: ConnectionId);
            fn on_connect_failure(&mut self, connection: ConnectionId, error: &PlcError);
            fn on_disconnect_success(&mut self, connection: ConnectionId);
            fn on_disconnect_failure(&mut self, connection: ConnectionId, error: &PlcError);
            fn on_loop_failure(&mut self, connection: ConnectionId, task: TaskKind, error: &PlcError);
        }
    }

    #[test]
    fn test_default_registries() {
        let system = PlcSystem::with_default_drivers();
        for protocol in ["simulated", "modbus-tcp"] {
            assert!(system.driver(protocol).is_some(), "{}", protocol);
        }
        for transport in ["tcp", "serial", "loopback"] {
            assert!(system.transport(transport).is_some(), "{}", transport);
        }
        assert_eq!(
            system.driver("modbus-tcp").and_then(|d| d.default_port()),
            Some(502)
        );
    }

    #[test]
    fn test_simulated_session_with_listener() {
        let mut listener = MockListener::new();
        listener
            .expect_on_connect_success()
            .with(eq(1))
            .times(1)
            .return_const(());
        listener
            .expect_on_disconnect_success()
            .with(eq(1))
            .times(1)
            .return_const(());

        let mut system = PlcSystem::with_default_drivers();
        system.set_listener(Box::new(listener));

        let id = system.connect("simulated://plc").unwrap();
        assert!(system.poll_until(3, |s| s.is_connected(id)));

        let request = system
            .write_request(id, &[("STATE/speed:REAL", PlcValue::Real(12.5))])
            .unwrap();
        let execution = system.write(request).unwrap();
        assert!(system.poll_until(3, |_| execution.is_finished()));
        assert!(execution.take_response().unwrap().all_ok());

        let request = system.read_request(id, &["STATE/speed:REAL"]).unwrap();
        let execution = system.read(request).unwrap();
        assert!(system.poll_until(3, |_| execution.is_finished()));
        assert_eq!(
            execution.take_response().unwrap().value("STATE/speed:REAL"),
            Some(&PlcValue::Real(12.5))
        );

        system.disconnect(id).unwrap();
        assert!(system.poll_until(5, |s| s.is_disconnected(id)));
        assert!(system.remove_connection(id).is_ok());
        assert!(system.connection_ids().is_empty());
    }

    #[test]
    fn test_connection_string_errors() {
        let mut system = PlcSystem::with_default_drivers();
        let code = |result: PlcResult<ConnectionId>| result.err().map(|e| e.return_code());

        assert_eq!(
            code(system.connect("s7://10.0.0.1")),
            Some(ReturnCode::UnknownDriver)
        );
        assert_eq!(
            code(system.connect("modbus-tcp:udp://10.0.0.1")),
            Some(ReturnCode::UnknownTransport)
        );
        assert_eq!(
            code(system.connect("modbus-tcp:/10.0.0.1")),
            Some(ReturnCode::InvalidConnectionString)
        );
    }

    #[test]
    fn test_modbus_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let device = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 12];
            stream.read_exact(&mut request).unwrap();
            // Holding registers 0x1234 0x5678 for any read
            let mut response = request[0..4].to_vec();
            response.extend([0x00, 0x07, request[6], 0x03, 0x04, 0x12, 0x34, 0x56, 0x78]);
            stream.write_all(&response).unwrap();
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest);
            request
        });

        let mut system = PlcSystem::with_default_drivers();
        let id = system
            .connect(&format!("modbus-tcp://127.0.0.1:{}?unit-identifier=7", port))
            .unwrap();
        assert!(system.poll_until(3, |s| s.is_connected(id)));

        let request = system.read_request(id, &["holding-register:5:UDINT"]).unwrap();
        let execution = system.read(request).unwrap();
        for _ in 0..2000 {
            if execution.is_finished() {
                break;
            }
            system.tick();
            thread::sleep(Duration::from_millis(1));
        }
        assert!(execution.is_completed());
        assert_eq!(
            execution
                .take_response()
                .unwrap()
                .value("holding-register:5:UDINT"),
            Some(&PlcValue::Udint(0x1234_5678))
        );

        system.disconnect(id).unwrap();
        assert!(system.poll_until(5, |s| s.is_disconnected(id)));

        let request = device.join().unwrap();
        assert_eq!(request[6], 7);
        assert_eq!(&request[7..12], &[0x03, 0x00, 0x04, 0x00, 0x02]);
    }
}
