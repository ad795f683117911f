//! Cooperative runtime driving PLC connections
//!
//! One `PlcSystem` owns any number of connections. Protocol work is split
//! into Tasks whose `step` never blocks; every call to `PlcSystem::tick`
//! steps each active Task of each connection exactly once. Callers poll
//! the returned Executions until they report completion.
//!
//! # Architecture
//!
//! ```text
//! PlcSystem ──┬── driver registry (protocol code → Driver)
//!             ├── transport registry (transport code → TransportFactory)
//!             └── Connection* ── ConnectionContext (transport, configuration)
//!                              └─ Task* ── TaskStep (driver state machine)
//!                                       └─ ExecutionSink → Execution (caller handle)
//! ```

pub mod connection;
pub mod connection_string;
pub mod context;
pub mod driver;
pub mod error;
pub mod execution;
pub mod listener;
pub mod request;
pub mod response;
pub mod statistics;
pub mod system;
pub mod task;

pub use connection::{Connection, ConnectionId, ConnectionState};
pub use connection_string::ConnectionString;
pub use context::ConnectionContext;
pub use driver::Driver;
pub use error::{PlcError, PlcResult, ReturnCode};
pub use execution::{
    Execution, ExecutionLink, ExecutionSink, Failure, ReadExecution, WriteExecution,
};
pub use listener::SystemListener;
pub use request::{
    PlcField, ReadRequest, RequestItem, WriteRequest, WriteRequestItem, downcast_field,
};
pub use response::{ReadResponse, ReadResponseItem, WriteResponse, WriteResponseItem};
pub use statistics::ConnectionStatistics;
pub use system::PlcSystem;
pub use task::{StepOutcome, Task, TaskId, TaskKind, TaskStep};
