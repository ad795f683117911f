//! Caller-visible handles onto in-flight requests
//!
//! An `Execution` and its `ExecutionSink` share one slot. The Task doing the
//! work holds the sink and fills the slot with a response; the scheduler
//! uses the sink to mark the Execution failed when the Task is abandoned.
//! The caller polls the Execution.
//!
//! # Lifecycle
//! - **Pending**: the Task is still running
//! - **Complete**: the Task delivered a response; `take_response` hands it
//!   out once
//! - **Failed**: the Task was abandoned; `failure` reports the return code
//!   and message
//!
//! # Usage
//! ```ignore
//! let execution = system.read(request)?;
//! system.poll_until(100, |_| execution.is_finished());
//! match execution.failure() {
//!     Some(failure) => log::warn!("read failed: {}", failure),
//!     None => {
//!         let response = execution.take_response();
//!         // ...
//!     }
//! }
//! ```

use crate::connection::ConnectionId;
use crate::error::{PlcError, PlcResult, ReturnCode};
use crate::request::{ReadRequest, WriteRequest};
use crate::response::{ReadResponse, WriteResponse};
use crate::task::TaskId;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Why an Execution failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: ReturnCode,
    pub message: String,
}

impl Failure {
    pub fn from_error(error: &PlcError) -> Self {
        Self {
            code: error.return_code(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug)]
enum Slot<R> {
    Pending,
    Complete(R),
    Failed(Failure),
    /// The response was handed to the caller
    Taken,
}

/// Lets the scheduler fail an Execution without knowing its response type
pub trait ExecutionLink {
    fn fail(&self, error: &PlcError);
}

/// Task-side end of an Execution
pub struct ExecutionSink<R> {
    slot: Rc<RefCell<Slot<R>>>,
}

impl<R> Clone for ExecutionSink<R> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<R> fmt::Debug for ExecutionSink<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSink")
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl<R> ExecutionSink<R> {
    /// Check if neither a response nor a failure was delivered yet
    pub fn is_pending(&self) -> bool {
        matches!(*self.slot.borrow(), Slot::Pending)
    }

    /// Deliver the response
    ///
    /// An Execution settles once; a second delivery is an internal error.
    pub fn complete(&self, response: R) -> PlcResult<()> {
        let mut slot = self.slot.borrow_mut();
        if !matches!(*slot, Slot::Pending) {
            return Err(PlcError::internal("Execution already settled"));
        }
        *slot = Slot::Complete(response);
        Ok(())
    }
}

impl<R> ExecutionLink for ExecutionSink<R> {
    fn fail(&self, error: &PlcError) {
        let mut slot = self.slot.borrow_mut();
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Failed(Failure::from_error(error));
        }
    }
}

/// Caller-side handle binding a request to the Task serving it
pub struct Execution<Q, R> {
    connection_id: ConnectionId,
    task_id: TaskId,
    request: Q,
    slot: Rc<RefCell<Slot<R>>>,
}

pub type ReadExecution = Execution<ReadRequest, ReadResponse>;
pub type WriteExecution = Execution<WriteRequest, WriteResponse>;

impl<Q, R> Execution<Q, R> {
    /// Create an Execution and the sink its Task reports through
    pub fn new(connection_id: ConnectionId, request: Q) -> (Self, ExecutionSink<R>) {
        let slot = Rc::new(RefCell::new(Slot::Pending));
        let sink = ExecutionSink {
            slot: Rc::clone(&slot),
        };
        let execution = Self {
            connection_id,
            task_id: 0,
            request,
            slot,
        };
        (execution, sink)
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Id of the Task serving this Execution
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn request(&self) -> &Q {
        &self.request
    }

    pub(crate) fn set_task_id(&mut self, task_id: TaskId) {
        self.task_id = task_id;
    }

    /// Check if the Execution completed or failed
    pub fn is_finished(&self) -> bool {
        !matches!(*self.slot.borrow(), Slot::Pending)
    }

    /// Check if a response is waiting to be taken
    pub fn is_completed(&self) -> bool {
        matches!(*self.slot.borrow(), Slot::Complete(_))
    }

    /// The failure, if the serving Task was abandoned
    pub fn failure(&self) -> Option<Failure> {
        match &*self.slot.borrow() {
            Slot::Failed(failure) => Some(failure.clone()),
            _ => None,
        }
    }

    /// Return code of the failure, if any
    pub fn failure_code(&self) -> Option<ReturnCode> {
        self.failure().map(|failure| failure.code)
    }

    /// Take the response out of a completed Execution
    ///
    /// Returns `None` while pending, after a failure, or if already taken.
    pub fn take_response(&self) -> Option<R> {
        let mut slot = self.slot.borrow_mut();
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Complete(response) => Some(response),
            other => {
                *slot = other;
                None
            }
        }
    }
}

impl<Q: fmt::Debug, R> fmt::Debug for Execution<Q, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("connection_id", &self.connection_id)
            .field("task_id", &self.task_id)
            .field("request", &self.request)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_then_take() {
        let (execution, sink) = Execution::<(), u32>::new(7, ());
        assert!(!execution.is_finished());
        assert_eq!(execution.take_response(), None);

        sink.complete(42).unwrap();
        assert!(execution.is_finished());
        assert!(execution.is_completed());
        assert_eq!(execution.take_response(), Some(42));
        assert_eq!(execution.take_response(), None);
        assert!(execution.is_finished());
    }

    #[test]
    fn test_fail_is_sticky() {
        let (execution, sink) = Execution::<(), u32>::new(7, ());
        sink.fail(&PlcError::OutOfRange("x".into()));
        assert_eq!(execution.failure_code(), Some(ReturnCode::OutOfRange));
        assert!(sink.complete(1).is_err());
        sink.fail(&PlcError::internal("late"));
        assert_eq!(execution.failure_code(), Some(ReturnCode::OutOfRange));
        assert_eq!(execution.take_response(), None);
    }

    #[test]
    fn test_fail_after_complete_is_ignored() {
        let (execution, sink) = Execution::<(), u32>::new(7, ());
        sink.complete(5).unwrap();
        sink.fail(&PlcError::internal("late"));
        assert_eq!(execution.failure(), None);
        assert_eq!(execution.take_response(), Some(5));
    }
}
