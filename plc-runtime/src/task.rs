//! Resumable units of protocol work

use crate::context::ConnectionContext;
use crate::error::{PlcError, PlcResult};
use crate::execution::ExecutionLink;
use std::fmt;

/// Identifier of a Task, unique within its connection
pub type TaskId = u64;

/// Result of running one step of a Task
#[derive(Debug)]
pub enum StepOutcome {
    /// The state machine advanced; step again next tick
    Progress,
    /// Nothing to do yet (no data on the transport); step again next tick
    Pending,
    /// The Task is done and leaves the connection at the end of the tick
    Complete,
    /// The Task is abandoned; its Execution fails with this error
    Failed(PlcError),
}

impl StepOutcome {
    /// Check if the Task stays active after this step
    pub fn is_active(&self) -> bool {
        matches!(self, StepOutcome::Progress | StepOutcome::Pending)
    }

    /// Short name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Progress => "PROGRESS",
            StepOutcome::Pending => "PENDING",
            StepOutcome::Complete => "COMPLETE",
            StepOutcome::Failed(_) => "FAILED",
        }
    }
}

impl From<PlcResult<StepOutcome>> for StepOutcome {
    fn from(result: PlcResult<StepOutcome>) -> Self {
        result.unwrap_or_else(StepOutcome::Failed)
    }
}

/// Driver state machine behind a Task
///
/// `step` is called at most once per scheduler tick. It must do one bounded
/// unit of work (one send, or one non-blocking receive attempt) and never
/// block. Returning `Pending` is the only legal way to wait.
pub trait TaskStep {
    fn step(&mut self, context: &mut ConnectionContext) -> StepOutcome;

    /// Name of the current state, for logging
    fn state_name(&self) -> &'static str;
}

/// What a Task does for its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Connect,
    Disconnect,
    Read,
    Write,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Connect => "connect",
            TaskKind::Disconnect => "disconnect",
            TaskKind::Read => "read",
            TaskKind::Write => "write",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One active unit of protocol work owned by a connection
pub struct Task {
    id: TaskId,
    kind: TaskKind,
    step: Box<dyn TaskStep>,
    completed: bool,
    failed: bool,
    execution: Option<Box<dyn ExecutionLink>>,
}

impl Task {
    /// Wrap a driver state machine into a Task
    ///
    /// The id is assigned when the Task is spawned on a connection.
    pub fn new(kind: TaskKind, step: impl TaskStep + 'static) -> Self {
        Self {
            id: 0,
            kind,
            step: Box::new(step),
            completed: false,
            failed: false,
            execution: None,
        }
    }

    /// Bind the Execution that fails when this Task fails
    pub fn with_execution(mut self, execution: Box<dyn ExecutionLink>) -> Self {
        self.execution = Some(execution);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Check if the Task finished successfully
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Check if the Task was abandoned after a failed step
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn state_name(&self) -> &'static str {
        self.step.state_name()
    }

    pub(crate) fn set_id(&mut self, id: TaskId) {
        self.id = id;
    }

    /// Run one step and record its outcome on the Task
    pub(crate) fn run_step(&mut self, context: &mut ConnectionContext) -> StepOutcome {
        let outcome = self.step.step(context);
        match &outcome {
            StepOutcome::Complete => self.completed = true,
            StepOutcome::Failed(error) => {
                self.failed = true;
                if let Some(execution) = &self.execution {
                    execution.fail(error);
                }
            }
            StepOutcome::Progress | StepOutcome::Pending => {}
        }
        outcome
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.step.state_name())
            .field("completed", &self.completed)
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Execution;
    use crate::response::WriteResponse;
    use crate::request::WriteRequest;
    use plc_core::ReturnCode;
    use plc_transport::{LoopbackPeer, LoopbackTransport};

    struct Countdown(u32);

    impl TaskStep for Countdown {
        fn step(&mut self, _context: &mut ConnectionContext) -> StepOutcome {
            match self.0 {
                0 => StepOutcome::Failed(PlcError::internal("countdown overrun")),
                1 => StepOutcome::Complete,
                _ => {
                    self.0 -= 1;
                    StepOutcome::Progress
                }
            }
        }

        fn state_name(&self) -> &'static str {
            "COUNTDOWN"
        }
    }

    fn context() -> ConnectionContext {
        ConnectionContext::new(1, Box::new(LoopbackTransport::new(LoopbackPeer::new())), Box::new(()))
    }

    #[test]
    fn test_task_completes() {
        let mut ctx = context();
        let mut task = Task::new(TaskKind::Read, Countdown(2));
        assert!(task.run_step(&mut ctx).is_active());
        assert!(!task.is_completed());
        assert!(matches!(task.run_step(&mut ctx), StepOutcome::Complete));
        assert!(task.is_completed());
    }

    #[test]
    fn test_failed_step_fails_execution() {
        let mut ctx = context();
        let (execution, sink) = Execution::new(1, WriteRequest::new(1));
        let _: &Execution<WriteRequest, WriteResponse> = &execution;
        let mut task = Task::new(TaskKind::Write, Countdown(0)).with_execution(Box::new(sink));

        assert!(matches!(task.run_step(&mut ctx), StepOutcome::Failed(_)));
        assert!(task.is_failed());
        assert!(!task.is_completed());
        assert!(execution.is_finished());
        assert_eq!(execution.failure_code(), Some(ReturnCode::InternalError));
    }

    #[test]
    fn test_outcome_from_result() {
        let outcome: StepOutcome = Err::<StepOutcome, _>(PlcError::internal("x")).into();
        assert_eq!(outcome.as_str(), "FAILED");
        let outcome: StepOutcome = Ok(StepOutcome::Pending).into();
        assert!(outcome.is_active());
    }
}
