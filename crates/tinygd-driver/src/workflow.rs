//! Three-state program workflow {idle, running, paused}

use tinygd_core::{ControllerError, WorkflowState};

/// Workflow state machine. `stop` rewinds the Sender's counters, the same as
/// `start` does — so a `stop; start` sequence re-runs the program from line
/// 0. This is intentional: callers expecting `stop` to merely discard
/// in-flight progress (rather than reset it for a future restart) may find
/// it surprising.
#[derive(Debug, Default)]
pub struct Workflow {
    state: WorkflowState,
}

impl Workflow {
    pub fn new() -> Self {
        Self { state: WorkflowState::Idle }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn start(&mut self) -> Result<(), ControllerError> {
        self.state = WorkflowState::Running;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ControllerError> {
        self.state = WorkflowState::Idle;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ControllerError> {
        if self.state == WorkflowState::Idle {
            return Err(ControllerError::InvalidStateTransition {
                current: self.state.to_string(),
                requested: "paused".to_string(),
            });
        }
        self.state = WorkflowState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), ControllerError> {
        if self.state != WorkflowState::Paused {
            return Err(ControllerError::InvalidStateTransition {
                current: self.state.to_string(),
                requested: "running".to_string(),
            });
        }
        self.state = WorkflowState::Running;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_from_idle_into_running() {
        let mut w = Workflow::new();
        w.start().unwrap();
        assert_eq!(w.state(), WorkflowState::Running);
    }

    #[test]
    fn pause_then_resume_round_trips() {
        let mut w = Workflow::new();
        w.start().unwrap();
        w.pause().unwrap();
        assert_eq!(w.state(), WorkflowState::Paused);
        w.resume().unwrap();
        assert_eq!(w.state(), WorkflowState::Running);
    }

    #[test]
    fn pause_from_idle_is_rejected() {
        let mut w = Workflow::new();
        assert!(w.pause().is_err());
    }

    #[test]
    fn resume_from_idle_is_rejected() {
        let mut w = Workflow::new();
        assert!(w.resume().is_err());
    }

    #[test]
    fn stop_always_returns_to_idle() {
        let mut w = Workflow::new();
        w.start().unwrap();
        w.pause().unwrap();
        w.stop().unwrap();
        assert_eq!(w.state(), WorkflowState::Idle);
    }
}
