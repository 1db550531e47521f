//! The heart of the driver: binds Runner frames, Sender, Feeder, and Workflow
//! together per the send/response + planner-queue-watermark protocol.

use crate::expression::{Context, ExpressionStage, HoldReason};
use crate::feeder::Feeder;
use crate::sender::Sender;
use crate::workflow::Workflow;
use tinygd_core::{ControllerEvent, FirmwareErrorEvent, GcodeError, WorkflowState};
use tracing::warn;

/// Gating state for the single in-flight Sender line, tracked alongside
/// `workflow` and the planner-buffer hysteresis flag `blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendGate {
    None,
    Next,
    Ack,
}

/// Lines to write to the transport plus events to broadcast, produced by one
/// `FlowController` step. The caller (`ControllerInstance`) performs the
/// actual async I/O and broadcast.
#[derive(Debug, Default)]
pub struct FlowOutcome {
    pub writes: Vec<String>,
    pub events: Vec<ControllerEvent>,
}

impl FlowOutcome {
    fn push_write(&mut self, line: String) {
        if !line.is_empty() {
            self.writes.push(line);
        }
    }
}

pub struct FlowController {
    pub workflow: Workflow,
    pub feeder: Feeder,
    pub sender: Sender,
    send_gate: SendGate,
    blocked: bool,
    low_water: u32,
    high_water: u32,
    ignore_errors: bool,
}

impl FlowController {
    pub fn new(low_water: u32, high_water: u32) -> Self {
        Self {
            workflow: Workflow::new(),
            feeder: Feeder::new(),
            sender: Sender::new(),
            send_gate: SendGate::None,
            blocked: false,
            low_water,
            high_water,
            ignore_errors: false,
        }
    }

    pub fn set_ignore_errors(&mut self, ignore_errors: bool) {
        self.ignore_errors = ignore_errors;
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn send_gate(&self) -> SendGate {
        self.send_gate
    }

    /// Pull the next Feeder line, run it through the expression stage, and
    /// apply any hold it raises to the Feeder itself. If the Runner reports
    /// the machine is in an alarm state, the Feeder self-resets and logs
    /// instead of pulling anything (§4.5/§8).
    fn pull_feeder_line(&mut self, stage: &ExpressionStage, is_alarm: bool) -> Result<Option<String>, GcodeError> {
        if is_alarm {
            if self.feeder.peek() || self.feeder.is_held() {
                warn!("runner reported alarm state, resetting feeder");
            }
            self.feeder.reset();
            return Ok(None);
        }
        loop {
            let Some((raw, mut ctx)) = self.feeder.next() else { return Ok(None) };
            let outcome = stage.process(&raw, &mut ctx)?;
            match &outcome.hold {
                Some(HoldReason::Wait) => self.feeder.hold("%wait"),
                Some(HoldReason::ProgramPause(code)) => self.feeder.hold(code.clone()),
                Some(HoldReason::ToolChange) => self.feeder.hold("M6"),
                None => {}
            }
            if !outcome.line.is_empty() {
                return Ok(Some(outcome.line));
            }
            if self.feeder.is_held() {
                return Ok(None);
            }
        }
    }

    /// Handle an `r` acknowledgement frame (§4.7)
    pub fn on_r(&mut self, now_ms: u64, stage: &ExpressionStage, is_alarm: bool) -> Result<FlowOutcome, GcodeError> {
        let mut out = FlowOutcome::default();
        match self.workflow.state() {
            WorkflowState::Running => {
                self.send_gate = SendGate::Ack;
                if !self.blocked {
                    self.sender.ack(now_ms);
                    if let Some(line) = self.sender.next(stage)? {
                        out.push_write(line.text);
                    }
                    self.send_gate = SendGate::Next;
                }
            }
            WorkflowState::Paused if self.sender.received() < self.sender.sent() => {
                self.sender.ack(now_ms);
                if let Some(line) = self.sender.next(stage)? {
                    out.push_write(line.text);
                }
                self.send_gate = SendGate::Next;
            }
            _ => {
                if let Some(line) = self.pull_feeder_line(stage, is_alarm)? {
                    out.push_write(line);
                }
            }
        }
        Ok(out)
    }

    /// Handle a `qr` planner-queue report (§4.7)
    pub fn on_qr(
        &mut self,
        q: u32,
        planner_buffer_pool_size: u32,
        now_ms: u64,
        stage: &ExpressionStage,
        is_alarm: bool,
    ) -> Result<FlowOutcome, GcodeError> {
        let mut out = FlowOutcome::default();

        if q <= self.low_water {
            self.blocked = true;
            return Ok(out);
        }
        if q >= self.high_water {
            self.blocked = false;
        }

        match (self.workflow.state(), self.send_gate) {
            (WorkflowState::Running, SendGate::Next) => {
                if self.sender.is_held()
                    && self.sender.received() >= self.sender.sent()
                    && q >= planner_buffer_pool_size
                {
                    self.sender.unhold();
                    if let Some(line) = self.sender.next(stage)? {
                        out.push_write(line.text);
                    }
                    self.send_gate = SendGate::Next;
                }
            }
            (WorkflowState::Running, SendGate::Ack) | (WorkflowState::Paused, SendGate::Ack) => {
                self.sender.ack(now_ms);
                if let Some(line) = self.sender.next(stage)? {
                    out.push_write(line.text);
                }
                self.send_gate = SendGate::Next;
            }
            _ => {
                if self.feeder.is_held()
                    && self.feeder.hold_reason() == Some("%wait")
                    && q >= planner_buffer_pool_size
                {
                    self.feeder.unhold();
                }
                if let Some(line) = self.pull_feeder_line(stage, is_alarm)? {
                    out.push_write(line);
                }
            }
        }

        Ok(out)
    }

    /// Handle an `f` footer frame whose status code is non-zero (§4.7)
    pub fn on_footer_error(&mut self, code: u32, message: &str, source_line: Option<&str>) -> FlowOutcome {
        let mut out = FlowOutcome::default();
        let event = ControllerEvent::FirmwareError(FirmwareErrorEvent {
            code,
            msg: message.to_string(),
            line: source_line.map(str::to_string),
            data: None,
        });

        match self.workflow.state() {
            WorkflowState::Running => {
                if let Some(line) = source_line {
                    out.events.push(ControllerEvent::Raw(format!("> {line}")));
                }
                out.events.push(event);
                if !self.ignore_errors {
                    let _ = self.workflow.pause();
                    self.sender.hold(format!("firmware error {code}"));
                    out.events.push(ControllerEvent::WorkflowState(self.workflow.state()));
                }
            }
            _ => {
                out.events.push(event);
            }
        }
        out
    }

    /// `sender:start` / `feeder:start` — rewind the Sender, clear gating, and
    /// kick off the first transmission (mirrors `resume()`).
    pub fn start(&mut self, stage: &ExpressionStage) -> Result<FlowOutcome, GcodeError> {
        self.blocked = false;
        self.send_gate = SendGate::None;
        self.sender.rewind();
        let _ = self.workflow.start();
        let mut out = FlowOutcome { writes: vec![], events: vec![ControllerEvent::WorkflowState(self.workflow.state())] };
        if let Some(line) = self.sender.next(stage)? {
            out.push_write(line.text);
            self.send_gate = SendGate::Next;
        }
        Ok(out)
    }

    /// `sender:stop` — identical side effects to `start` so a later `start`
    /// re-runs the program from line 0.
    pub fn stop(&mut self) -> FlowOutcome {
        self.blocked = false;
        self.send_gate = SendGate::None;
        self.sender.rewind();
        let _ = self.workflow.stop();
        FlowOutcome { writes: vec![], events: vec![ControllerEvent::WorkflowState(self.workflow.state())] }
    }

    pub fn pause(&mut self, reason: impl Into<String>) -> Result<FlowOutcome, tinygd_core::ControllerError> {
        self.workflow.pause()?;
        self.sender.hold(reason);
        Ok(FlowOutcome { writes: vec![], events: vec![ControllerEvent::WorkflowState(self.workflow.state())] })
    }

    pub fn resume(&mut self, stage: &ExpressionStage) -> Result<FlowOutcome, tinygd_core::Error> {
        self.workflow.resume()?;
        self.feeder.reset();
        self.sender.unhold();
        let mut out = FlowOutcome { writes: vec![], events: vec![ControllerEvent::WorkflowState(self.workflow.state())] };
        if let Some(line) = self.sender.next(stage)? {
            out.push_write(line.text);
        }
        Ok(out)
    }
}

/// Convenience for tests that need a populated context without a live Runner
pub fn empty_context(now_ms: u64) -> Context {
    Context::new(now_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fc() -> FlowController {
        FlowController::new(8, 20)
    }

    #[test]
    fn ack_gating_scenario() {
        let mut c = fc();
        c.workflow.start().unwrap();
        c.sender.load("p", "G0 X1\nG0 X2\nG0 X3\nG0 X4\nG0 X5", empty_context(0)).unwrap();
        let stage = ExpressionStage::default();
        for _ in 0..5 {
            c.sender.next(&stage).unwrap();
        }
        for _ in 0..4 {
            c.sender.ack(0);
        }
        assert_eq!(c.sender.sent(), 5);
        assert_eq!(c.sender.received(), 4);

        let out = c.on_r(0, &stage, false).unwrap();
        assert_eq!(c.sender.sent(), 6);
        assert_eq!(c.sender.received(), 5);
        assert_eq!(c.send_gate(), SendGate::Next);
        assert_eq!(out.writes.len(), 1);
    }

    #[test]
    fn low_water_blocks_then_high_water_releases() {
        let mut c = fc();
        c.workflow.start().unwrap();
        let stage = ExpressionStage::default();

        c.on_qr(4, 28, 0, &stage, false).unwrap();
        assert!(c.is_blocked());

        c.sender.load("p", "G0 X1", empty_context(0)).unwrap();
        c.sender.next(&stage).unwrap();
        let out = c.on_r(0, &stage, false).unwrap();
        assert_eq!(c.send_gate(), SendGate::Ack);
        assert!(out.writes.is_empty());

        let out = c.on_qr(32, 28, 0, &stage, false).unwrap();
        assert!(!c.is_blocked());
        assert_eq!(c.send_gate(), SendGate::Next);
        assert_eq!(c.sender.received(), 1);
        let _ = out;
    }

    #[test]
    fn wait_dwell_holds_sender_until_queue_report_shows_empty() {
        let mut c = fc();
        c.workflow.start().unwrap();
        let stage = ExpressionStage::default();
        c.sender.load("p", "G0 X1", empty_context(0)).unwrap();
        c.sender.next(&stage).unwrap();

        // firmware acks G0 X1; the Sender advances onto the trailing %wait dwell
        let out = c.on_r(0, &stage, false).unwrap();
        assert_eq!(out.writes, vec!["G4P0.5".to_string()]);
        assert!(c.sender.is_held());

        // firmware acks the dwell line itself
        c.on_r(0, &stage, false).unwrap();
        assert_eq!(c.sender.received(), c.sender.sent());

        let out = c.on_qr(28, 28, 0, &stage, false).unwrap();
        assert!(!c.sender.is_held());
        let _ = out;
    }

    #[test]
    fn m0_pauses_workflow_and_holds_sender() {
        let mut c = fc();
        c.workflow.start().unwrap();
        let stage = ExpressionStage::default();
        c.sender.load("p", "M0\nG0 X1", empty_context(0)).unwrap();
        c.sender.next(&stage).unwrap();
        assert!(c.sender.is_held());
    }

    #[test]
    fn footer_error_pauses_running_workflow_unless_ignored() {
        let mut c = fc();
        c.workflow.start().unwrap();
        let out = c.on_footer_error(108, "bad number format", Some("G1 X"));
        assert_eq!(c.workflow.state(), WorkflowState::Paused);
        assert!(out.events.iter().any(|e| matches!(e, ControllerEvent::FirmwareError(_))));
    }

    #[test]
    fn footer_error_surfaces_but_continues_when_ignored() {
        let mut c = fc();
        c.workflow.start().unwrap();
        c.set_ignore_errors(true);
        c.on_footer_error(108, "bad number format", Some("G1 X"));
        assert_eq!(c.workflow.state(), WorkflowState::Running);
    }

    #[test]
    fn stop_then_start_rewinds_the_sender() {
        let mut c = fc();
        c.workflow.start().unwrap();
        let stage = ExpressionStage::default();
        c.sender.load("p", "G0 X1", empty_context(0)).unwrap();
        c.sender.next(&stage).unwrap();
        c.stop();
        c.start(&stage).unwrap();
        assert_eq!(c.sender.sent(), 1);
    }

    #[test]
    fn start_transmits_the_first_sender_line() {
        let mut c = fc();
        c.sender.load("p", "G0 X1\nG0 X2", empty_context(0)).unwrap();
        let stage = ExpressionStage::default();
        let out = c.start(&stage).unwrap();
        assert_eq!(out.writes, vec!["G0X1".to_string()]);
        assert_eq!(c.sender.sent(), 1);
        assert_eq!(c.send_gate(), SendGate::Next);
    }
}
