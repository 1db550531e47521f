//! Fixed-period tick that diffs mirrored state against the Runner and
//! detects program completion.

use crate::feeder::Feeder;
use crate::runner::RunnerModel;
use crate::sender::Sender;
use tinygd_core::{ControllerEvent, MachineSettings, MachineState};

/// What a `QueryTimer::tick` call decided to do
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub events: Vec<ControllerEvent>,
    /// Set once the machine has been idle at the finish position for longer
    /// than `finish_grace_ms`: the caller must issue an internal
    /// `sender:stop`.
    pub program_finished: bool,
}

pub struct QueryTimer {
    mirrored_settings: MachineSettings,
    mirrored_state: MachineState,
    tracked_finish_time_ms: Option<u64>,
    finish_grace_ms: u64,
}

impl QueryTimer {
    pub fn new(finish_grace_ms: u64) -> Self {
        Self {
            mirrored_settings: MachineSettings::default(),
            mirrored_state: MachineState::default(),
            tracked_finish_time_ms: None,
            finish_grace_ms,
        }
    }

    pub fn tick(&mut self, runner: &RunnerModel, feeder: &Feeder, sender: &Sender, ready: bool, now_ms: u64) -> TickOutcome {
        let mut out = TickOutcome::default();

        if feeder.peek() {
            out.events.push(ControllerEvent::FeederStatus(feeder.status()));
        }
        if sender.is_loaded() {
            out.events.push(ControllerEvent::SenderStatus(sender.status()));
        }

        let current_settings = MachineSettings {
            firmware_build: runner.settings.firmware_build,
            feed_override: runner.settings.feed_override,
            spindle_override: runner.settings.spindle_override,
            rapid_override: runner.settings.rapid_override,
            motor_timeout: runner.settings.motor_timeout,
            planner_buffer_pool_size: runner.planner_buffer_pool_size,
        };
        if current_settings != self.mirrored_settings {
            self.mirrored_settings = current_settings.clone();
            out.events.push(ControllerEvent::ControllerSettings(current_settings.clone()));
            out.events.push(ControllerEvent::LegacySettings(current_settings));
        }

        let current_state = MachineState {
            machine_position: runner.machine_position,
            work_position: runner.work_position,
            modal: runner.modal.clone(),
            tool: runner.tool,
        };
        let zero_offset = current_state.work_position == self.mirrored_state.work_position;
        if current_state != self.mirrored_state {
            self.mirrored_state = current_state.clone();
            out.events.push(ControllerEvent::ControllerState(current_state.clone()));
            out.events.push(ControllerEvent::LegacyState(current_state));
        }

        if ready {
            if let Some(finish) = sender.finish_time_ms() {
                if self.tracked_finish_time_ms != Some(finish) {
                    self.tracked_finish_time_ms = Some(finish);
                }
            }
            if let Some(tracked) = self.tracked_finish_time_ms {
                let machine_idle = zero_offset && runner.status.as_deref().map(is_idle_status).unwrap_or(true);
                if !machine_idle {
                    self.tracked_finish_time_ms = Some(now_ms);
                } else if now_ms.saturating_sub(tracked) > self.finish_grace_ms {
                    self.tracked_finish_time_ms = None;
                    out.program_finished = true;
                }
            }
        }

        out
    }
}

fn is_idle_status(status: &str) -> bool {
    matches!(status, "idle" | "ready" | "end" | "stop")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::Sender;
    use crate::expression::{Context, ExpressionStage};

    #[test]
    fn settings_change_triggers_legacy_and_new_events() {
        let mut qt = QueryTimer::new(500);
        let mut runner = RunnerModel::default();
        runner.settings.firmware_build = Some(101.0);
        let feeder = Feeder::new();
        let sender = Sender::new();

        let out = qt.tick(&runner, &feeder, &sender, true, 0);
        assert!(out.events.iter().any(|e| matches!(e, ControllerEvent::ControllerSettings(_))));
        assert!(out.events.iter().any(|e| matches!(e, ControllerEvent::LegacySettings(_))));
    }

    #[test]
    fn program_finishes_after_idle_past_grace_period() {
        let mut qt = QueryTimer::new(500);
        let mut runner = RunnerModel::default();
        runner.status = Some("idle".to_string());
        let feeder = Feeder::new();
        let mut sender = Sender::new();
        sender.load("p", "G0 X1", Context::new(0)).unwrap();
        let stage = ExpressionStage::default();
        sender.next(&stage).unwrap();
        sender.ack(1000);
        sender.next(&stage).unwrap();
        sender.ack(1000);

        let out = qt.tick(&runner, &feeder, &sender, true, 1000);
        assert!(!out.program_finished);

        let out = qt.tick(&runner, &feeder, &sender, true, 1600);
        assert!(out.program_finished);
    }

    #[test]
    fn not_idle_slides_finish_time_forward() {
        let mut qt = QueryTimer::new(500);
        let mut runner = RunnerModel::default();
        runner.status = Some("run".to_string());
        let feeder = Feeder::new();
        let mut sender = Sender::new();
        sender.load("p", "G0 X1", Context::new(0)).unwrap();
        let stage = ExpressionStage::default();
        sender.next(&stage).unwrap();
        sender.ack(1000);
        sender.next(&stage).unwrap();
        sender.ack(1000);

        qt.tick(&runner, &feeder, &sender, true, 1000);
        let out = qt.tick(&runner, &feeder, &sender, true, 5000);
        assert!(!out.program_finished);
    }
}
