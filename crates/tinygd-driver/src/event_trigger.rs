//! Maps named lifecycle events to an internal g-code command or a shell task

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::info;

/// External collaborator that executes a `system`-typed trigger's command
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, command: &str);
}

/// Default `TaskRunner`: logs and no-ops. Every externally-injected
/// collaborator in this driver ships a working default.
#[derive(Debug, Default)]
pub struct NullTaskRunner;

#[async_trait]
impl TaskRunner for NullTaskRunner {
    async fn run(&self, command: &str) {
        info!(command, "NullTaskRunner: no task runner configured, dropping");
    }
}

/// What a configured trigger entry does when fired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerAction {
    /// Inject this g-code via the Feeder path
    Gcode(String),
    /// Invoke the `TaskRunner` with this shell command
    System(String),
}

/// Named-event → action mapping, fired by [`EventTrigger::trigger`]
pub struct EventTrigger {
    mapping: BTreeMap<String, TriggerAction>,
    task_runner: Box<dyn TaskRunner>,
}

impl EventTrigger {
    pub fn new(task_runner: Box<dyn TaskRunner>) -> Self {
        Self { mapping: BTreeMap::new(), task_runner }
    }

    pub fn configure(&mut self, event: impl Into<String>, action: TriggerAction) {
        self.mapping.insert(event.into(), action);
    }

    /// Fire `event_name`. Returns `Some(gcode)` when the caller must inject
    /// it via the Feeder path; `System` actions are run in place and yield
    /// `None`.
    pub async fn trigger(&self, event_name: &str) -> Option<String> {
        match self.mapping.get(event_name) {
            Some(TriggerAction::Gcode(code)) => Some(code.clone()),
            Some(TriggerAction::System(command)) => {
                self.task_runner.run(command).await;
                None
            }
            None => None,
        }
    }
}

impl Default for EventTrigger {
    fn default() -> Self {
        Self::new(Box::new(NullTaskRunner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gcode_trigger_returns_the_command() {
        let mut trigger = EventTrigger::default();
        trigger.configure("controller:ready", TriggerAction::Gcode("G28.2".into()));
        assert_eq!(trigger.trigger("controller:ready").await, Some("G28.2".to_string()));
    }

    #[tokio::test]
    async fn system_trigger_runs_and_returns_none() {
        let mut trigger = EventTrigger::default();
        trigger.configure("controller:ready", TriggerAction::System("echo hi".into()));
        assert_eq!(trigger.trigger("controller:ready").await, None);
    }

    #[tokio::test]
    async fn unconfigured_event_is_a_no_op() {
        let trigger = EventTrigger::default();
        assert_eq!(trigger.trigger("nothing:here").await, None);
    }
}
