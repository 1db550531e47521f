//! Client-facing event types and the broadcast sink that fans them out
//!
//! The core never tracks individual client endpoints; it owns one
//! `tokio::sync::broadcast::Sender<ControllerEvent>` and calls `emit`. Any
//! number of clients can `subscribe()` and slow/gone subscribers are dropped
//! by the channel itself.

use crate::position::{ModalGroup, Position};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// The three-state program workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkflowState {
    #[default]
    Idle,
    Running,
    Paused,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Snapshot of the Feeder suitable for broadcasting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeederStatus {
    pub pending: bool,
    pub queue_len: usize,
    pub held: bool,
    pub hold_reason: Option<String>,
}

/// Snapshot of the Sender suitable for broadcasting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SenderStatus {
    pub name: Option<String>,
    pub total: usize,
    pub sent: usize,
    pub received: usize,
    pub held: bool,
    pub hold_reason: Option<String>,
}

/// Mirrored machine state broadcast to clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    pub machine_position: Position,
    pub work_position: Position,
    pub modal: ModalGroup,
    pub tool: u32,
}

/// Mirrored settings broadcast to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSettings {
    pub firmware_build: Option<f64>,
    pub feed_override: f64,
    pub spindle_override: f64,
    pub rapid_override: f64,
    pub motor_timeout: Option<f64>,
    pub planner_buffer_pool_size: u32,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            firmware_build: None,
            feed_override: 1.0,
            spindle_override: 1.0,
            rapid_override: 1.0,
            motor_timeout: None,
            planner_buffer_pool_size: 28,
        }
    }
}

/// A structured firmware error, broadcast alongside the offending source line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareErrorEvent {
    pub code: u32,
    pub msg: String,
    pub line: Option<String>,
    pub data: Option<String>,
}

/// Every event the driver can emit to subscribed clients
///
/// `LegacySettings`/`LegacyState` are the `TinyG:`-prefixed duplicates kept
/// for clients written against the older event names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControllerEvent {
    ControllerType { controller_type: String },
    ControllerSettings(MachineSettings),
    ControllerState(MachineState),
    LegacySettings(MachineSettings),
    LegacyState(MachineState),
    ConnectionOpen,
    ConnectionClose { error: Option<String> },
    ConnectionError { message: String },
    ConnectionRead { data: String },
    ConnectionWrite { data: String },
    ConnectionChange { connected: bool },
    FeederStatus(FeederStatus),
    SenderStatus(SenderStatus),
    SenderLoad { name: String, total: usize },
    SenderUnload,
    WorkflowState(WorkflowState),
    FirmwareError(FirmwareErrorEvent),
    Raw(String),
}

/// Broadcast sink every client subscribes to
#[derive(Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<ControllerEvent>,
}

impl EventDispatcher {
    /// Create a dispatcher with the given broadcast buffer size
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to every current subscriber
    ///
    /// Returns the number of subscribers that received it; `Err` only when
    /// there are currently none, which is not itself a driver error.
    pub fn emit(&self, event: ControllerEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_reaches_all_subscribers() {
        let dispatcher = EventDispatcher::new(16);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();

        dispatcher.emit(ControllerEvent::ConnectionOpen);

        assert_eq!(a.try_recv().unwrap(), ControllerEvent::ConnectionOpen);
        assert_eq!(b.try_recv().unwrap(), ControllerEvent::ConnectionOpen);
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let dispatcher = EventDispatcher::new(16);
        assert_eq!(dispatcher.emit(ControllerEvent::ConnectionOpen), 0);
    }
}
