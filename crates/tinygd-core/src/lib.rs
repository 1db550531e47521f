//! # tinygd-core
//!
//! Core types, error taxonomy, and event plumbing shared by the tinygd
//! TinyG/g2core driver. Provides the fundamental abstractions for position
//! and modal-group data, client-facing events, and logging messages.

pub mod error;
pub mod event;
pub mod position;

pub use event::{
    ControllerEvent, EventDispatcher, FeederStatus, FirmwareErrorEvent, MachineSettings,
    MachineState, SenderStatus, WorkflowState,
};

pub use position::{CoolantState, ModalGroup, PartialPosition, Position};

pub use error::{ConnectionError, ControllerError, Error, FirmwareError, GcodeError, Result};
