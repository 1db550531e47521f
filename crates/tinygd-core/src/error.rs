//! Error handling for the tinygd driver
//!
//! Provides error types for all layers of the driver:
//! - Controller errors (workflow/state-machine violations)
//! - G-Code errors (expression/token-stage failures)
//! - Connection errors (transport)
//! - Firmware errors (protocol/frame decoding)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Controller error type
///
/// Represents errors related to CNC controller operation,
/// including workflow violations, command failures, and device issues.
#[derive(Error, Debug, Clone)]
pub enum ControllerError {
    /// Controller is not connected
    #[error("Controller not connected")]
    NotConnected,

    /// Invalid workflow transition
    #[error("Invalid workflow transition from {current} to {requested}")]
    InvalidStateTransition { current: String, requested: String },

    /// Command was rejected by controller
    #[error("Command rejected: {reason}")]
    CommandRejected { reason: String },

    /// Alarm condition detected
    #[error("Alarm: {code} - {message}")]
    Alarm { code: u32, message: String },

    /// Unknown named command
    #[error("Unknown command: {name}")]
    UnknownCommand { name: String },

    /// Generic controller error
    #[error("Controller error: {message}")]
    Other { message: String },
}

/// G-Code error type
///
/// Represents errors related to expression/assignment evaluation and
/// token inspection inside the expression stage.
#[derive(Error, Debug, Clone)]
pub enum GcodeError {
    /// Program content was empty
    #[error("Program content is empty")]
    EmptyProgram,

    /// Invalid `%` assignment syntax
    #[error("Invalid assignment at line {line_number}: {reason}")]
    InvalidAssignment { line_number: u32, reason: String },

    /// Unknown context variable referenced in an expression
    #[error("Unknown variable '{name}' in expression")]
    UnknownVariable { name: String },

    /// Bracketed expression failed to evaluate
    #[error("Failed to evaluate expression '{expr}': {reason}")]
    ExpressionError { expr: String, reason: String },

    /// Generic G-Code error
    #[error("G-Code error: {message}")]
    Other { message: String },
}

/// Connection error type
///
/// Represents errors related to communication with CNC controllers,
/// including serial port and TCP connection issues.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Port not found
    #[error("Port not found: {port}")]
    PortNotFound { port: String },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen { port: String, reason: String },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// TCP connection error
    #[error("TCP connection error: {reason}")]
    TcpError { reason: String },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError { reason: String },

    /// I/O error
    #[error("I/O error: {reason}")]
    IoError { reason: String },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters { reason: String },

    /// Generic connection error
    #[error("Connection error: {message}")]
    Other { message: String },
}

/// Firmware error type
///
/// Represents errors specific to the TinyG/g2core JSON protocol.
#[derive(Error, Debug, Clone)]
pub enum FirmwareError {
    /// Firmware status frame (`f`) carried a non-zero status code
    #[error("Firmware status {code}: {message}")]
    StatusError { code: u32, message: String },

    /// A JSON frame failed to decode
    #[error("Failed to parse firmware frame: {reason}")]
    ResponseParseError { reason: String },

    /// A capability probe came back unsupported (`null` reply)
    #[error("Capability not available: {capability}")]
    CapabilityNotAvailable { capability: String },

    /// Generic firmware error
    #[error("Firmware error: {message}")]
    Other { message: String },
}

/// Main error type for the tinygd driver
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Firmware error
    #[error(transparent)]
    Firmware(#[from] FirmwareError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a firmware error
    pub fn is_firmware_error(&self) -> bool {
        matches!(self, Error::Firmware(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_layer_errors_via_from() {
        let err: Error = ControllerError::NotConnected.into();
        assert!(matches!(err, Error::Controller(_)));
        assert!(!err.is_connection_error());
    }

    #[test]
    fn other_builds_generic_variant() {
        let err = Error::other("boom");
        assert_eq!(err.to_string(), "boom");
    }
}
