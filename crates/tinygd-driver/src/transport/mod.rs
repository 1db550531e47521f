//! Byte-duplex transport abstraction
//!
//! A `Transport` is an async byte duplex with three observable events:
//! `data`, `close`, and `error`. Two concrete backends exist —
//! [`serial::SerialTransport`] and [`tcp::TcpTransport`] — plus
//! [`loopback::LoopbackTransport`] for tests. `close` is terminal: once
//! observed, the owning `ControllerInstance` tears itself down.

pub mod loopback;
pub mod serial;
pub mod tcp;

use async_trait::async_trait;
use tinygd_core::Result;
use tokio::sync::mpsc;

/// An event raised by a transport's background read task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Bytes arrived from the firmware
    Data(Vec<u8>),
    /// The connection closed; `Some(reason)` if it was not a clean close
    Close(Option<String>),
    /// A non-fatal I/O error occurred; the connection is not necessarily closed
    Error(String),
}

/// Abstract byte-duplex connection to firmware
///
/// Implementors spawn a background task that pushes [`TransportEvent`]s onto
/// the channel returned by `open`; the Runner's event loop is the sole
/// consumer.
#[async_trait]
pub trait Transport: Send {
    /// Open the connection and return the receiving half of its event channel
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;

    /// Write raw bytes to the connection
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Whether the transport currently believes it is open
    fn is_open(&self) -> bool;
}
