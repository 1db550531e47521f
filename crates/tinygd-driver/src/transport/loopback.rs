//! In-memory transport test double
//!
//! `LoopbackTransport` never talks to real firmware. Everything written to it
//! is recorded in `written()` for assertions, and test code injects inbound
//! bytes via `inject()` to simulate firmware replies.

use super::{Transport, TransportEvent};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tinygd_core::Result;
use tokio::sync::mpsc;

/// Shared, clonable handle to drive a [`LoopbackTransport`] from test code
#[derive(Clone)]
pub struct LoopbackHandle {
    written: Arc<Mutex<Vec<u8>>>,
    tx: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
}

impl LoopbackHandle {
    /// All bytes written by the driver since the last `take_written`
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.written.lock().unwrap())
    }

    /// Push a line (newline appended) into the transport as if firmware sent it
    pub async fn inject_line(&self, line: &str) {
        self.inject(format!("{line}\n").into_bytes()).await;
    }

    /// Push raw bytes into the transport as if firmware sent them
    pub async fn inject(&self, bytes: Vec<u8>) {
        let tx = self.tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(TransportEvent::Data(bytes)).await;
        }
    }

    /// Simulate a transport close
    pub async fn close_from_remote(&self) {
        let tx = self.tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(TransportEvent::Close(None)).await;
        }
    }
}

pub struct LoopbackTransport {
    written: Arc<Mutex<Vec<u8>>>,
    tx: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    open: bool,
}

impl LoopbackTransport {
    pub fn new() -> (Self, LoopbackHandle) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let tx = Arc::new(Mutex::new(None));
        let transport = Self { written: written.clone(), tx: tx.clone(), open: false };
        let handle = LoopbackHandle { written, tx };
        (transport, handle)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        let (tx, rx) = mpsc::channel(256);
        *self.tx.lock().unwrap() = Some(tx);
        self.open = true;
        Ok(rx)
    }

    async fn close(&mut self) -> Result<()> {
        *self.tx.lock().unwrap() = None;
        self.open = false;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.written.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
