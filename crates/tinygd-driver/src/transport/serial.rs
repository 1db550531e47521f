//! Serial-port transport backed by `tokio_serial`

use super::{Transport, TransportEvent};
use async_trait::async_trait;
use tinygd_core::{ConnectionError, Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;

/// Connection parameters for a serial link
#[derive(Debug, Clone, PartialEq)]
pub struct SerialParams {
    pub port: String,
    pub baud_rate: u32,
}

/// One physical serial port visible on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub description: Option<String>,
}

/// Enumerate serial ports visible to the OS
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| Error::Connection(ConnectionError::SerialError { reason: e.to_string() }))?;
    Ok(ports
        .into_iter()
        .map(|p| SerialPortInfo {
            port_name: p.port_name,
            description: match p.port_type {
                tokio_serial::SerialPortType::UsbPort(info) => info.product,
                _ => None,
            },
        })
        .collect())
}

/// Serial transport. Split into a write half kept here and a read half moved
/// into the background task spawned by `open`.
pub struct SerialTransport {
    params: SerialParams,
    writer: Option<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>,
    open: bool,
}

impl SerialTransport {
    pub fn new(params: SerialParams) -> Self {
        Self { params, writer: None, open: false }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        let port = tokio_serial::new(&self.params.port, self.params.baud_rate)
            .open_native_async()
            .map_err(|e| Error::Connection(ConnectionError::FailedToOpen {
                port: self.params.port.clone(),
                reason: e.to_string(),
            }))?;

        let (mut reader, writer) = tokio::io::split(port);
        self.writer = Some(Box::new(writer));
        self.open = true;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        let _ = tx.send(TransportEvent::Close(None)).await;
                        break;
                    }
                    Ok(n) => {
                        if tx.send(TransportEvent::Data(buf[..n].to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                        let _ = tx.send(TransportEvent::Close(Some(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn close(&mut self) -> Result<()> {
        self.writer = None;
        self.open = false;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            Error::Connection(ConnectionError::ConnectionLost { reason: "not open".into() })
        })?;
        writer
            .write_all(bytes)
            .await
            .map_err(|e| Error::Connection(ConnectionError::IoError { reason: e.to_string() }))?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
