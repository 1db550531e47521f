//! TCP transport for network-bridged g2core boards

use super::{Transport, TransportEvent};
use async_trait::async_trait;
use tinygd_core::{ConnectionError, Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Connection parameters for a TCP link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpParams {
    pub host: String,
    pub port: u16,
}

pub struct TcpTransport {
    params: TcpParams,
    writer: Option<tokio::net::tcp::OwnedWriteHalf>,
    open: bool,
}

impl TcpTransport {
    pub fn new(params: TcpParams) -> Self {
        Self { params, writer: None, open: false }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        let addr = format!("{}:{}", self.params.host, self.params.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::Connection(ConnectionError::FailedToOpen {
                port: addr,
                reason: e.to_string(),
            }))?;
        let (mut reader, writer) = stream.into_split();
        self.writer = Some(writer);
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
