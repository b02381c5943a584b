//! OpenOCD TCL socket client
//!
//! Communicates with OpenOCD's TCL server (default port 6666).
//! Protocol: send command as UTF-8, terminated by 0x1a (SUB character).
//! Response: UTF-8 text terminated by 0x1a.
//!
//! Two connection modes:
//! - single-shot: one connection per command; a second command on the same
//!   client before `stop()` is a contract violation.
//! - persistent: one connection reused across many command/response pairs,
//!   reopened transparently if the previous one died. Used for the status
//!   poll, the heap-trace command chain and the notification stream.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{Result, TraceError};

/// TCL protocol terminator byte (ASCII SUB / Ctrl-Z)
pub const TCL_DELIMITER: u8 = 0x1a;

/// Endpoint of an OpenOCD TCL server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TclConnection {
    pub host: String,
    pub port: u16,
}

impl TclConnection {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for TclConnection {
    fn default() -> Self {
        Self::new("localhost", 6666)
    }
}

/// Connection reuse policy of a [`TclClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TclMode {
    /// One connection per command; `stop()` before the next send.
    SingleShot,
    /// One connection reused across many commands.
    Persistent,
}

/// Event delivered to the owner of a [`TclClient`]
#[derive(Debug)]
pub enum TclEvent {
    /// One complete response frame, delimiter stripped.
    Response(Vec<u8>),
    /// Socket-level failure; the connection is dead.
    Error(String),
}

/// Async client for OpenOCD's TCL RPC port.
///
/// Frames are delivered on the receiver handed out by [`TclClient::new`];
/// the reader task scans the cumulative buffer, so a delimiter split across
/// reads is still detected.
pub struct TclClient {
    conn: TclConnection,
    mode: TclMode,
    running: bool,
    writer: Option<OwnedWriteHalf>,
    reader_task: Option<JoinHandle<()>>,
    event_tx: mpsc::UnboundedSender<TclEvent>,
}

impl TclClient {
    /// Create a client and the receiving end of its event stream.
    pub fn new(conn: TclConnection, mode: TclMode) -> (Self, mpsc::UnboundedReceiver<TclEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                conn,
                mode,
                running: false,
                writer: None,
                reader_task: None,
                event_tx,
            },
            event_rx,
        )
    }

    /// Fast liveness check: connect, drop, report. Never fails.
    pub async fn probe(conn: &TclConnection, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect(conn.addr())).await,
            Ok(Ok(_))
        )
    }

    /// Send a command wrapped in `capture "..."` so OpenOCD returns its
    /// textual output instead of just a result code.
    pub async fn send_command_with_capture(&mut self, command: &str) -> Result<()> {
        self.send_command(&format!("capture \"{}\"", command)).await
    }

    /// Send a raw TCL command framed with the terminator byte.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        match self.mode {
            TclMode::SingleShot => {
                if self.running {
                    return Err(TraceError::CommandInFlight);
                }
                self.open().await?;
                self.write_framed(command).await
            }
            TclMode::Persistent => {
                let reader_dead = self
                    .reader_task
                    .as_ref()
                    .map_or(true, JoinHandle::is_finished);
                if !self.running || self.writer.is_none() || reader_dead {
                    self.stop();
                    self.open().await?;
                }
                self.write_framed(command).await
            }
        }
    }

    /// Tear down the connection and its reader task. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.writer = None;
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn connection(&self) -> &TclConnection {
        &self.conn
    }

    async fn open(&mut self) -> Result<()> {
        let addr = self.conn.addr();
        debug!("Opening TCL connection to {}", addr);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| TraceError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        let (read_half, write_half) = stream.into_split();
        self.writer = Some(write_half);
        self.running = true;
        self.reader_task = Some(tokio::spawn(read_frames(read_half, self.event_tx.clone())));
        Ok(())
    }

    async fn write_framed(&mut self, command: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(TraceError::NotConnected)?;
        trace!("TCL write: {}", command);
        let mut payload = command.as_bytes().to_vec();
        payload.push(TCL_DELIMITER);
        writer
            .write_all(&payload)
            .await
            .map_err(|e| TraceError::WriteFailed(e.to_string()))?;
        Ok(())
    }
}

impl Drop for TclClient {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reader half: accumulate bytes, emit one `Response` per delimiter.
async fn read_frames(mut read_half: OwnedReadHalf, tx: mpsc::UnboundedSender<TclEvent>) {
    let mut acc: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match read_half.read(&mut chunk).await {
            // Remote closed the connection cleanly.
            Ok(0) => break,
            Ok(n) => {
                acc.extend_from_slice(&chunk[..n]);
                while let Some(pos) = acc.iter().position(|&b| b == TCL_DELIMITER) {
                    let mut frame: Vec<u8> = acc.drain(..=pos).collect();
                    frame.pop(); // strip the delimiter
                    if tx.send(TclEvent::Response(frame)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(TclEvent::Error(e.to_string()));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcl_delimiter_value() {
        // ASCII SUB (0x1a = 26)
        assert_eq!(TCL_DELIMITER, 0x1a);
        assert_eq!(TCL_DELIMITER, 26);
    }

    #[test]
    fn test_connection_default() {
        let conn = TclConnection::default();
        assert_eq!(conn.host, "localhost");
        assert_eq!(conn.port, 6666);
        assert_eq!(conn.addr(), "localhost:6666");
    }

    #[tokio::test]
    async fn test_stop_idempotent_before_connect() {
        let (mut client, _rx) = TclClient::new(TclConnection::default(), TclMode::SingleShot);
        client.stop();
        client.stop();
        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn test_send_without_open_persistent_fails_cleanly() {
        // Port 1 is almost certainly closed; the connect must surface as
        // ConnectionFailed, not a panic.
        let conn = TclConnection::new("127.0.0.1", 1);
        let (mut client, _rx) = TclClient::new(conn, TclMode::Persistent);
        let err = client.send_command("version").await.unwrap_err();
        assert!(matches!(err, TraceError::ConnectionFailed(_)));
        assert!(!client.is_running());
    }
}
