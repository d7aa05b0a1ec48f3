//! The byte pipe underneath a connection.
//!
//! The connection only writes through [`Transport`]; reading is driven by
//! the caller (or a reader thread) feeding bytes into
//! [`Connection::process`](crate::Connection::process).

use std::fmt;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Ordered, reliable byte delivery (TCP-like).
pub trait Transport: Send + Sync {
    /// Write all of `bytes` or fail within roughly `timeout`.
    fn write(&self, bytes: &[u8], timeout: Duration) -> Result<()>;

    /// Close the write side. Idempotent.
    fn close(&self);
}

/// Adapter over any blocking writer. Writes are serialized by a mutex so a
/// frame is never interleaved with another.
pub struct IoTransport<W: Write + Send> {
    writer: Mutex<Option<W>>,
}

impl<W: Write + Send> fmt::Debug for IoTransport<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoTransport")
            .field("open", &self.writer.lock().is_some())
            .finish()
    }
}

impl<W: Write + Send> IoTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
        }
    }
}

impl<W: Write + Send> Transport for IoTransport<W> {
    fn write(&self, bytes: &[u8], _timeout: Duration) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::Send("transport closed".into()))?;
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| Error::Send(e.to_string()))
    }

    fn close(&self) {
        if let Some(mut writer) = self.writer.lock().take() {
            let _ = writer.flush();
            debug!("transport closed");
        }
    }
}

/// TCP transport honoring the per-write timeout via `SO_SNDTIMEO`.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Mutex<Option<TcpStream>>,
}

impl TcpTransport {
    /// `stream` should be a clone of the socket the reader thread reads from.
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

impl Transport for TcpTransport {
    fn write(&self, bytes: &[u8], timeout: Duration) -> Result<()> {
        let mut guard = self.stream.lock();
        let stream = guard
            .as_mut()
            .ok_or_else(|| Error::Send("transport closed".into()))?;
        let timeout = (!timeout.is_zero()).then_some(timeout);
        stream
            .set_write_timeout(timeout)
            .and_then(|_| stream.write_all(bytes))
            .map_err(|e| Error::Send(e.to_string()))
    }

    fn close(&self) {
        if let Some(stream) = self.stream.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("tcp transport shut down");
        }
    }
}
