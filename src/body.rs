//! Response body accumulation.
//!
//! DATA payloads are buffered in memory until the buffer grows past a
//! threshold, after which everything is moved to a spill sink (an anonymous
//! temp file by default) so a large download does not stay resident.

use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::debug;

/// Backing store for spilled body bytes.
pub trait BodySink: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> BodySink for T {}

/// Creates a fresh spill sink on demand.
pub type SpillFactory = Arc<dyn Fn() -> io::Result<Box<dyn BodySink>> + Send + Sync>;

/// Default factory: an anonymous temp file removed when dropped.
pub fn temp_file_sink() -> SpillFactory {
    Arc::new(|| Ok(Box::new(tempfile::tempfile()?) as Box<dyn BodySink>))
}

/// In-memory "spill" target, mostly for tests.
pub fn memory_sink() -> SpillFactory {
    Arc::new(|| Ok(Box::new(Cursor::new(Vec::new())) as Box<dyn BodySink>))
}

pub struct BodyBuffer {
    memory: BytesMut,
    spill: Option<Box<dyn BodySink>>,
    spilled: u64,
    threshold: usize,
    factory: SpillFactory,
}

impl fmt::Debug for BodyBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyBuffer")
            .field("memory", &self.memory.len())
            .field("spilled", &self.spilled)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl BodyBuffer {
    pub fn new(threshold: usize, factory: SpillFactory) -> Self {
        Self {
            memory: BytesMut::new(),
            spill: None,
            spilled: 0,
            threshold,
            factory,
        }
    }

    pub fn len(&self) -> u64 {
        self.spilled + self.memory.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_spilled(&self) -> bool {
        self.spill.is_some()
    }

    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.memory.extend_from_slice(data);
        if self.memory.len() > self.threshold {
            self.flush_to_spill()?;
        }
        Ok(())
    }

    fn flush_to_spill(&mut self) -> io::Result<()> {
        if self.spill.is_none() {
            debug!(threshold = self.threshold, "body exceeds memory threshold, spilling");
            self.spill = Some((self.factory)()?);
        }
        if let Some(sink) = self.spill.as_mut() {
            sink.write_all(&self.memory)?;
            self.spilled += self.memory.len() as u64;
            self.memory.clear();
        }
        Ok(())
    }

    /// Close accumulation and hand the bytes over.
    pub fn finish(self) -> io::Result<Body> {
        match self.spill {
            None => Ok(Body::Memory(self.memory.freeze())),
            Some(mut sink) => {
                sink.flush()?;
                Ok(Body::Spilled(SpilledBody {
                    sink,
                    spilled: self.spilled,
                    tail: self.memory.freeze(),
                }))
            }
        }
    }
}

/// A complete response body.
pub enum Body {
    Memory(Bytes),
    Spilled(SpilledBody),
}

pub struct SpilledBody {
    sink: Box<dyn BodySink>,
    spilled: u64,
    tail: Bytes,
}

impl Default for Body {
    fn default() -> Self {
        Body::Memory(Bytes::new())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Memory(b) => write!(f, "Body::Memory({} bytes)", b.len()),
            Body::Spilled(s) => write!(f, "Body::Spilled({} bytes)", s.spilled + s.tail.len() as u64),
        }
    }
}

impl Body {
    pub fn len(&self) -> u64 {
        match self {
            Body::Memory(b) => b.len() as u64,
            Body::Spilled(s) => s.spilled + s.tail.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self, Body::Spilled(_))
    }

    /// Read the whole body into memory.
    pub fn to_bytes(&mut self) -> io::Result<Bytes> {
        match self {
            Body::Memory(b) => Ok(b.clone()),
            Body::Spilled(s) => {
                let mut out = Vec::with_capacity((s.spilled as usize).saturating_add(s.tail.len()));
                s.sink.seek(SeekFrom::Start(0))?;
                (&mut s.sink).take(s.spilled).read_to_end(&mut out)?;
                out.extend_from_slice(&s.tail);
                Ok(Bytes::from(out))
            }
        }
    }

    /// Stream the body without loading it fully.
    pub fn into_reader(self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            Body::Memory(b) => Ok(Box::new(Cursor::new(b))),
            Body::Spilled(mut s) => {
                s.sink.seek(SeekFrom::Start(0))?;
                Ok(Box::new(s.sink.take(s.spilled).chain(Cursor::new(s.tail))))
            }
        }
    }
}
