//! HPACK: Header Compression for HTTP/2 (RFC 7541)
//!
//! Thin wrapper around `fluke-hpack`. The codec state (both dynamic tables)
//! is connection-scoped and owned by [`HeaderCodec`].

use bytes::Bytes;
use tracing::debug;

use crate::error::{Error, Result};
use crate::settings::DEFAULT_HEADER_TABLE_SIZE;

/// Per-entry overhead counted by SETTINGS_MAX_HEADER_LIST_SIZE (RFC 7540 6.5.2).
pub const HEADER_ENTRY_OVERHEAD: usize = 32;

/// A single header field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.name.starts_with(':')
    }

    /// Size as counted against SETTINGS_MAX_HEADER_LIST_SIZE.
    pub fn list_size(&self) -> usize {
        self.name.len() + self.value.len() + HEADER_ENTRY_OVERHEAD
    }
}

/// Header block encoder/decoder pair for one connection.
pub struct HeaderCodec {
    decoder: fluke_hpack::Decoder<'static>,
    encoder: fluke_hpack::Encoder<'static>,
    encoder_table_size: u32,
}

impl std::fmt::Debug for HeaderCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderCodec")
            .field("encoder_table_size", &self.encoder_table_size)
            .finish()
    }
}

impl Default for HeaderCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderCodec {
    pub fn new() -> Self {
        Self {
            decoder: fluke_hpack::Decoder::new(),
            encoder: fluke_hpack::Encoder::new(),
            encoder_table_size: DEFAULT_HEADER_TABLE_SIZE,
        }
    }

    /// Decode a complete (reassembled) header block.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<Header>> {
        let pairs = self
            .decoder
            .decode(block)
            .map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| {
                Header::new(
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect())
    }

    /// Encode an ordered header list into a header block.
    pub fn encode(&mut self, headers: &[Header]) -> Bytes {
        let pairs: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|h| (h.name.as_bytes(), h.value.as_bytes()))
            .collect();
        Bytes::from(self.encoder.encode(pairs))
    }

    pub fn encoder_table_size(&self) -> u32 {
        self.encoder_table_size
    }

    /// The peer changed SETTINGS_HEADER_TABLE_SIZE: start a fresh encoder.
    pub fn rebuild_encoder(&mut self, table_size: u32) {
        if table_size == self.encoder_table_size {
            return;
        }
        debug!(old = self.encoder_table_size, new = table_size, "rebuilding HPACK encoder");
        self.encoder = fluke_hpack::Encoder::new();
        self.encoder_table_size = table_size;
    }
}

/// Total SETTINGS_MAX_HEADER_LIST_SIZE cost of a header list.
pub fn header_list_size(headers: &[Header]) -> usize {
    headers.iter().map(Header::list_size).sum()
}

// ============================================================================
// Tests
// ============================================================================
