//! HTTP/2 frame codec (RFC 7540 Section 4 and 6).
//!
//! Every frame shares a 9-byte header:
//!
//! ```text
//! +-----------------------------------------------+
//! |                 Length (24)                   |
//! +---------------+---------------+---------------+
//! |   Type (8)    |   Flags (8)   |
//! +-+-------------+---------------+-------------------------------+
//! |R|                 Stream Identifier (31)                      |
//! +=+=============================================================+
//! |                   Frame Payload (0...)                      ...
//! +---------------------------------------------------------------+
//! ```
//!
//! [`Frame`] is a sum type with one struct per frame kind. Decoding never
//! validates connection-level rules (stream id zero/non-zero, padding bounds,
//! exact sizes of fixed-size kinds); that belongs to the connection
//! dispatcher, which knows which error scope applies. The decoder only fails
//! on an unknown type code, a header/payload length mismatch, or a payload too
//! short to hold the kind's fixed fields.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, ErrorCode, Result};
use crate::settings::DEFAULT_MAX_FRAME_SIZE;

/// HTTP/2 frame types (RFC 7540 Section 6)
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 frame flags
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// Size of the fixed frame header.
pub const FRAME_HEADER_LEN: usize = 9;

/// Largest length representable in the 24-bit length field.
pub const MAX_FRAME_LENGTH: u32 = 0x00ff_ffff;

/// The HTTP/2 connection preface magic (24 bytes)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

const STREAM_ID_MASK: u32 = 0x7fff_ffff;

pub const PRIORITY_PAYLOAD_LEN: usize = 5;
pub const RST_STREAM_PAYLOAD_LEN: usize = 4;
pub const PING_PAYLOAD_LEN: usize = 8;
pub const WINDOW_UPDATE_PAYLOAD_LEN: usize = 4;
pub const SETTING_ENTRY_LEN: usize = 6;

/// Check if data starts with the HTTP/2 connection preface magic.
pub fn is_connection_preface(data: &[u8]) -> bool {
    data.starts_with(CONNECTION_PREFACE)
}

/// The bytes a client writes first: the preface magic immediately followed
/// by its initial SETTINGS frame.
pub fn connection_preface(settings: &SettingsFrame) -> Bytes {
    let mut buf = BytesMut::with_capacity(CONNECTION_PREFACE.len() + FRAME_HEADER_LEN + 36);
    buf.put_slice(CONNECTION_PREFACE);
    Frame::Settings(settings.clone()).encode(&mut buf);
    buf.freeze()
}

/// The ten frame kinds this codec understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
}

impl FrameKind {
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            frame_type::DATA => Self::Data,
            frame_type::HEADERS => Self::Headers,
            frame_type::PRIORITY => Self::Priority,
            frame_type::RST_STREAM => Self::RstStream,
            frame_type::SETTINGS => Self::Settings,
            frame_type::PUSH_PROMISE => Self::PushPromise,
            frame_type::PING => Self::Ping,
            frame_type::GOAWAY => Self::GoAway,
            frame_type::WINDOW_UPDATE => Self::WindowUpdate,
            frame_type::CONTINUATION => Self::Continuation,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Data => frame_type::DATA,
            Self::Headers => frame_type::HEADERS,
            Self::Priority => frame_type::PRIORITY,
            Self::RstStream => frame_type::RST_STREAM,
            Self::Settings => frame_type::SETTINGS,
            Self::PushPromise => frame_type::PUSH_PROMISE,
            Self::Ping => frame_type::PING,
            Self::GoAway => frame_type::GOAWAY,
            Self::WindowUpdate => frame_type::WINDOW_UPDATE,
            Self::Continuation => frame_type::CONTINUATION,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Headers => "HEADERS",
            Self::Priority => "PRIORITY",
            Self::RstStream => "RST_STREAM",
            Self::Settings => "SETTINGS",
            Self::PushPromise => "PUSH_PROMISE",
            Self::Ping => "PING",
            Self::GoAway => "GOAWAY",
            Self::WindowUpdate => "WINDOW_UPDATE",
            Self::Continuation => "CONTINUATION",
        }
    }

    /// Kinds that may only travel on stream 0.
    pub fn is_connection_scoped(self) -> bool {
        matches!(self, Self::Settings | Self::Ping | Self::GoAway)
    }

    /// Kinds whose header block may be continued by CONTINUATION frames.
    pub fn is_continuable(self) -> bool {
        matches!(self, Self::Headers | Self::PushPromise | Self::Continuation)
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed HTTP/2 frame header (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// Parse a 9-byte frame header
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }

        let length = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | (data[2] as u32);
        let stream_id = read_u32(&data[5..9]) & STREAM_ID_MASK; // Clear reserved bit

        Some(Self {
            length,
            frame_type: data[3],
            flags: data[4],
            stream_id,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8((self.length >> 16) as u8);
        buf.put_u8((self.length >> 8) as u8);
        buf.put_u8(self.length as u8);
        buf.put_u8(self.frame_type);
        buf.put_u8(self.flags);
        buf.put_u32(self.stream_id & STREAM_ID_MASK);
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_LEN + self.length as usize
    }
}

/// Stream dependency and weight, either from a PRIORITY frame or embedded in
/// HEADERS. `weight` is the effective weight (1..=256); the wire carries
/// `weight - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFields {
    pub exclusive: bool,
    pub dependency: u32,
    pub weight: u16,
}

impl PriorityFields {
    pub fn new(dependency: u32, exclusive: bool, weight: u16) -> Self {
        Self {
            exclusive,
            dependency: dependency & STREAM_ID_MASK,
            weight: weight.clamp(1, 256),
        }
    }

    fn parse(data: &[u8]) -> Self {
        let raw = read_u32(&data[..4]);
        Self {
            exclusive: raw & 0x8000_0000 != 0,
            dependency: raw & STREAM_ID_MASK,
            weight: data[4] as u16 + 1,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        let mut dep = self.dependency & STREAM_ID_MASK;
        if self.exclusive {
            dep |= 0x8000_0000;
        }
        buf.put_u32(dep);
        buf.put_u8((self.weight.clamp(1, 256) - 1) as u8);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: u32,
    pub data: Bytes,
    pub end_stream: bool,
    pub pad_length: Option<u8>,
    payload_len: usize,
}

impl DataFrame {
    pub fn new(stream_id: u32, data: impl Into<Bytes>, end_stream: bool) -> Self {
        let data = data.into();
        Self {
            stream_id,
            payload_len: data.len(),
            data,
            end_stream,
            pad_length: None,
        }
    }

    pub fn with_padding(mut self, pad_length: u8) -> Self {
        self.pad_length = Some(pad_length);
        self.payload_len = padded_len(self.data.len(), 0, Some(pad_length));
        self
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Bytes charged against flow control: the whole payload, padding
    /// included.
    pub fn flow_controlled_len(&self) -> usize {
        self.payload_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub stream_id: u32,
    pub fragment: Bytes,
    pub end_stream: bool,
    pub end_headers: bool,
    pub pad_length: Option<u8>,
    pub priority: Option<PriorityFields>,
    payload_len: usize,
}

impl HeadersFrame {
    pub fn new(stream_id: u32, fragment: impl Into<Bytes>, end_stream: bool, end_headers: bool) -> Self {
        let fragment = fragment.into();
        Self {
            stream_id,
            payload_len: fragment.len(),
            fragment,
            end_stream,
            end_headers,
            pad_length: None,
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: PriorityFields) -> Self {
        self.priority = Some(priority);
        self.recompute_len();
        self
    }

    pub fn with_padding(mut self, pad_length: u8) -> Self {
        self.pad_length = Some(pad_length);
        self.recompute_len();
        self
    }

    fn recompute_len(&mut self) {
        let prefix = if self.priority.is_some() { PRIORITY_PAYLOAD_LEN } else { 0 };
        self.payload_len = padded_len(self.fragment.len(), prefix, self.pad_length);
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityFrame {
    pub stream_id: u32,
    pub priority: PriorityFields,
    payload_len: usize,
}

impl PriorityFrame {
    pub fn new(stream_id: u32, priority: PriorityFields) -> Self {
        Self {
            stream_id,
            priority,
            payload_len: PRIORITY_PAYLOAD_LEN,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: u32,
    pub error_code: ErrorCode,
    payload_len: usize,
}

impl RstStreamFrame {
    pub fn new(stream_id: u32, error_code: ErrorCode) -> Self {
        Self {
            stream_id,
            error_code,
            payload_len: RST_STREAM_PAYLOAD_LEN,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
}

/// SETTINGS frame. Entries are kept sorted by identifier so encoding is
/// reproducible. An empty non-ACK frame is valid ("nothing changed"); ACK
/// is carried only by the flag bit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SettingsFrame {
    pub ack: bool,
    pub settings: BTreeMap<u16, u32>,
    payload_len: usize,
}

impl SettingsFrame {
    pub fn new(settings: BTreeMap<u16, u32>) -> Self {
        Self {
            ack: false,
            payload_len: settings.len() * SETTING_ENTRY_LEN,
            settings,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ack() -> Self {
        Self {
            ack: true,
            ..Self::default()
        }
    }

    /// Add or replace one entry.
    pub fn with(mut self, id: u16, value: u32) -> Self {
        self.settings.insert(id, value);
        self.payload_len = self.settings.len() * SETTING_ENTRY_LEN;
        self
    }

    pub fn get(&self, id: u16) -> Option<u32> {
        self.settings.get(&id).copied()
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPromiseFrame {
    pub stream_id: u32,
    pub promised_stream_id: u32,
    pub fragment: Bytes,
    pub end_headers: bool,
    pub pad_length: Option<u8>,
    payload_len: usize,
}

impl PushPromiseFrame {
    pub fn new(stream_id: u32, promised_stream_id: u32, fragment: impl Into<Bytes>, end_headers: bool) -> Self {
        let fragment = fragment.into();
        Self {
            stream_id,
            promised_stream_id: promised_stream_id & STREAM_ID_MASK,
            payload_len: fragment.len() + 4,
            fragment,
            end_headers,
            pad_length: None,
        }
    }

    pub fn with_padding(mut self, pad_length: u8) -> Self {
        self.pad_length = Some(pad_length);
        self.payload_len = padded_len(self.fragment.len(), 4, Some(pad_length));
        self
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingFrame {
    pub ack: bool,
    pub data: [u8; 8],
    payload_len: usize,
}

impl PingFrame {
    pub fn new(data: [u8; 8]) -> Self {
        Self {
            ack: false,
            data,
            payload_len: PING_PAYLOAD_LEN,
        }
    }

    /// The reply to `self`: same opaque payload, ACK bit set.
    pub fn to_ack(&self) -> Self {
        Self {
            ack: true,
            data: self.data,
            payload_len: PING_PAYLOAD_LEN,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub last_stream_id: u32,
    pub error_code: ErrorCode,
    pub debug_data: Bytes,
    payload_len: usize,
}

impl GoAwayFrame {
    pub fn new(last_stream_id: u32, error_code: ErrorCode, debug_data: impl Into<Bytes>) -> Self {
        let debug_data = debug_data.into();
        Self {
            last_stream_id: last_stream_id & STREAM_ID_MASK,
            error_code,
            payload_len: 8 + debug_data.len(),
            debug_data,
        }
    }

    pub fn debug_text(&self) -> String {
        String::from_utf8_lossy(&self.debug_data).into_owned()
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    pub stream_id: u32,
    pub increment: u32,
    payload_len: usize,
}

impl WindowUpdateFrame {
    pub fn new(stream_id: u32, increment: u32) -> Self {
        Self {
            stream_id,
            increment: increment & STREAM_ID_MASK,
            payload_len: WINDOW_UPDATE_PAYLOAD_LEN,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationFrame {
    pub stream_id: u32,
    pub fragment: Bytes,
    pub end_headers: bool,
}

impl ContinuationFrame {
    pub fn new(stream_id: u32, fragment: impl Into<Bytes>, end_headers: bool) -> Self {
        Self {
            stream_id,
            fragment: fragment.into(),
            end_headers,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.fragment.len()
    }
}

/// A typed HTTP/2 frame, decided once at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    Headers(HeadersFrame),
    Priority(PriorityFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    PushPromise(PushPromiseFrame),
    Ping(PingFrame),
    GoAway(GoAwayFrame),
    WindowUpdate(WindowUpdateFrame),
    Continuation(ContinuationFrame),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Data(_) => FrameKind::Data,
            Frame::Headers(_) => FrameKind::Headers,
            Frame::Priority(_) => FrameKind::Priority,
            Frame::RstStream(_) => FrameKind::RstStream,
            Frame::Settings(_) => FrameKind::Settings,
            Frame::PushPromise(_) => FrameKind::PushPromise,
            Frame::Ping(_) => FrameKind::Ping,
            Frame::GoAway(_) => FrameKind::GoAway,
            Frame::WindowUpdate(_) => FrameKind::WindowUpdate,
            Frame::Continuation(_) => FrameKind::Continuation,
        }
    }

    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Data(f) => f.stream_id,
            Frame::Headers(f) => f.stream_id,
            Frame::Priority(f) => f.stream_id,
            Frame::RstStream(f) => f.stream_id,
            Frame::PushPromise(f) => f.stream_id,
            Frame::WindowUpdate(f) => f.stream_id,
            Frame::Continuation(f) => f.stream_id,
            Frame::Settings(_) | Frame::Ping(_) | Frame::GoAway(_) => 0,
        }
    }

    /// Declared payload length (the header's length field).
    pub fn payload_len(&self) -> usize {
        match self {
            Frame::Data(f) => f.payload_len(),
            Frame::Headers(f) => f.payload_len(),
            Frame::Priority(f) => f.payload_len(),
            Frame::RstStream(f) => f.payload_len(),
            Frame::Settings(f) => f.payload_len(),
            Frame::PushPromise(f) => f.payload_len(),
            Frame::Ping(f) => f.payload_len(),
            Frame::GoAway(f) => f.payload_len(),
            Frame::WindowUpdate(f) => f.payload_len(),
            Frame::Continuation(f) => f.payload_len(),
        }
    }

    pub fn flags(&self) -> u8 {
        let mut bits = 0u8;
        match self {
            Frame::Data(f) => {
                set(&mut bits, flags::END_STREAM, f.end_stream);
                set(&mut bits, flags::PADDED, f.pad_length.is_some());
            }
            Frame::Headers(f) => {
                set(&mut bits, flags::END_STREAM, f.end_stream);
                set(&mut bits, flags::END_HEADERS, f.end_headers);
                set(&mut bits, flags::PADDED, f.pad_length.is_some());
                set(&mut bits, flags::PRIORITY, f.priority.is_some());
            }
            Frame::PushPromise(f) => {
                set(&mut bits, flags::END_HEADERS, f.end_headers);
                set(&mut bits, flags::PADDED, f.pad_length.is_some());
            }
            Frame::Continuation(f) => set(&mut bits, flags::END_HEADERS, f.end_headers),
            Frame::Settings(f) => set(&mut bits, flags::ACK, f.ack),
            Frame::Ping(f) => set(&mut bits, flags::ACK, f.ack),
            Frame::Priority(_) | Frame::RstStream(_) | Frame::GoAway(_) | Frame::WindowUpdate(_) => {}
        }
        bits
    }

    /// Whether this frame carries END_STREAM.
    pub fn is_end_stream(&self) -> bool {
        match self {
            Frame::Data(f) => f.end_stream,
            Frame::Headers(f) => f.end_stream,
            _ => false,
        }
    }

    /// For continuable kinds, whether the header block ends with this frame.
    pub fn end_headers(&self) -> Option<bool> {
        match self {
            Frame::Headers(f) => Some(f.end_headers),
            Frame::PushPromise(f) => Some(f.end_headers),
            Frame::Continuation(f) => Some(f.end_headers),
            _ => None,
        }
    }

    /// Pad length of a PADDED frame.
    pub fn pad_length(&self) -> Option<u8> {
        match self {
            Frame::Data(f) => f.pad_length,
            Frame::Headers(f) => f.pad_length,
            Frame::PushPromise(f) => f.pad_length,
            _ => None,
        }
    }

    /// Whether the declared padding fits inside the payload alongside the
    /// pad-length octet and any fixed fields.
    pub fn padding_fits(&self) -> bool {
        let prefix = match self {
            Frame::Headers(f) if f.priority.is_some() => PRIORITY_PAYLOAD_LEN,
            Frame::PushPromise(_) => 4,
            _ => 0,
        };
        match self.pad_length() {
            None => true,
            Some(pad) => 1 + prefix + pad as usize <= self.payload_len(),
        }
    }

    /// Serialize the frame (header + payload) into `buf`. Total for every
    /// well-formed frame.
    pub fn encode(&self, buf: &mut BytesMut) {
        let header = FrameHeader {
            length: self.payload_len() as u32,
            frame_type: self.kind().as_u8(),
            flags: self.flags(),
            stream_id: self.stream_id(),
        };
        buf.reserve(header.total_size());
        header.encode(buf);

        match self {
            Frame::Data(f) => {
                put_padded(buf, f.pad_length, |buf| buf.put_slice(&f.data));
            }
            Frame::Headers(f) => {
                put_padded(buf, f.pad_length, |buf| {
                    if let Some(priority) = &f.priority {
                        priority.encode(buf);
                    }
                    buf.put_slice(&f.fragment);
                });
            }
            Frame::Priority(f) => f.priority.encode(buf),
            Frame::RstStream(f) => buf.put_u32(f.error_code.as_u32()),
            Frame::Settings(f) => {
                if !f.ack {
                    for (id, value) in &f.settings {
                        buf.put_u16(*id);
                        buf.put_u32(*value);
                    }
                }
            }
            Frame::PushPromise(f) => {
                put_padded(buf, f.pad_length, |buf| {
                    buf.put_u32(f.promised_stream_id & STREAM_ID_MASK);
                    buf.put_slice(&f.fragment);
                });
            }
            Frame::Ping(f) => buf.put_slice(&f.data),
            Frame::GoAway(f) => {
                buf.put_u32(f.last_stream_id & STREAM_ID_MASK);
                buf.put_u32(f.error_code.as_u32());
                buf.put_slice(&f.debug_data);
            }
            Frame::WindowUpdate(f) => buf.put_u32(f.increment & STREAM_ID_MASK),
            Frame::Continuation(f) => buf.put_slice(&f.fragment),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + self.payload_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode exactly one frame from `raw` (header + payload).
    pub fn decode(raw: &[u8]) -> Result<Frame> {
        let header = FrameHeader::parse(raw).ok_or_else(|| {
            Error::protocol(
                ErrorCode::ProtocolError,
                format!("frame shorter than its 9-byte header ({} bytes)", raw.len()),
            )
        })?;
        let actual = raw.len() - FRAME_HEADER_LEN;
        if actual != header.length as usize {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                format!(
                    "declared payload length {} does not match actual payload size {}",
                    header.length, actual
                ),
            ));
        }
        Frame::from_parts(&header, Bytes::copy_from_slice(&raw[FRAME_HEADER_LEN..]))
    }

    /// Build the typed frame from an already split header and payload.
    pub fn from_parts(header: &FrameHeader, payload: Bytes) -> Result<Frame> {
        let kind = FrameKind::from_u8(header.frame_type).ok_or_else(|| {
            Error::protocol(
                ErrorCode::ProtocolError,
                format!("unknown frame type code: 0x{:x}", header.frame_type),
            )
        })?;
        let bits = header.flags;
        let stream_id = header.stream_id;
        let payload_len = payload.len();

        let frame = match kind {
            FrameKind::Data => {
                let (pad_length, body) = split_padded(kind, &payload, bits, 0)?;
                Frame::Data(DataFrame {
                    stream_id,
                    data: body,
                    end_stream: bits & flags::END_STREAM != 0,
                    pad_length,
                    payload_len,
                })
            }
            FrameKind::Headers => {
                let prefix = if bits & flags::PRIORITY != 0 { PRIORITY_PAYLOAD_LEN } else { 0 };
                let (pad_length, body) = split_padded(kind, &payload, bits, prefix)?;
                let priority = if prefix > 0 {
                    let offset = usize::from(pad_length.is_some());
                    Some(PriorityFields::parse(&payload[offset..offset + PRIORITY_PAYLOAD_LEN]))
                } else {
                    None
                };
                Frame::Headers(HeadersFrame {
                    stream_id,
                    fragment: body,
                    end_stream: bits & flags::END_STREAM != 0,
                    end_headers: bits & flags::END_HEADERS != 0,
                    pad_length,
                    priority,
                    payload_len,
                })
            }
            FrameKind::Priority => {
                require_len(kind, &payload, PRIORITY_PAYLOAD_LEN)?;
                Frame::Priority(PriorityFrame {
                    stream_id,
                    priority: PriorityFields::parse(&payload),
                    payload_len,
                })
            }
            FrameKind::RstStream => {
                require_len(kind, &payload, RST_STREAM_PAYLOAD_LEN)?;
                Frame::RstStream(RstStreamFrame {
                    stream_id,
                    error_code: ErrorCode::from_u32(read_u32(&payload)),
                    payload_len,
                })
            }
            FrameKind::Settings => {
                let settings = payload
                    .chunks_exact(SETTING_ENTRY_LEN)
                    .map(|entry| (u16::from_be_bytes([entry[0], entry[1]]), read_u32(&entry[2..])))
                    .collect();
                Frame::Settings(SettingsFrame {
                    ack: bits & flags::ACK != 0,
                    settings,
                    payload_len,
                })
            }
            FrameKind::PushPromise => {
                let (pad_length, body) = split_padded(kind, &payload, bits, 4)?;
                let offset = usize::from(pad_length.is_some());
                Frame::PushPromise(PushPromiseFrame {
                    stream_id,
                    promised_stream_id: read_u32(&payload[offset..]) & STREAM_ID_MASK,
                    fragment: body,
                    end_headers: bits & flags::END_HEADERS != 0,
                    pad_length,
                    payload_len,
                })
            }
            FrameKind::Ping => {
                require_len(kind, &payload, PING_PAYLOAD_LEN)?;
                let mut data = [0u8; 8];
                data.copy_from_slice(&payload[..8]);
                Frame::Ping(PingFrame {
                    ack: bits & flags::ACK != 0,
                    data,
                    payload_len,
                })
            }
            FrameKind::GoAway => {
                require_len(kind, &payload, 8)?;
                Frame::GoAway(GoAwayFrame {
                    last_stream_id: read_u32(&payload) & STREAM_ID_MASK,
                    error_code: ErrorCode::from_u32(read_u32(&payload[4..])),
                    debug_data: payload.slice(8..),
                    payload_len,
                })
            }
            FrameKind::WindowUpdate => {
                require_len(kind, &payload, WINDOW_UPDATE_PAYLOAD_LEN)?;
                Frame::WindowUpdate(WindowUpdateFrame {
                    stream_id,
                    increment: read_u32(&payload) & STREAM_ID_MASK,
                    payload_len,
                })
            }
            FrameKind::Continuation => Frame::Continuation(ContinuationFrame {
                stream_id,
                fragment: payload,
                end_headers: bits & flags::END_HEADERS != 0,
            }),
        };
        Ok(frame)
    }
}

impl From<DataFrame> for Frame {
    fn from(f: DataFrame) -> Self {
        Frame::Data(f)
    }
}

impl From<HeadersFrame> for Frame {
    fn from(f: HeadersFrame) -> Self {
        Frame::Headers(f)
    }
}

impl From<PriorityFrame> for Frame {
    fn from(f: PriorityFrame) -> Self {
        Frame::Priority(f)
    }
}

impl From<RstStreamFrame> for Frame {
    fn from(f: RstStreamFrame) -> Self {
        Frame::RstStream(f)
    }
}

impl From<SettingsFrame> for Frame {
    fn from(f: SettingsFrame) -> Self {
        Frame::Settings(f)
    }
}

impl From<PushPromiseFrame> for Frame {
    fn from(f: PushPromiseFrame) -> Self {
        Frame::PushPromise(f)
    }
}

impl From<PingFrame> for Frame {
    fn from(f: PingFrame) -> Self {
        Frame::Ping(f)
    }
}

impl From<GoAwayFrame> for Frame {
    fn from(f: GoAwayFrame) -> Self {
        Frame::GoAway(f)
    }
}

impl From<WindowUpdateFrame> for Frame {
    fn from(f: WindowUpdateFrame) -> Self {
        Frame::WindowUpdate(f)
    }
}

impl From<ContinuationFrame> for Frame {
    fn from(f: ContinuationFrame) -> Self {
        Frame::Continuation(f)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[len={}, flags=0x{:02x}, stream={}",
            self.kind(),
            self.payload_len(),
            self.flags(),
            self.stream_id()
        )?;
        match self {
            Frame::Data(d) => write!(f, ", data={}B, end_stream={}", d.data.len(), d.end_stream)?,
            Frame::Headers(h) => {
                write!(f, ", block={}B, end_stream={}, end_headers={}", h.fragment.len(), h.end_stream, h.end_headers)?;
                if let Some(p) = &h.priority {
                    write!(f, ", dep={}{}, weight={}", p.dependency, if p.exclusive { "(E)" } else { "" }, p.weight)?;
                }
            }
            Frame::Priority(p) => write!(
                f,
                ", dep={}{}, weight={}",
                p.priority.dependency,
                if p.priority.exclusive { "(E)" } else { "" },
                p.priority.weight
            )?,
            Frame::RstStream(r) => write!(f, ", code={}", r.error_code)?,
            Frame::Settings(s) => {
                write!(f, ", ack={}", s.ack)?;
                for (id, value) in &s.settings {
                    write!(f, ", 0x{id:x}={value}")?;
                }
            }
            Frame::PushPromise(p) => write!(f, ", promised={}, block={}B", p.promised_stream_id, p.fragment.len())?,
            Frame::Ping(p) => write!(f, ", ack={}, data={:02x?}", p.ack, p.data)?,
            Frame::GoAway(g) => write!(f, ", last={}, code={}, debug={:?}", g.last_stream_id, g.error_code, g.debug_text())?,
            Frame::WindowUpdate(w) => write!(f, ", increment={}", w.increment)?,
            Frame::Continuation(c) => write!(f, ", block={}B, end_headers={}", c.fragment.len(), c.end_headers)?,
        }
        f.write_str("]")
    }
}

/// A received frame together with its arrival time.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub frame: Frame,
    pub received_at: SystemTime,
}

impl FrameRecord {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            received_at: SystemTime::now(),
        }
    }
}

/// Split an encoded header block into HEADERS followed by as many
/// CONTINUATION frames as needed, each fragment at most `max_fragment`
/// bytes. END_STREAM rides on the HEADERS frame; END_HEADERS on the last one.
pub fn split_header_block(
    stream_id: u32,
    block: Bytes,
    end_stream: bool,
    priority: Option<PriorityFields>,
    max_fragment: usize,
) -> Vec<Frame> {
    let max_fragment = max_fragment.max(1);
    let mut frames = Vec::with_capacity(block.len() / max_fragment + 1);
    let mut rest = block;

    let first_len = rest.len().min(max_fragment);
    let first = rest.split_to(first_len);
    let mut headers = HeadersFrame::new(stream_id, first, end_stream, rest.is_empty());
    if let Some(priority) = priority {
        headers = headers.with_priority(priority);
    }
    frames.push(Frame::Headers(headers));

    while !rest.is_empty() {
        let len = rest.len().min(max_fragment);
        let chunk = rest.split_to(len);
        frames.push(Frame::Continuation(ContinuationFrame::new(
            stream_id,
            chunk,
            rest.is_empty(),
        )));
    }
    frames
}

/// Buffers raw transport bytes and yields complete frames in arrival order.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Buffer for incomplete frames
    buffer: BytesMut,
    /// Largest payload accepted (FRAME_SIZE_ERROR above it).
    max_frame_size: u32,
    /// Whether a leading preface magic still has to be skipped (server role
    /// and tests only; a client never receives one).
    expect_preface: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            expect_preface: false,
        }
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: u32) {
        self.max_frame_size = max_frame_size.min(MAX_FRAME_LENGTH);
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    pub fn expect_preface(&mut self, expect: bool) {
        self.expect_preface = expect;
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete frame out of the buffer, if one is there.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.expect_preface {
            if self.buffer.len() < CONNECTION_PREFACE.len() {
                return Ok(None);
            }
            if is_connection_preface(&self.buffer) {
                let _ = self.buffer.split_to(CONNECTION_PREFACE.len());
            }
            self.expect_preface = false;
        }

        let header = match FrameHeader::parse(&self.buffer) {
            Some(h) => h,
            None => return Ok(None),
        };
        if header.length > self.max_frame_size {
            return Err(Error::protocol(
                ErrorCode::FrameSizeError,
                format!(
                    "frame payload length {} exceeds SETTINGS_MAX_FRAME_SIZE {}",
                    header.length, self.max_frame_size
                ),
            ));
        }
        if self.buffer.len() < header.total_size() {
            return Ok(None);
        }

        let mut raw = self.buffer.split_to(header.total_size());
        let payload = raw.split_off(FRAME_HEADER_LEN).freeze();
        Frame::from_parts(&header, payload).map(Some)
    }

    /// Feed bytes and drain every complete frame.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.push(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

fn set(bits: &mut u8, flag: u8, on: bool) {
    if on {
        *bits |= flag;
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn padded_len(body: usize, prefix: usize, pad_length: Option<u8>) -> usize {
    match pad_length {
        Some(pad) => 1 + prefix + body + pad as usize,
        None => prefix + body,
    }
}

fn put_padded(buf: &mut BytesMut, pad_length: Option<u8>, body: impl FnOnce(&mut BytesMut)) {
    if let Some(pad) = pad_length {
        buf.put_u8(pad);
    }
    body(buf);
    if let Some(pad) = pad_length {
        buf.put_bytes(0, pad as usize);
    }
}

fn require_len(kind: FrameKind, payload: &[u8], min: usize) -> Result<()> {
    if payload.len() < min {
        return Err(Error::protocol(
            ErrorCode::FrameSizeError,
            format!("{kind} frame too short ({} bytes, need {min})", payload.len()),
        ));
    }
    Ok(())
}

/// Returns the pad length (if PADDED) and the body that follows the
/// pad-length octet and `prefix` bytes of fixed fields, with trailing padding
/// removed. Padding that overruns the payload is not an error here; the body
/// is simply clamped to empty and the dispatcher rejects the frame.
fn split_padded(kind: FrameKind, payload: &Bytes, bits: u8, prefix: usize) -> Result<(Option<u8>, Bytes)> {
    let (pad_length, rest) = if bits & flags::PADDED != 0 {
        if payload.is_empty() {
            return Err(Error::protocol(
                ErrorCode::FrameSizeError,
                format!("PADDED {kind} frame with no payload"),
            ));
        }
        (Some(payload[0]), payload.slice(1..))
    } else {
        (None, payload.clone())
    };
    require_len(kind, &rest, prefix)?;
    let pad = pad_length.map_or(0, usize::from);
    let end = rest.len().saturating_sub(pad).max(prefix);
    Ok((pad_length, rest.slice(prefix..end)))
}
