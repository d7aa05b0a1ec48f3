//! Error codes (RFC 7540 Section 7) and the crate-wide error type.

use std::fmt;
use std::time::Duration;

use thiserror::Error as ThisError;

/// HTTP/2 error codes carried by RST_STREAM and GOAWAY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,
    ProtocolError,
    InternalError,
    FlowControlError,
    SettingsTimeout,
    StreamClosed,
    FrameSizeError,
    RefusedStream,
    Cancel,
    CompressionError,
    ConnectError,
    EnhanceYourCalm,
    InadequateSecurity,
    Http11Required,
    /// A code outside the RFC table, kept verbatim.
    Unknown(u32),
}

impl ErrorCode {
    pub fn from_u32(v: u32) -> Self {
        match v {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x2 => Self::InternalError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::NoError => 0x0,
            Self::ProtocolError => 0x1,
            Self::InternalError => 0x2,
            Self::FlowControlError => 0x3,
            Self::SettingsTimeout => 0x4,
            Self::StreamClosed => 0x5,
            Self::FrameSizeError => 0x6,
            Self::RefusedStream => 0x7,
            Self::Cancel => 0x8,
            Self::CompressionError => 0x9,
            Self::ConnectError => 0xa,
            Self::EnhanceYourCalm => 0xb,
            Self::InadequateSecurity => 0xc,
            Self::Http11Required => 0xd,
            Self::Unknown(v) => v,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(v) => write!(f, "UNKNOWN(0x{v:x})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// The last GOAWAY received from the peer, surfaced to blocked callers so
/// they can tell a deliberate close from a silent peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAwayInfo {
    pub last_stream_id: u32,
    pub error_code: ErrorCode,
    pub debug_data: String,
}

impl fmt::Display for GoAwayInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GOAWAY(last_stream_id={}, code={}, debug={:?})",
            self.last_stream_id, self.error_code, self.debug_data
        )
    }
}

fn describe_goaway(goaway: &Option<GoAwayInfo>) -> String {
    match goaway {
        Some(g) => format!(" (peer sent {g})"),
        None => String::new(),
    }
}

fn reset_origin(by_peer: &bool) -> &'static str {
    if *by_peer {
        "peer"
    } else {
        "local endpoint"
    }
}

#[derive(ThisError, Debug)]
pub enum Error {
    /// Connection error: the whole connection is torn down with GOAWAY.
    #[error("connection error {code}: {message}")]
    Protocol { code: ErrorCode, message: String },
    /// Stream error: only the named stream is reset.
    #[error("stream {stream_id} error {code}: {message}")]
    Stream {
        stream_id: u32,
        code: ErrorCode,
        message: String,
    },
    #[error("timed out waiting for SETTINGS acknowledgement{}", describe_goaway(.goaway))]
    SettingsTimeout { goaway: Option<GoAwayInfo> },
    #[error("timed out waiting for PING acknowledgement{}", describe_goaway(.goaway))]
    PingTimeout { goaway: Option<GoAwayInfo> },
    #[error("timed out waiting for the reply to the connection preface")]
    HandshakeTimeout,
    #[error("HTTP/2 handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("stream {stream_id} idle for {idle:?} without a complete response{}", describe_goaway(.goaway))]
    ResponseIdleTimeout {
        stream_id: u32,
        idle: Duration,
        goaway: Option<GoAwayInfo>,
    },
    #[error("stream {stream_id} was reset ({code}) by {}", reset_origin(.by_peer))]
    StreamReset {
        stream_id: u32,
        code: ErrorCode,
        by_peer: bool,
    },
    #[error("peer allows at most {limit} concurrent streams")]
    StreamLimit { limit: u32 },
    #[error("failed to send frame: {0}")]
    Send(String),
    #[error("connection closed{}", describe_goaway(.goaway))]
    Closed { goaway: Option<GoAwayInfo> },
    #[error("header compression error: {0}")]
    Compression(String),
    #[error("flow-control wait on stream {stream_id} cancelled: window closed")]
    FlowControlClosed { stream_id: u32 },
    #[error("io error {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn protocol(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn stream(stream_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Stream {
            stream_id,
            code,
            message: message.into(),
        }
    }

    /// The error code to report on the wire for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Protocol { code, .. } | Self::Stream { code, .. } => *code,
            Self::StreamReset { code, .. } => *code,
            Self::SettingsTimeout { .. } => ErrorCode::SettingsTimeout,
            Self::Compression(_) => ErrorCode::CompressionError,
            Self::FlowControlClosed { .. } => ErrorCode::Cancel,
            Self::StreamLimit { .. } => ErrorCode::RefusedStream,
            _ => ErrorCode::InternalError,
        }
    }

    /// True for errors that must terminate the whole connection.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Compression(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
