//! h2-wire-client: a blocking, multiplexed HTTP/2 client engine
//!
//! This crate drives the client side of an HTTP/2 connection over any
//! ordered byte transport. It was built for protocol conformance testing:
//! every received frame is kept, timing is observable, and the caller can
//! put arbitrary (even invalid) frames on the wire.
//!
//! # Features
//!
//! - **Frame Codec**: all ten RFC 7540 frame types, padding and priority
//!   fields included
//! - **Stream State Machine**: RFC 7540 Section 5.1 with separate local and
//!   remote reset states
//! - **Flow Control**: blocking send windows per stream and per connection,
//!   automatic WINDOW_UPDATE on receive
//! - **Priority Tree**: dependency/weight bookkeeping with cycle repair
//! - **HPACK**: header compression via fluke-hpack
//! - **Server Push**: PUSH_PROMISE decoding and pushed responses
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::net::TcpStream;
//! use h2_wire_client::{Connection, ConnectionConfig, Request, TcpTransport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let socket = TcpStream::connect("127.0.0.1:8080")?;
//! let conn = Connection::new(TcpTransport::new(socket.try_clone()?), ConnectionConfig::default());
//! conn.spawn_reader(socket)?;
//! conn.handshake()?;
//!
//! let stream = conn.request(&Request::get("http", "127.0.0.1:8080", "/"))?;
//! let mut response = stream.response()?;
//! println!("{:?} {}", response.status(), response.text()?);
//! conn.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`frame`]: bytes <-> [`Frame`] values, plus a buffering [`FrameDecoder`]
//! - [`Connection`]: validates and dispatches inbound frames, owns the stream
//!   table and connection-level state
//! - [`Stream`]: per-stream state, outbound sequencing and response assembly
//! - [`FlowControlWindow`] / [`PriorityTree`]: the shared bookkeeping
//!
//! It does NOT provide TLS, ALPN, or the HTTP/1.1 upgrade request itself.

pub mod body;
pub mod config;
pub mod connection;
pub mod error;
pub mod flow_control;
pub mod frame;
pub mod hpack;
pub mod message;
pub mod priority;
pub mod settings;
mod signal;
pub mod stream;
pub mod transport;

pub use body::{Body, BodySink, SpillFactory};
pub use config::ConnectionConfig;
pub use connection::{Connection, UPGRADE_STREAM_ID};
pub use error::{Error, ErrorCode, GoAwayInfo, Result};
pub use flow_control::{FlowControlWindow, Reservation};
pub use frame::{
    flags, frame_type, ContinuationFrame, DataFrame, Frame, FrameDecoder, FrameHeader, FrameKind,
    FrameRecord, GoAwayFrame, HeadersFrame, PingFrame, PriorityFields, PriorityFrame,
    PushPromiseFrame, RstStreamFrame, SettingsFrame, WindowUpdateFrame, CONNECTION_PREFACE,
};
pub use hpack::{Header, HeaderCodec};
pub use message::{Headers, PushKey, PushRequest, Request, Response};
pub use priority::PriorityTree;
pub use settings::{settings_id, Settings};
pub use stream::{ResetInfo, Stream, StreamState};
pub use transport::{IoTransport, TcpTransport, Transport};
