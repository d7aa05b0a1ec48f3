//! Connection dispatcher.
//!
//! [`Connection`] owns the stream table, the connection-level send window,
//! the SETTINGS/PING round trips and the inbound validation loop. Inbound
//! bytes go through [`Connection::process`] on a single reader context (the
//! caller's, or a thread started with [`Connection::spawn_reader`]); frames
//! are validated and dispatched strictly in arrival order.
//!
//! Connection errors answer with GOAWAY and close the transport. Stream
//! errors answer with RST_STREAM and leave every other stream alone.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{Error, ErrorCode, GoAwayInfo, Result};
use crate::flow_control::{FlowControlWindow, ReceiveWindow, DEFAULT_WINDOW_SIZE};
use crate::frame::{
    self, split_header_block, DataFrame, Frame, FrameDecoder, FrameKind, FrameRecord, GoAwayFrame,
    HeadersFrame, PingFrame, PriorityFields, PushPromiseFrame, SettingsFrame, WindowUpdateFrame,
};
use crate::hpack::{header_list_size, Header, HeaderCodec};
use crate::message::{Headers, PushRequest, Request, Response};
use crate::priority::{PriorityTree, DEFAULT_WEIGHT, ROOT};
use crate::settings::Settings;
use crate::signal::Promise;
use crate::stream::{Stream, StreamState};
use crate::transport::Transport;

/// Stream 1 is reserved for the HTTP/1.1 upgrade request.
pub const UPGRADE_STREAM_ID: u32 = 1;

const FIRST_LOCAL_STREAM_ID: u32 = 3;
const MAX_STREAM_ID: u32 = 0x7fff_ffff;
const READ_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy)]
struct LastFrame {
    kind: FrameKind,
    stream_id: u32,
    end_headers: bool,
}

impl LastFrame {
    fn expects_continuation(&self) -> bool {
        self.kind.is_continuable() && !self.end_headers
    }
}

#[derive(Debug)]
struct ReaderState {
    decoder: FrameDecoder,
    last: Option<LastFrame>,
}

type PendingSettings = (SettingsFrame, Arc<Promise<()>>);

pub(crate) struct Shared {
    me: Weak<Shared>,
    pub(crate) config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    streams: RwLock<HashMap<u32, Arc<Stream>>>,
    pub(crate) window: FlowControlWindow,
    recv_window: Mutex<ReceiveWindow>,
    pub(crate) priority: Mutex<PriorityTree>,
    codec: Mutex<HeaderCodec>,
    local_settings: RwLock<Settings>,
    pub(crate) remote_settings: RwLock<Settings>,
    next_stream_id: AtomicU32,
    opening: Mutex<()>,
    last_received_stream_id: AtomicU32,
    highest_promised_id: AtomicU32,
    last_goaway: Mutex<Option<GoAwayInfo>>,
    goaway_sent: AtomicBool,
    closed: AtomicBool,
    handshake: Promise<()>,
    handshake_done: AtomicBool,
    pending_settings: Mutex<VecDeque<PendingSettings>>,
    pending_ping: Mutex<Option<([u8; 8], Arc<Promise<()>>)>>,
    ping_counter: AtomicU64,
    history: Mutex<VecDeque<FrameRecord>>,
    reader: Mutex<ReaderState>,
}

/// Client side of one HTTP/2 connection. Cheap to clone; clones share the
/// same connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("streams", &self.shared.streams.read().len())
            .field("window", &self.shared.window.available())
            .field("closed", &self.shared.closed.load(Ordering::Acquire))
            .field("last_goaway", &self.shared.last_goaway())
            .finish()
    }
}

impl Connection {
    pub fn new(transport: impl Transport + 'static, config: ConnectionConfig) -> Self {
        Self::with_transport(Arc::new(transport), config)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: ConnectionConfig) -> Self {
        let shared = Arc::new_cyclic(|me| Shared {
            me: me.clone(),
            transport,
            streams: RwLock::new(HashMap::new()),
            window: FlowControlWindow::new(0, DEFAULT_WINDOW_SIZE),
            recv_window: Mutex::new(ReceiveWindow::new(DEFAULT_WINDOW_SIZE)),
            priority: Mutex::new(PriorityTree::new()),
            codec: Mutex::new(HeaderCodec::new()),
            local_settings: RwLock::new(Settings::default()),
            remote_settings: RwLock::new(Settings::default()),
            next_stream_id: AtomicU32::new(FIRST_LOCAL_STREAM_ID),
            opening: Mutex::new(()),
            last_received_stream_id: AtomicU32::new(0),
            highest_promised_id: AtomicU32::new(0),
            last_goaway: Mutex::new(None),
            goaway_sent: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            handshake: Promise::new(),
            handshake_done: AtomicBool::new(false),
            pending_settings: Mutex::new(VecDeque::new()),
            pending_ping: Mutex::new(None),
            ping_counter: AtomicU64::new(1),
            history: Mutex::new(VecDeque::new()),
            reader: Mutex::new(ReaderState {
                decoder: FrameDecoder::new(),
                last: None,
            }),
            config,
        });
        Self { shared }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Write the connection preface and the initial SETTINGS frame. The
    /// first SETTINGS ACK from the peer confirms the handshake.
    pub fn start(&self) -> Result<()> {
        let settings = self.shared.config.preface_settings.clone();
        debug!(settings = settings.settings.len(), "sending connection preface");
        let preface = frame::connection_preface(&settings);
        let mut pending = self.shared.pending_settings.lock();
        self.shared
            .transport
            .write(&preface, self.shared.config.send_timeout)?;
        pending.push_back((settings, Arc::new(Promise::new())));
        Ok(())
    }

    /// Block until the peer acknowledged the preface SETTINGS.
    pub fn await_handshake(&self) -> Result<()> {
        if self.shared.handshake_done.load(Ordering::Acquire) {
            return Ok(());
        }
        match self.shared.handshake.wait_timeout(self.shared.config.handshake_timeout) {
            Some(Ok(())) => {
                self.shared.handshake_done.store(true, Ordering::Release);
                Ok(())
            }
            Some(Err(e)) => Err(Error::HandshakeFailed(e.to_string())),
            None if self.shared.handshake_done.load(Ordering::Acquire) => Ok(()),
            None => Err(Error::HandshakeTimeout),
        }
    }

    /// `start` followed by `await_handshake`. Needs a reader running.
    pub fn handshake(&self) -> Result<()> {
        self.start()?;
        self.await_handshake()
    }

    /// Feed inbound bytes. Complete frames are dispatched immediately;
    /// partial input is buffered until the rest arrives.
    pub fn process(&self, data: &[u8]) -> Result<()> {
        self.shared.process(data)
    }

    /// Read from `reader` until EOF or a connection error, dispatching every
    /// frame.
    pub fn run_reader<R: Read>(&self, mut reader: R) -> Result<()> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => {
                    debug!("peer closed the transport");
                    self.shared.shutdown();
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if !self.is_closed() {
                        warn!(error = %e, "transport read failed");
                    }
                    self.shared.shutdown();
                    return Err(Error::Io(e));
                }
            };
            self.process(&buf[..n])?;
        }
    }

    pub fn spawn_reader<R: Read + Send + 'static>(&self, reader: R) -> io::Result<JoinHandle<Result<()>>> {
        let connection = self.clone();
        thread::Builder::new()
            .name("h2-reader".into())
            .spawn(move || connection.run_reader(reader))
    }

    /// Send SETTINGS and wait for the peer's ACK. The values take effect on
    /// the local snapshot once acknowledged.
    pub fn settings(&self, settings: SettingsFrame) -> Result<()> {
        let promise = Arc::new(Promise::new());
        {
            // Held across the write so the queue follows wire order and a
            // frame that never left is never awaited.
            let mut pending = self.shared.pending_settings.lock();
            self.shared.send_frame(&Frame::Settings(settings.clone()))?;
            pending.push_back((settings, Arc::clone(&promise)));
        }
        match promise.wait_timeout(self.shared.config.settings_timeout) {
            Some(outcome) => outcome,
            None => Err(Error::SettingsTimeout {
                goaway: self.shared.last_goaway(),
            }),
        }
    }

    /// Acknowledge the peer's SETTINGS by hand (when automatic ACKs are off).
    pub fn ack_settings(&self) -> Result<()> {
        self.shared.send_frame(&Frame::Settings(SettingsFrame::ack()))
    }

    /// Round-trip a PING; returns the measured RTT.
    pub fn ping(&self) -> Result<Duration> {
        let data = self.shared.ping_counter.fetch_add(1, Ordering::Relaxed).to_be_bytes();
        let promise = Arc::new(Promise::new());
        *self.shared.pending_ping.lock() = Some((data, Arc::clone(&promise)));
        let sent_at = Instant::now();
        self.shared.send_frame(&Frame::Ping(PingFrame::new(data)))?;
        match promise.wait_timeout(self.shared.config.ping_timeout) {
            Some(outcome) => outcome.map(|_| sent_at.elapsed()),
            None => Err(Error::PingTimeout {
                goaway: self.shared.last_goaway(),
            }),
        }
    }

    /// Send GOAWAY once and close. Later calls are no-ops.
    pub fn go_away(&self, code: ErrorCode, debug_data: &str) -> Result<()> {
        self.shared.go_away(code, debug_data)
    }

    /// Graceful shutdown: GOAWAY(NO_ERROR) then close.
    pub fn close(&self) -> Result<()> {
        self.go_away(ErrorCode::NoError, "graceful shutdown")
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Open a new client stream (odd id, IDLE, child of the root). Fails
    /// with [`Error::StreamLimit`] while the peer's MAX_CONCURRENT_STREAMS
    /// is used up.
    pub fn new_stream(&self) -> Result<Arc<Stream>> {
        if self.is_closed() || self.shared.last_goaway().is_some() {
            return Err(self.shared.closed_error());
        }
        let _opening = self.shared.opening.lock();
        let active = self.shared.active_local_streams();
        let remote = self.shared.remote_settings.read();
        if !remote.allows_another_stream(active) {
            let limit = remote.max_concurrent_streams.unwrap_or(u32::MAX);
            debug!(active, limit, "concurrent stream limit reached");
            return Err(Error::StreamLimit { limit });
        }
        drop(remote);
        let id = self.shared.next_stream_id.fetch_add(2, Ordering::AcqRel);
        if id > MAX_STREAM_ID {
            return Err(Error::protocol(ErrorCode::ProtocolError, "stream identifiers exhausted"));
        }
        Ok(self.shared.create_stream(id, StreamState::Idle))
    }

    /// The stream carrying the response to an HTTP/1.1 upgrade request.
    pub fn upgrade_stream(&self) -> Arc<Stream> {
        self.shared.upgrade_stream()
    }

    /// Open a stream and send `request` on it. END_STREAM goes on the
    /// HEADERS frame when there is no body.
    pub fn request(&self, request: &Request) -> Result<Arc<Stream>> {
        let stream = self.new_stream()?;
        stream.headers(&request.headers, request.body.is_none())?;
        if let Some(body) = &request.body {
            stream.data(body.clone(), true)?;
        }
        Ok(stream)
    }

    /// Wait for the response on a pushed stream.
    pub fn pushed_response(&self, push: &PushRequest) -> Result<Response> {
        let stream = self.stream(push.key.promised_stream_id).ok_or_else(|| {
            Error::stream(
                push.key.promised_stream_id,
                ErrorCode::StreamClosed,
                "pushed stream no longer exists",
            )
        })?;
        stream.response()
    }

    pub fn stream(&self, id: u32) -> Option<Arc<Stream>> {
        self.shared.stream(id)
    }

    /// Every stream in the table, by id.
    pub fn streams(&self) -> Vec<Arc<Stream>> {
        let mut streams: Vec<_> = self.shared.streams.read().values().cloned().collect();
        streams.sort_by_key(|s| s.id());
        streams
    }

    /// IDLE streams with an id below `below` move to CLOSED.
    pub fn close_unused_idle_streams(&self, below: u32) {
        self.shared.close_unused_idle_streams(below);
    }

    /// Remove a terminal stream from the table and release its buffers.
    pub fn drain_stream(&self, id: u32) -> Option<Arc<Stream>> {
        self.shared.drain_stream(id)
    }

    /// Write an arbitrary frame.
    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.shared.send_frame(frame)
    }

    /// Received frames, oldest first.
    pub fn frame_history(&self) -> Vec<FrameRecord> {
        self.shared.history.lock().iter().cloned().collect()
    }

    pub fn last_goaway(&self) -> Option<GoAwayInfo> {
        self.shared.last_goaway()
    }

    pub fn local_settings(&self) -> Settings {
        self.shared.local_settings.read().clone()
    }

    pub fn remote_settings(&self) -> Settings {
        self.shared.remote_settings.read().clone()
    }

    pub fn last_received_stream_id(&self) -> u32 {
        self.shared.last_received_stream_id.load(Ordering::Acquire)
    }

    /// Connection-level send credit.
    pub fn available_window(&self) -> i64 {
        self.shared.window.available()
    }
}

impl Shared {
    pub(crate) fn stream(&self, id: u32) -> Option<Arc<Stream>> {
        self.streams.read().get(&id).cloned()
    }

    /// Client-initiated streams that still count against the peer's
    /// concurrency limit.
    fn active_local_streams(&self) -> usize {
        self.streams
            .read()
            .values()
            .filter(|s| s.id() % 2 == 1 && !s.state().is_terminal())
            .count()
    }

    fn create_stream(&self, id: u32, state: StreamState) -> Arc<Stream> {
        let stream = Arc::new(Stream::new(
            id,
            self.me.clone(),
            state,
            self.remote_settings.read().initial_window_size,
            self.local_settings.read().initial_window_size,
            self.config.frame_history_capacity,
        ));
        self.streams.write().insert(id, Arc::clone(&stream));
        self.priority.lock().insert(id);
        debug!(stream_id = id, %state, "stream created");
        stream
    }

    fn upgrade_stream(&self) -> Arc<Stream> {
        match self.stream(UPGRADE_STREAM_ID) {
            Some(stream) => stream,
            None => self.create_stream(UPGRADE_STREAM_ID, StreamState::HalfClosedLocal),
        }
    }

    pub(crate) fn last_goaway(&self) -> Option<GoAwayInfo> {
        self.last_goaway.lock().clone()
    }

    pub(crate) fn closed_error(&self) -> Error {
        Error::Closed {
            goaway: self.last_goaway(),
        }
    }

    pub(crate) fn send_frame(&self, frame: &Frame) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        trace!(frame_type = %frame.kind(), stream_id = frame.stream_id(), len = frame.payload_len(), ">> {frame}");
        self.transport
            .write(&frame.to_bytes(), self.config.send_timeout)
            .inspect_err(|e| warn!(frame_type = %frame.kind(), error = %e, "frame send failed"))
    }

    /// Encode and write a whole header block (HEADERS + CONTINUATION) in one
    /// write, holding the codec so blocks hit the wire in encoding order.
    pub(crate) fn send_header_block(
        &self,
        stream_id: u32,
        headers: &Headers,
        end_stream: bool,
        priority: Option<PriorityFields>,
    ) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        let max_frame = self.remote_settings.read().max_frame_size as usize;
        let room = max_frame - if priority.is_some() { frame::PRIORITY_PAYLOAD_LEN } else { 0 };
        let fragment = self.config.header_fragment_size.map_or(room, |size| size.min(room));

        let mut codec = self.codec.lock();
        let block = codec.encode(headers.as_slice());
        let frames = split_header_block(stream_id, block, end_stream, priority, fragment);
        let mut buf = BytesMut::new();
        for frame in &frames {
            trace!(frame_type = %frame.kind(), stream_id, len = frame.payload_len(), ">> {frame}");
            frame.encode(&mut buf);
        }
        let result = self.transport.write(&buf, self.config.send_timeout);
        drop(codec);
        result.inspect_err(|e| warn!(stream_id, error = %e, "header block send failed"))
    }

    pub(crate) fn decode_header_block(&self, block: &[u8]) -> Result<Vec<Header>> {
        self.codec.lock().decode(block)
    }

    pub(crate) fn check_header_list(&self, stream_id: u32, fields: &[Header]) -> Result<()> {
        if let Some(limit) = self.local_settings.read().max_header_list_size {
            let size = header_list_size(fields);
            if size > limit as usize {
                return Err(Error::stream(
                    stream_id,
                    ErrorCode::ProtocolError,
                    format!("header list of {size} bytes exceeds SETTINGS_MAX_HEADER_LIST_SIZE {limit}"),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn close_unused_idle_streams(&self, below: u32) {
        let idle: Vec<Arc<Stream>> = self
            .streams
            .read()
            .values()
            .filter(|s| s.id() < below && s.id() % 2 == below % 2)
            .cloned()
            .collect();
        for stream in idle {
            if stream.close_if_idle() {
                debug!(stream_id = stream.id(), below, "closed unused idle stream");
            }
        }
    }

    pub(crate) fn drain_stream(&self, id: u32) -> Option<Arc<Stream>> {
        let mut streams = self.streams.write();
        if !streams.get(&id)?.state().is_terminal() {
            return None;
        }
        let stream = streams.remove(&id)?;
        drop(streams);
        self.priority.lock().remove(id);
        stream.release();
        debug!(stream_id = id, "stream drained");
        Some(stream)
    }

    fn go_away(&self, code: ErrorCode, debug_data: &str) -> Result<()> {
        if self.goaway_sent.swap(true, Ordering::AcqRel) || self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let last = self.last_received_stream_id.load(Ordering::Acquire);
        debug!(last_stream_id = last, %code, debug_data, "sending GOAWAY");
        let result = self.send_frame(&Frame::GoAway(GoAwayFrame::new(last, code, debug_data.to_owned())));
        self.shutdown();
        result
    }

    /// Close the transport and release every blocked caller.
    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let goaway = self.last_goaway();
        self.transport.close();
        self.window.close();
        let streams: Vec<Arc<Stream>> = self.streams.read().values().cloned().collect();
        for stream in streams {
            stream.abort(goaway.clone());
        }
        self.handshake.fail(Error::Closed { goaway: goaway.clone() });
        for (_, promise) in self.pending_settings.lock().drain(..) {
            promise.fail(Error::Closed { goaway: goaway.clone() });
        }
        if let Some((_, promise)) = self.pending_ping.lock().take() {
            promise.fail(Error::Closed { goaway });
        }
        debug!("connection closed");
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    fn process(&self, data: &[u8]) -> Result<()> {
        let mut reader = self.reader.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        reader.decoder.push(data);
        loop {
            let frame = match reader.decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => return Err(self.connection_error(e)),
            };
            match self.dispatch(&mut reader, frame) {
                Ok(()) => {}
                Err(Error::Stream {
                    stream_id,
                    code,
                    message,
                }) => self.stream_error(stream_id, code, &message)?,
                Err(e) => return Err(self.connection_error(e)),
            }
            if self.closed.load(Ordering::Acquire) {
                return Ok(());
            }
        }
    }

    fn connection_error(&self, err: Error) -> Error {
        if self.closed.load(Ordering::Acquire) {
            return err;
        }
        warn!(code = %err.code(), error = %err, "connection error");
        let _ = self.go_away(err.code(), &err.to_string());
        err
    }

    fn stream_error(&self, stream_id: u32, code: ErrorCode, message: &str) -> Result<()> {
        warn!(stream_id, %code, message, "stream error");
        self.send_frame(&Frame::RstStream(frame::RstStreamFrame::new(stream_id, code)))?;
        if let Some(stream) = self.stream(stream_id) {
            stream.reset_locally(code);
        }
        Ok(())
    }

    fn remember(&self, record: &FrameRecord) {
        let capacity = self.config.frame_history_capacity;
        if capacity > 0 {
            let mut history = self.history.lock();
            if history.len() == capacity {
                history.pop_front();
            }
            history.push_back(record.clone());
        }
        let stream_id = record.frame.stream_id();
        if stream_id != 0 {
            if let Some(stream) = self.stream(stream_id) {
                stream.record(record.clone());
            }
        }
        if let Some(observer) = &self.config.frame_observer {
            observer(record);
        }
    }

    fn dispatch(&self, reader: &mut ReaderState, frame: Frame) -> Result<()> {
        trace!(frame_type = %frame.kind(), stream_id = frame.stream_id(), len = frame.payload_len(), "<< {frame}");
        self.remember(&FrameRecord::new(frame.clone()));
        self.validate(reader.last, &frame)?;

        let stream_id = frame.stream_id();
        reader.last = Some(LastFrame {
            kind: frame.kind(),
            stream_id,
            end_headers: frame.end_headers().unwrap_or(true),
        });
        if stream_id != 0 {
            self.last_received_stream_id.fetch_max(stream_id, Ordering::AcqRel);
        }

        match frame {
            Frame::Data(f) => self.on_data(f),
            Frame::Headers(f) => self.on_headers(f),
            Frame::Priority(f) => self.on_priority(f.stream_id, f.priority),
            Frame::RstStream(f) => self.on_rst_stream(f.stream_id, f.error_code),
            Frame::Settings(f) => self.on_settings(reader, f),
            Frame::PushPromise(f) => self.on_push_promise(f),
            Frame::Ping(f) => self.on_ping(f),
            Frame::GoAway(f) => {
                self.on_goaway(f);
                Ok(())
            }
            Frame::WindowUpdate(f) => self.on_window_update(f),
            Frame::Continuation(f) => {
                let stream = self.stream(f.stream_id).ok_or_else(|| {
                    Error::protocol(
                        ErrorCode::ProtocolError,
                        format!("CONTINUATION on unknown stream {}", f.stream_id),
                    )
                })?;
                if let Some(push) = stream.on_continuation(self, f)? {
                    self.on_push_request(push);
                }
                Ok(())
            }
        }
    }

    /// Connection-scoped checks that need no stream state.
    fn validate(&self, last: Option<LastFrame>, frame: &Frame) -> Result<()> {
        let kind = frame.kind();
        let stream_id = frame.stream_id();

        if kind == FrameKind::Continuation {
            match last {
                Some(prev) if prev.expects_continuation() && prev.stream_id == stream_id => {}
                Some(prev) if prev.expects_continuation() => {
                    return Err(Error::protocol(
                        ErrorCode::ProtocolError,
                        format!(
                            "CONTINUATION on stream {stream_id} follows {} on stream {}",
                            prev.kind, prev.stream_id
                        ),
                    ));
                }
                Some(prev) => {
                    return Err(Error::protocol(
                        ErrorCode::ProtocolError,
                        format!("CONTINUATION follows {} with END_HEADERS set or not continuable", prev.kind),
                    ));
                }
                None => {
                    return Err(Error::protocol(
                        ErrorCode::ProtocolError,
                        "CONTINUATION as the first frame",
                    ));
                }
            }
        } else if let Some(prev) = last.filter(LastFrame::expects_continuation) {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                format!(
                    "expected CONTINUATION on stream {}, got {kind} on stream {stream_id}",
                    prev.stream_id
                ),
            ));
        }

        if kind.is_connection_scoped() && stream_id != 0 {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                format!("{kind} frame on stream {stream_id}"),
            ));
        }
        if !kind.is_connection_scoped() && kind != FrameKind::WindowUpdate && stream_id == 0 {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                format!("{kind} frame on stream 0"),
            ));
        }
        if !frame.padding_fits() {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                format!(
                    "{kind} pad length {} too large for payload of {} bytes",
                    frame.pad_length().unwrap_or(0),
                    frame.payload_len()
                ),
            ));
        }

        let len = frame.payload_len();
        let exact = match kind {
            FrameKind::Priority => Some(frame::PRIORITY_PAYLOAD_LEN),
            FrameKind::RstStream => Some(frame::RST_STREAM_PAYLOAD_LEN),
            FrameKind::Ping => Some(frame::PING_PAYLOAD_LEN),
            FrameKind::WindowUpdate => Some(frame::WINDOW_UPDATE_PAYLOAD_LEN),
            _ => None,
        };
        if let Some(expected) = exact {
            if len != expected {
                return Err(Error::protocol(
                    ErrorCode::FrameSizeError,
                    format!("{kind} payload must be {expected} bytes, got {len}"),
                ));
            }
        }
        if let Frame::Settings(settings) = frame {
            if settings.ack && len != 0 {
                return Err(Error::protocol(ErrorCode::FrameSizeError, "SETTINGS ACK with a payload"));
            }
            if len % frame::SETTING_ENTRY_LEN != 0 {
                return Err(Error::protocol(
                    ErrorCode::FrameSizeError,
                    format!("SETTINGS payload length {len} is not a multiple of 6"),
                ));
            }
        }
        Ok(())
    }

    /// Whether `stream_id` was never used yet (still idle per RFC 7540 5.1.1).
    fn is_idle_id(&self, stream_id: u32) -> bool {
        if stream_id % 2 == 1 {
            stream_id >= self.next_stream_id.load(Ordering::Acquire)
        } else {
            stream_id > self.highest_promised_id.load(Ordering::Acquire)
        }
    }

    fn unknown_stream(&self, kind: FrameKind, stream_id: u32) -> Error {
        if self.is_idle_id(stream_id) {
            Error::protocol(
                ErrorCode::ProtocolError,
                format!("{kind} on idle stream {stream_id}"),
            )
        } else {
            Error::stream(stream_id, ErrorCode::StreamClosed, format!("{kind} on closed stream"))
        }
    }

    fn on_data(&self, frame: DataFrame) -> Result<()> {
        let len = frame.flow_controlled_len();
        let stream_id = frame.stream_id;
        let credit = {
            let mut window = self.recv_window.lock();
            if !window.receive(len) {
                return Err(Error::protocol(
                    ErrorCode::FlowControlError,
                    "peer overran the connection receive window",
                ));
            }
            if self.config.auto_window_update && len > 0 {
                window.release(len)
            } else {
                0
            }
        };
        if credit > 0 {
            self.send_frame(&Frame::WindowUpdate(WindowUpdateFrame::new(0, credit)))?;
        }

        let stream = self
            .stream(stream_id)
            .ok_or_else(|| self.unknown_stream(FrameKind::Data, stream_id))?;
        let credit = stream.on_data(self, frame)?;
        if credit > 0 {
            self.send_frame(&Frame::WindowUpdate(WindowUpdateFrame::new(stream_id, credit)))?;
        }
        Ok(())
    }

    fn on_headers(&self, frame: HeadersFrame) -> Result<()> {
        let stream_id = frame.stream_id;
        let stream = match self.stream(stream_id) {
            Some(stream) => stream,
            None if stream_id == UPGRADE_STREAM_ID => self.upgrade_stream(),
            None => return Err(self.unknown_stream(FrameKind::Headers, stream_id)),
        };
        if let Some(priority) = frame.priority {
            self.on_priority(stream_id, priority)?;
        }
        if let Some(push) = stream.on_headers(self, frame)? {
            self.on_push_request(push);
        }
        Ok(())
    }

    fn on_priority(&self, stream_id: u32, priority: PriorityFields) -> Result<()> {
        if priority.dependency == stream_id {
            return Err(Error::stream(
                stream_id,
                ErrorCode::ProtocolError,
                "stream cannot depend on itself",
            ));
        }
        self.reprioritize(stream_id, priority.dependency, priority.exclusive, priority.weight);
        Ok(())
    }

    /// Apply a dependency change to the tree. Streams outside the stream
    /// table are left alone, and a parent outside it falls back to the
    /// default priority.
    pub(crate) fn reprioritize(&self, stream_id: u32, dependency: u32, exclusive: bool, weight: u16) {
        let mut tree = self.priority.lock();
        if !tree.contains(stream_id) {
            debug!(stream_id, "priority for unknown stream ignored");
            return;
        }
        if dependency != ROOT && !tree.contains(dependency) {
            debug!(stream_id, dependency, "unknown dependency, using default priority");
            tree.reparent(stream_id, ROOT, false, DEFAULT_WEIGHT);
        } else {
            tree.reparent(stream_id, dependency, exclusive, weight);
        }
    }

    fn on_rst_stream(&self, stream_id: u32, code: ErrorCode) -> Result<()> {
        match self.stream(stream_id) {
            Some(stream) if stream.state() == StreamState::Idle => Err(Error::protocol(
                ErrorCode::ProtocolError,
                format!("RST_STREAM on idle stream {stream_id}"),
            )),
            Some(stream) => {
                debug!(stream_id, %code, "stream reset by peer");
                stream.on_reset(code);
                Ok(())
            }
            None if self.is_idle_id(stream_id) => Err(Error::protocol(
                ErrorCode::ProtocolError,
                format!("RST_STREAM on idle stream {stream_id}"),
            )),
            None => Ok(()),
        }
    }

    fn on_settings(&self, reader: &mut ReaderState, frame: SettingsFrame) -> Result<()> {
        if frame.ack {
            self.on_settings_ack(reader);
            return Ok(());
        }

        let change = self.remote_settings.write().apply(&frame)?;
        if let Some(initial) = change.initial_window_size {
            let streams: Vec<Arc<Stream>> = self.streams.read().values().cloned().collect();
            for stream in streams {
                if !stream.resize_send_window(initial) {
                    return Err(Error::protocol(
                        ErrorCode::FlowControlError,
                        format!("SETTINGS_INITIAL_WINDOW_SIZE {initial} overflows stream {}", stream.id()),
                    ));
                }
            }
        }
        if let Some(size) = change.header_table_size {
            self.codec.lock().rebuild_encoder(size);
        }
        if self.config.send_settings_ack_immediately {
            self.send_frame(&Frame::Settings(SettingsFrame::ack()))?;
        }
        Ok(())
    }

    fn on_settings_ack(&self, reader: &mut ReaderState) {
        let pending = self.pending_settings.lock().pop_front();
        match pending {
            Some((settings, promise)) => {
                match self.local_settings.write().apply(&settings) {
                    Ok(change) => {
                        if let Some(initial) = change.initial_window_size {
                            let streams: Vec<Arc<Stream>> = self.streams.read().values().cloned().collect();
                            for stream in streams {
                                stream.resize_receive_window(initial);
                            }
                        }
                        if let Some(size) = change.max_frame_size {
                            reader.decoder.set_max_frame_size(size);
                        }
                        promise.complete(());
                    }
                    Err(e) => {
                        promise.fail(e);
                    }
                }
            }
            None => warn!("unexpected SETTINGS ACK"),
        }
        if self.handshake.complete(()) {
            debug!("handshake confirmed");
        }
    }

    fn on_push_promise(&self, frame: PushPromiseFrame) -> Result<()> {
        let promised = frame.promised_stream_id;
        if !self.local_settings.read().enable_push {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                "PUSH_PROMISE received while push is disabled",
            ));
        }
        if promised == 0
            || promised % 2 != 0
            || promised <= self.highest_promised_id.load(Ordering::Acquire)
            || self.streams.read().contains_key(&promised)
        {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                format!("promised stream id {promised} is not fresh"),
            ));
        }
        let parent = self
            .stream(frame.stream_id)
            .ok_or_else(|| self.unknown_stream(FrameKind::PushPromise, frame.stream_id))?;

        self.close_unused_idle_streams(promised);
        self.highest_promised_id.store(promised, Ordering::Release);
        self.last_received_stream_id.fetch_max(promised, Ordering::AcqRel);
        self.create_stream(promised, StreamState::ReservedRemote);
        self.priority
            .lock()
            .reparent(promised, frame.stream_id, false, DEFAULT_WEIGHT);

        if let Some(push) = parent.on_push_promise(self, frame)? {
            self.on_push_request(push);
        }
        Ok(())
    }

    fn on_push_request(&self, push: PushRequest) {
        if let Some(child) = self.stream(push.key.promised_stream_id) {
            child.set_push_request(push.clone());
            if let Some(parent) = self.stream(push.key.stream_id) {
                parent.attach_pushed(push.key, child);
            }
        }
        if let Some(observer) = &self.config.push_observer {
            observer(&push);
        }
    }

    fn on_ping(&self, frame: PingFrame) -> Result<()> {
        if !frame.ack {
            return self.send_frame(&Frame::Ping(frame.to_ack()));
        }
        let mut pending = self.pending_ping.lock();
        match pending.take() {
            Some((data, promise)) if data == frame.data => {
                promise.complete(());
            }
            other => {
                debug!(data = ?frame.data, "PING ACK with unknown payload");
                *pending = other;
            }
        }
        Ok(())
    }

    fn on_goaway(&self, frame: GoAwayFrame) {
        let info = GoAwayInfo {
            last_stream_id: frame.last_stream_id,
            error_code: frame.error_code,
            debug_data: frame.debug_text(),
        };
        if info.error_code == ErrorCode::NoError {
            debug!(%info, "peer sent GOAWAY");
        } else {
            warn!(%info, "peer sent GOAWAY");
        }
        *self.last_goaway.lock() = Some(info.clone());

        // Streams above last_stream_id were never processed by the peer.
        let refused: Vec<Arc<Stream>> = self
            .streams
            .read()
            .values()
            .filter(|s| s.id() % 2 == 1 && s.id() > info.last_stream_id && !s.state().is_terminal())
            .cloned()
            .collect();
        for stream in refused {
            stream.abort(Some(info.clone()));
        }
    }

    fn on_window_update(&self, frame: WindowUpdateFrame) -> Result<()> {
        let stream_id = frame.stream_id;
        if frame.increment == 0 {
            return Err(if stream_id == 0 {
                Error::protocol(ErrorCode::ProtocolError, "WINDOW_UPDATE with increment 0 on the connection")
            } else {
                Error::stream(stream_id, ErrorCode::ProtocolError, "WINDOW_UPDATE with increment 0")
            });
        }
        if stream_id == 0 {
            if !self.window.increment(frame.increment) {
                return Err(Error::protocol(
                    ErrorCode::FlowControlError,
                    "WINDOW_UPDATE overflows the connection window",
                ));
            }
            return Ok(());
        }
        match self.stream(stream_id) {
            Some(stream) if stream.state() == StreamState::Idle => {
                Err(self.unknown_stream(FrameKind::WindowUpdate, stream_id))
            }
            Some(stream) => stream.on_window_update(frame.increment),
            None if self.is_idle_id(stream_id) => Err(self.unknown_stream(FrameKind::WindowUpdate, stream_id)),
            None => Ok(()),
        }
    }
}
