//! Per-stream state machine (RFC 7540 Section 5.1).
//!
//! A [`Stream`] sequences outbound frames for one exchange, reassembles
//! inbound header blocks and body data, and resolves a one-shot response
//! signal when the peer ends its side. Inbound handlers run on the single
//! reader context, in arrival order; send operations may come from any
//! caller thread.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::body::BodyBuffer;
use crate::connection::Shared;
use crate::error::{Error, ErrorCode, GoAwayInfo, Result};
use crate::flow_control::{FlowControlWindow, ReceiveWindow};
use crate::frame::{
    ContinuationFrame, DataFrame, Frame, FrameRecord, HeadersFrame, PriorityFields, PriorityFrame,
    PushPromiseFrame, RstStreamFrame, WindowUpdateFrame,
};
use crate::message::{Headers, PushKey, PushRequest, Response};
use crate::signal::Promise;

/// Stream states (RFC 7540 Section 5.1), with the two reset flavours kept
/// apart so callers can tell who gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
    ResetLocal,
    ResetRemote,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::ResetLocal | Self::ResetRemote)
    }

    /// Whether this side may still send frames carrying data.
    pub fn can_send(self) -> bool {
        matches!(self, Self::Idle | Self::Open | Self::HalfClosedRemote)
    }

    /// Whether the peer may still send DATA.
    pub fn can_receive_data(self) -> bool {
        matches!(self, Self::Open | Self::HalfClosedLocal)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::ReservedLocal => "RESERVED_LOCAL",
            Self::ReservedRemote => "RESERVED_REMOTE",
            Self::Open => "OPEN",
            Self::HalfClosedLocal => "HALF_CLOSED_LOCAL",
            Self::HalfClosedRemote => "HALF_CLOSED_REMOTE",
            Self::Closed => "CLOSED",
            Self::ResetLocal => "RESET_LOCAL",
            Self::ResetRemote => "RESET_REMOTE",
        };
        f.write_str(name)
    }
}

/// Who reset a stream and with which code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetInfo {
    pub code: ErrorCode,
    pub by_peer: bool,
}

#[derive(Debug, Clone, Copy)]
enum PendingBlock {
    Headers { end_stream: bool },
    PushPromise { promised_stream_id: u32 },
}

struct StreamInner {
    state: StreamState,
    block: BytesMut,
    pending: Option<PendingBlock>,
    headers: Option<Headers>,
    trailers: Option<Headers>,
    body: Option<BodyBuffer>,
    reset: Option<ResetInfo>,
    promised: BTreeMap<PushKey, PushRequest>,
    pushed: BTreeMap<PushKey, Arc<Stream>>,
    push_request: Option<PushRequest>,
    recv_window: ReceiveWindow,
    frames: VecDeque<FrameRecord>,
    frames_capacity: usize,
    last_activity: Instant,
}

pub struct Stream {
    id: u32,
    shared: Weak<Shared>,
    inner: Mutex<StreamInner>,
    window: FlowControlWindow,
    response: Promise<Response>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("window", &self.window.available())
            .field("reset", &inner.reset)
            .finish()
    }
}

impl Stream {
    pub(crate) fn new(
        id: u32,
        shared: Weak<Shared>,
        state: StreamState,
        send_window: u32,
        recv_window: u32,
        frames_capacity: usize,
    ) -> Self {
        Self {
            id,
            shared,
            inner: Mutex::new(StreamInner {
                state,
                block: BytesMut::new(),
                pending: None,
                headers: None,
                trailers: None,
                body: None,
                reset: None,
                promised: BTreeMap::new(),
                pushed: BTreeMap::new(),
                push_request: None,
                recv_window: ReceiveWindow::new(recv_window),
                frames: VecDeque::new(),
                frames_capacity,
                last_activity: Instant::now(),
            }),
            window: FlowControlWindow::new(id, send_window),
            response: Promise::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    pub fn reset_info(&self) -> Option<ResetInfo> {
        self.inner.lock().reset
    }

    /// Current send credit on this stream.
    pub fn available_window(&self) -> i64 {
        self.window.available()
    }

    pub fn receive_window(&self) -> i64 {
        self.inner.lock().recv_window.available()
    }

    /// Frames received on this stream, oldest first.
    pub fn frames(&self) -> Vec<FrameRecord> {
        self.inner.lock().frames.iter().cloned().collect()
    }

    /// Pushes the peer promised on this stream so far.
    pub fn promised(&self) -> Vec<PushRequest> {
        self.inner.lock().promised.values().cloned().collect()
    }

    /// For a pushed stream, the request it answers.
    pub fn push_request(&self) -> Option<PushRequest> {
        self.inner.lock().push_request.clone()
    }

    pub fn parent(&self) -> Option<u32> {
        self.shared.upgrade()?.priority.lock().parent(self.id)
    }

    pub fn weight(&self) -> Option<u16> {
        self.shared.upgrade()?.priority.lock().weight(self.id)
    }

    fn shared(&self) -> Result<Arc<Shared>> {
        self.shared.upgrade().ok_or(Error::Closed { goaway: None })
    }

    fn transition(&self, inner: &mut StreamInner, next: StreamState) {
        if inner.state != next {
            debug!(stream_id = self.id, from = %inner.state, to = %next, "stream state");
            inner.state = next;
        }
    }

    fn closed_error(&self, inner: &StreamInner) -> Error {
        match inner.reset {
            Some(reset) => Error::StreamReset {
                stream_id: self.id,
                code: reset.code,
                by_peer: reset.by_peer,
            },
            None => Error::stream(
                self.id,
                ErrorCode::StreamClosed,
                format!("cannot send in state {}", inner.state),
            ),
        }
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Send a header block (HEADERS plus CONTINUATION as needed).
    pub fn headers(&self, headers: &Headers, end_stream: bool) -> Result<()> {
        self.send_headers(headers, end_stream, None)
    }

    /// Send a header block carrying an embedded priority.
    pub fn headers_with_priority(&self, headers: &Headers, end_stream: bool, priority: PriorityFields) -> Result<()> {
        self.send_headers(headers, end_stream, Some(priority))
    }

    fn send_headers(&self, headers: &Headers, end_stream: bool, priority: Option<PriorityFields>) -> Result<()> {
        let shared = self.shared()?;
        if let Some(p) = priority {
            self.check_dependency(p.dependency)?;
        }
        // The peer may answer before the write returns, so the stream has to
        // be OPEN by the time the block is on the wire.
        let opened = {
            let mut inner = self.inner.lock();
            if !inner.state.can_send() {
                return Err(self.closed_error(&inner));
            }
            let idle = inner.state == StreamState::Idle;
            if idle {
                self.transition(&mut inner, StreamState::Open);
            }
            idle
        };
        if let Some(p) = priority {
            shared.reprioritize(self.id, p.dependency, p.exclusive, p.weight);
        }
        shared.close_unused_idle_streams(self.id);
        if let Err(e) = shared.send_header_block(self.id, headers, end_stream, priority) {
            let mut inner = self.inner.lock();
            if opened && inner.state == StreamState::Open && inner.headers.is_none() && inner.block.is_empty() {
                self.transition(&mut inner, StreamState::Idle);
            }
            return Err(e);
        }

        let mut inner = self.inner.lock();
        if end_stream {
            self.local_end_stream(&mut inner);
        }
        Ok(())
    }

    /// Send `data`, split into DATA frames no larger than the peer's
    /// MAX_FRAME_SIZE and the credit available on both this stream's and the
    /// connection's window. Blocks while either window is empty. Only the
    /// last frame carries END_STREAM.
    pub fn data(&self, data: impl Into<Bytes>, end_stream: bool) -> Result<()> {
        let shared = self.shared()?;
        let mut remaining: Bytes = data.into();
        {
            let inner = self.inner.lock();
            if !inner.state.can_send() || inner.state == StreamState::Idle {
                return Err(self.closed_error(&inner));
            }
        }

        if remaining.is_empty() {
            shared.send_frame(&Frame::Data(DataFrame::new(self.id, Bytes::new(), end_stream)))?;
        }

        while !remaining.is_empty() {
            let max_frame = shared.remote_settings.read().max_frame_size as usize;
            let stream_credit = self.window.reserve(1).map_err(|e| self.cancelled(e))?;
            let conn_credit = match shared.window.try_reserve(1).map_err(|_| shared.closed_error())? {
                Some(credit) => credit,
                None => {
                    // Never wait on the connection while holding the stream.
                    drop(stream_credit);
                    debug!(stream_id = self.id, "waiting for connection-level credit");
                    drop(shared.window.reserve(1).map_err(|_| shared.closed_error())?);
                    continue;
                }
            };

            let chunk = (stream_credit.available() as usize)
                .min(conn_credit.available() as usize)
                .min(max_frame)
                .min(remaining.len());
            stream_credit.consume(chunk as u32);
            conn_credit.consume(chunk as u32);

            let piece = remaining.split_to(chunk);
            let last = remaining.is_empty();
            trace!(stream_id = self.id, len = chunk, last, "DATA chunk");
            shared.send_frame(&Frame::Data(DataFrame::new(self.id, piece, end_stream && last)))?;
        }

        if end_stream {
            let mut inner = self.inner.lock();
            self.local_end_stream(&mut inner);
        }
        Ok(())
    }

    fn cancelled(&self, err: Error) -> Error {
        match err {
            Error::FlowControlClosed { .. } => {
                let inner = self.inner.lock();
                match inner.reset {
                    Some(_) => self.closed_error(&inner),
                    None => err,
                }
            }
            other => other,
        }
    }

    /// Send PRIORITY and apply it to the local tree. A weight of 0 keeps the
    /// current weight.
    pub fn priority(&self, dependency: u32, exclusive: bool, weight: u16) -> Result<()> {
        self.check_dependency(dependency)?;
        let shared = self.shared()?;
        let fields = PriorityFields::new(dependency, exclusive, weight.max(1));
        shared.send_frame(&Frame::Priority(PriorityFrame::new(self.id, fields)))?;
        shared.reprioritize(self.id, dependency, exclusive, weight);
        Ok(())
    }

    fn check_dependency(&self, dependency: u32) -> Result<()> {
        if dependency == self.id {
            return Err(Error::stream(
                self.id,
                ErrorCode::ProtocolError,
                "stream cannot depend on itself",
            ));
        }
        Ok(())
    }

    /// Send RST_STREAM and move to RESET_LOCAL. No-op on a stream that is
    /// already terminal.
    pub fn reset(&self, code: ErrorCode) -> Result<()> {
        let shared = self.shared()?;
        {
            let inner = self.inner.lock();
            if inner.state.is_terminal() {
                return Ok(());
            }
            if inner.state == StreamState::Idle {
                return Err(Error::stream(self.id, ErrorCode::ProtocolError, "cannot reset an idle stream"));
            }
        }
        shared.send_frame(&Frame::RstStream(RstStreamFrame::new(self.id, code)))?;
        self.reset_locally(code);
        Ok(())
    }

    /// Grant the peer `increment` more bytes on this stream.
    pub fn window_update(&self, increment: u32) -> Result<()> {
        let shared = self.shared()?;
        shared.send_frame(&Frame::WindowUpdate(WindowUpdateFrame::new(self.id, increment)))?;
        self.inner.lock().recv_window.release(increment as usize);
        Ok(())
    }

    /// Block until the response is complete, failing after
    /// `response_idle_timeout` without any frame on this stream.
    pub fn response(&self) -> Result<Response> {
        let idle = self.shared()?.config.response_idle_timeout;
        self.response_timeout(idle)
    }

    /// Like [`Self::response`] with an explicit idle timeout.
    pub fn response_timeout(&self, idle: Duration) -> Result<Response> {
        if self.response.is_taken() {
            return Err(Error::stream(self.id, ErrorCode::StreamClosed, "response already taken"));
        }
        loop {
            let last_activity = self.inner.lock().last_activity;
            let deadline = last_activity + idle;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let goaway = self.shared.upgrade().and_then(|s| s.last_goaway());
                warn!(stream_id = self.id, ?idle, "response idle timeout");
                return Err(Error::ResponseIdleTimeout {
                    stream_id: self.id,
                    idle,
                    goaway,
                });
            }
            if let Some(outcome) = self.response.wait_timeout(remaining) {
                if outcome.is_ok() {
                    if let Some(shared) = self.shared.upgrade() {
                        if shared.config.drain_streams_on_close && self.state().is_terminal() {
                            shared.drain_stream(self.id);
                        }
                    }
                }
                return outcome;
            }
        }
    }

    fn local_end_stream(&self, inner: &mut StreamInner) {
        match inner.state {
            StreamState::Open => self.transition(inner, StreamState::HalfClosedLocal),
            StreamState::HalfClosedRemote => {
                self.transition(inner, StreamState::Closed);
                self.window.close();
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Inbound (reader context only)
    // ------------------------------------------------------------------

    pub(crate) fn record(&self, record: FrameRecord) {
        let mut inner = self.inner.lock();
        if inner.frames_capacity == 0 {
            return;
        }
        if inner.frames.len() == inner.frames_capacity {
            inner.frames.pop_front();
        }
        inner.frames.push_back(record);
    }

    pub(crate) fn on_headers(&self, shared: &Shared, frame: HeadersFrame) -> Result<Option<PushRequest>> {
        let mut inner = self.inner.lock();
        inner.last_activity = Instant::now();
        match inner.state {
            StreamState::ReservedRemote => self.transition(&mut inner, StreamState::HalfClosedLocal),
            // Blocks arriving after a local reset are still decoded to keep
            // the HPACK table in step; finish_block drops the result.
            StreamState::Open | StreamState::HalfClosedLocal | StreamState::ResetLocal => {}
            StreamState::Idle | StreamState::ReservedLocal => {
                return Err(Error::protocol(
                    ErrorCode::ProtocolError,
                    format!("HEADERS on stream {} in state {}", self.id, inner.state),
                ));
            }
            state => {
                return Err(Error::stream(
                    self.id,
                    ErrorCode::StreamClosed,
                    format!("HEADERS in state {state}"),
                ));
            }
        }
        inner.pending = Some(PendingBlock::Headers {
            end_stream: frame.end_stream,
        });
        inner.block.clear();
        self.append_fragment(shared, &mut inner, &frame.fragment)?;
        if frame.end_headers {
            return self.finish_block(shared, &mut inner);
        }
        Ok(None)
    }

    pub(crate) fn on_push_promise(&self, shared: &Shared, frame: PushPromiseFrame) -> Result<Option<PushRequest>> {
        let mut inner = self.inner.lock();
        inner.last_activity = Instant::now();
        if !matches!(inner.state, StreamState::Open | StreamState::HalfClosedLocal) {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                format!("PUSH_PROMISE on stream {} in state {}", self.id, inner.state),
            ));
        }
        inner.pending = Some(PendingBlock::PushPromise {
            promised_stream_id: frame.promised_stream_id,
        });
        inner.block.clear();
        self.append_fragment(shared, &mut inner, &frame.fragment)?;
        if frame.end_headers {
            return self.finish_block(shared, &mut inner);
        }
        Ok(None)
    }

    pub(crate) fn on_continuation(&self, shared: &Shared, frame: ContinuationFrame) -> Result<Option<PushRequest>> {
        let mut inner = self.inner.lock();
        inner.last_activity = Instant::now();
        if inner.pending.is_none() {
            if inner.state == StreamState::ResetLocal {
                return Ok(None);
            }
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                format!("CONTINUATION on stream {} without an open header block", self.id),
            ));
        }
        self.append_fragment(shared, &mut inner, &frame.fragment)?;
        if frame.end_headers {
            return self.finish_block(shared, &mut inner);
        }
        Ok(None)
    }

    fn append_fragment(&self, shared: &Shared, inner: &mut StreamInner, fragment: &[u8]) -> Result<()> {
        let limit = shared.config.max_header_block_size;
        if inner.block.len() + fragment.len() > limit {
            inner.block.clear();
            inner.pending = None;
            return Err(Error::stream(
                self.id,
                ErrorCode::EnhanceYourCalm,
                format!("header block exceeds {limit} bytes"),
            ));
        }
        inner.block.extend_from_slice(fragment);
        Ok(())
    }

    fn finish_block(&self, shared: &Shared, inner: &mut StreamInner) -> Result<Option<PushRequest>> {
        let block = inner.block.split().freeze();
        let Some(pending) = inner.pending.take() else {
            return Ok(None);
        };
        // Decode even when the result is discarded: the dynamic table must
        // stay in step with the peer's encoder.
        let fields = shared.decode_header_block(&block)?;
        if inner.state == StreamState::ResetLocal {
            return Ok(None);
        }
        shared.check_header_list(self.id, &fields)?;
        let headers = Headers::from(fields);

        match pending {
            PendingBlock::Headers { end_stream } => {
                if inner.headers.is_none() {
                    let informational = headers
                        .first(crate::message::pseudo::STATUS)
                        .is_some_and(|s| s.starts_with('1'));
                    if informational && !end_stream {
                        debug!(stream_id = self.id, "ignoring informational response");
                        return Ok(None);
                    }
                    trace!(stream_id = self.id, headers = headers.len(), "response headers");
                    inner.headers = Some(headers);
                } else {
                    if !end_stream {
                        return Err(Error::stream(
                            self.id,
                            ErrorCode::ProtocolError,
                            "trailers without END_STREAM",
                        ));
                    }
                    trace!(stream_id = self.id, "trailers");
                    inner.trailers = Some(headers);
                }
                if end_stream {
                    self.remote_end_stream(inner)?;
                }
                Ok(None)
            }
            PendingBlock::PushPromise { promised_stream_id } => {
                let key = PushKey {
                    stream_id: self.id,
                    promised_stream_id,
                };
                let request = PushRequest { key, headers };
                inner.promised.insert(key, request.clone());
                debug!(stream_id = self.id, promised_stream_id, "push promised");
                Ok(Some(request))
            }
        }
    }

    /// Returns the number of bytes to hand back to the peer with a
    /// WINDOW_UPDATE on this stream.
    pub(crate) fn on_data(&self, shared: &Shared, frame: DataFrame) -> Result<u32> {
        let mut inner = self.inner.lock();
        inner.last_activity = Instant::now();
        let len = frame.flow_controlled_len();

        if inner.state == StreamState::ResetLocal {
            return Ok(0);
        }
        if !inner.state.can_receive_data() {
            return Err(Error::stream(
                self.id,
                ErrorCode::StreamClosed,
                format!("DATA in state {}", inner.state),
            ));
        }
        if inner.headers.is_none() {
            return Err(Error::stream(self.id, ErrorCode::ProtocolError, "DATA before response headers"));
        }
        if !inner.recv_window.receive(len) {
            return Err(Error::stream(
                self.id,
                ErrorCode::FlowControlError,
                "peer overran the stream receive window",
            ));
        }

        if inner.body.is_none() {
            inner.body = Some(BodyBuffer::new(
                shared.config.body_spill_threshold,
                shared.config.spill_factory.clone(),
            ));
        }
        if let Some(body) = inner.body.as_mut() {
            body.append(&frame.data)
                .map_err(|e| Error::stream(self.id, ErrorCode::InternalError, format!("body spill failed: {e}")))?;
        }

        let mut credit = 0;
        if frame.end_stream {
            self.remote_end_stream(&mut inner)?;
        } else if shared.config.auto_window_update && len > 0 {
            credit = inner.recv_window.release(len);
        }
        Ok(credit)
    }

    fn remote_end_stream(&self, inner: &mut StreamInner) -> Result<()> {
        match inner.state {
            StreamState::Open => self.transition(inner, StreamState::HalfClosedRemote),
            StreamState::HalfClosedLocal => {
                self.transition(inner, StreamState::Closed);
                self.window.close();
            }
            _ => {}
        }

        let headers = inner
            .headers
            .take()
            .ok_or_else(|| Error::stream(self.id, ErrorCode::ProtocolError, "stream ended without response headers"))?;
        let body = match inner.body.take() {
            Some(buffer) => buffer
                .finish()
                .map_err(|e| Error::stream(self.id, ErrorCode::InternalError, format!("body unavailable: {e}")))?,
            None => Default::default(),
        };
        let response = Response {
            stream_id: self.id,
            headers,
            body,
            trailers: inner.trailers.take(),
            promises: inner.promised.values().cloned().collect(),
            pushed_streams: std::mem::take(&mut inner.pushed),
        };
        debug!(stream_id = self.id, status = ?response.status(), body = response.body.len(), "response complete");
        self.response.complete(response);
        Ok(())
    }

    pub(crate) fn on_reset(&self, code: ErrorCode) {
        let mut inner = self.inner.lock();
        inner.last_activity = Instant::now();
        if inner.state.is_terminal() {
            return;
        }
        inner.reset = Some(ResetInfo { code, by_peer: true });
        inner.pending = None;
        self.transition(&mut inner, StreamState::ResetRemote);
        drop(inner);
        self.window.close();
        self.response.fail(Error::StreamReset {
            stream_id: self.id,
            code,
            by_peer: true,
        });
    }

    /// Move to RESET_LOCAL after an RST_STREAM was sent.
    pub(crate) fn reset_locally(&self, code: ErrorCode) {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return;
        }
        inner.reset = Some(ResetInfo { code, by_peer: false });
        self.transition(&mut inner, StreamState::ResetLocal);
        drop(inner);
        self.window.close();
        self.response.fail(Error::StreamReset {
            stream_id: self.id,
            code,
            by_peer: false,
        });
    }

    pub(crate) fn on_window_update(&self, increment: u32) -> Result<()> {
        if !self.window.increment(increment) {
            return Err(Error::stream(
                self.id,
                ErrorCode::FlowControlError,
                "WINDOW_UPDATE overflows the stream window",
            ));
        }
        Ok(())
    }

    pub(crate) fn resize_send_window(&self, initial: u32) -> bool {
        self.window.resize(initial)
    }

    pub(crate) fn resize_receive_window(&self, initial: u32) {
        self.inner.lock().recv_window.resize(initial);
    }

    pub(crate) fn set_push_request(&self, request: PushRequest) {
        self.inner.lock().push_request = Some(request);
    }

    /// Keep the stream the peer reserved for one of this stream's promises,
    /// so the response can hand it out.
    pub(crate) fn attach_pushed(&self, key: PushKey, child: Arc<Stream>) {
        self.inner.lock().pushed.insert(key, child);
    }

    /// The response if it is already complete, without waiting.
    pub fn try_response(&self) -> Option<Result<Response>> {
        self.response.wait_timeout(Duration::ZERO)
    }

    /// IDLE -> CLOSED for a stream that was skipped over.
    pub(crate) fn close_if_idle(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Idle {
            return false;
        }
        self.transition(&mut inner, StreamState::Closed);
        drop(inner);
        self.window.close();
        self.response.fail(Error::stream(self.id, ErrorCode::StreamClosed, "idle stream closed"));
        true
    }

    /// The connection is gone: release every waiter on this stream.
    pub(crate) fn abort(&self, goaway: Option<GoAwayInfo>) {
        self.window.close();
        self.response.fail(Error::Closed { goaway });
    }

    /// Drop buffered state once the stream is drained from the table.
    pub(crate) fn release(&self) {
        let mut inner = self.inner.lock();
        inner.block = BytesMut::new();
        inner.body = None;
        inner.frames.clear();
    }
}
