//! Connection configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::body::{temp_file_sink, SpillFactory};
use crate::frame::{FrameRecord, SettingsFrame};
use crate::message::PushRequest;

/// Maximum accumulated header block size (256KB) before the stream is
/// reset. Guards against CONTINUATION floods.
pub const MAX_HEADER_BLOCK_SIZE: usize = 256 * 1024;

/// Called for every received frame.
pub type FrameObserver = Arc<dyn Fn(&FrameRecord) + Send + Sync>;

/// Called for every decoded PUSH_PROMISE.
pub type PushObserver = Arc<dyn Fn(&PushRequest) + Send + Sync>;

#[derive(Clone)]
pub struct ConnectionConfig {
    /// SETTINGS sent right after the preface magic; applied to the local
    /// snapshot once the peer acknowledges them.
    pub preface_settings: SettingsFrame,
    /// Acknowledge inbound SETTINGS as soon as they are applied.
    pub send_settings_ack_immediately: bool,
    /// Replenish receive windows with WINDOW_UPDATE after every DATA frame.
    pub auto_window_update: bool,
    /// Remove streams from the table once their response was handed out.
    pub drain_streams_on_close: bool,
    pub frame_history_capacity: usize,
    pub frame_observer: Option<FrameObserver>,
    pub push_observer: Option<PushObserver>,
    pub send_timeout: Duration,
    pub settings_timeout: Duration,
    pub ping_timeout: Duration,
    pub handshake_timeout: Duration,
    /// Idle deadline for a response; reset by every frame on the stream.
    pub response_idle_timeout: Duration,
    pub body_spill_threshold: usize,
    pub spill_factory: SpillFactory,
    pub max_header_block_size: usize,
    /// Largest header block fragment per HEADERS/CONTINUATION frame.
    /// `None` follows the peer's SETTINGS_MAX_FRAME_SIZE.
    pub header_fragment_size: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            preface_settings: SettingsFrame::empty(),
            send_settings_ack_immediately: true,
            auto_window_update: true,
            drain_streams_on_close: false,
            frame_history_capacity: 1024,
            frame_observer: None,
            push_observer: None,
            send_timeout: Duration::from_secs(1),
            settings_timeout: Duration::from_secs(2),
            ping_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(5),
            response_idle_timeout: Duration::from_secs(30),
            body_spill_threshold: 1024 * 1024,
            spill_factory: temp_file_sink(),
            max_header_block_size: MAX_HEADER_BLOCK_SIZE,
            header_fragment_size: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("preface_settings", &self.preface_settings)
            .field("send_settings_ack_immediately", &self.send_settings_ack_immediately)
            .field("auto_window_update", &self.auto_window_update)
            .field("drain_streams_on_close", &self.drain_streams_on_close)
            .field("frame_history_capacity", &self.frame_history_capacity)
            .field("send_timeout", &self.send_timeout)
            .field("settings_timeout", &self.settings_timeout)
            .field("ping_timeout", &self.ping_timeout)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("response_idle_timeout", &self.response_idle_timeout)
            .field("body_spill_threshold", &self.body_spill_threshold)
            .field("max_header_block_size", &self.max_header_block_size)
            .field("header_fragment_size", &self.header_fragment_size)
            .finish_non_exhaustive()
    }
}

impl ConnectionConfig {
    pub fn with_preface_settings(mut self, settings: SettingsFrame) -> Self {
        self.preface_settings = settings;
        self
    }

    pub fn with_settings_ack(mut self, immediately: bool) -> Self {
        self.send_settings_ack_immediately = immediately;
        self
    }

    pub fn with_auto_window_update(mut self, enabled: bool) -> Self {
        self.auto_window_update = enabled;
        self
    }

    pub fn with_drain_on_close(mut self, enabled: bool) -> Self {
        self.drain_streams_on_close = enabled;
        self
    }

    pub fn with_frame_history(mut self, capacity: usize) -> Self {
        self.frame_history_capacity = capacity;
        self
    }

    pub fn with_frame_observer(mut self, observer: impl Fn(&FrameRecord) + Send + Sync + 'static) -> Self {
        self.frame_observer = Some(Arc::new(observer));
        self
    }

    pub fn with_push_observer(mut self, observer: impl Fn(&PushRequest) + Send + Sync + 'static) -> Self {
        self.push_observer = Some(Arc::new(observer));
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_settings_timeout(mut self, timeout: Duration) -> Self {
        self.settings_timeout = timeout;
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_response_idle_timeout(mut self, timeout: Duration) -> Self {
        self.response_idle_timeout = timeout;
        self
    }

    pub fn with_body_spill(mut self, threshold: usize, factory: SpillFactory) -> Self {
        self.body_spill_threshold = threshold;
        self.spill_factory = factory;
        self
    }

    pub fn with_max_header_block_size(mut self, size: usize) -> Self {
        self.max_header_block_size = size;
        self
    }

    pub fn with_header_fragment_size(mut self, size: usize) -> Self {
        self.header_fragment_size = Some(size.max(1));
        self
    }
}
