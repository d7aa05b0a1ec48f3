//! SETTINGS parameters (RFC 7540 Section 6.5.2) and the negotiated snapshot
//! kept for each direction of a connection.

use crate::error::{Error, ErrorCode, Result};
use crate::flow_control::DEFAULT_WINDOW_SIZE;
use crate::frame::SettingsFrame;

/// HTTP/2 settings identifiers
pub mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const MAX_MAX_FRAME_SIZE: u32 = 16_777_215;

/// Settings in effect for one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub header_table_size: u32,
    pub enable_push: bool,
    /// `None` means unlimited.
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    /// `None` means unlimited.
    pub max_header_list_size: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            enable_push: true,
            max_concurrent_streams: None,
            initial_window_size: DEFAULT_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: None,
        }
    }
}

/// What changed when a SETTINGS frame was applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub initial_window_size: Option<u32>,
    pub header_table_size: Option<u32>,
    pub max_frame_size: Option<u32>,
}

impl Settings {
    /// Validate every entry of `frame` and merge it into `self`. Nothing is
    /// applied if any entry is invalid. Unknown identifiers are ignored.
    pub fn apply(&mut self, frame: &SettingsFrame) -> Result<SettingsChange> {
        let mut next = self.clone();
        let mut change = SettingsChange::default();

        for (&id, &value) in &frame.settings {
            match id {
                settings_id::HEADER_TABLE_SIZE => {
                    if value != next.header_table_size {
                        change.header_table_size = Some(value);
                    }
                    next.header_table_size = value;
                }
                settings_id::ENABLE_PUSH => {
                    if value > 1 {
                        return Err(Error::protocol(
                            ErrorCode::ProtocolError,
                            format!("SETTINGS_ENABLE_PUSH must be 0 or 1, got {value}"),
                        ));
                    }
                    next.enable_push = value == 1;
                }
                settings_id::MAX_CONCURRENT_STREAMS => next.max_concurrent_streams = Some(value),
                settings_id::INITIAL_WINDOW_SIZE => {
                    if value > 0x7fff_ffff {
                        return Err(Error::protocol(
                            ErrorCode::FlowControlError,
                            format!("SETTINGS_INITIAL_WINDOW_SIZE {value} exceeds 2^31-1"),
                        ));
                    }
                    if value != next.initial_window_size {
                        change.initial_window_size = Some(value);
                    }
                    next.initial_window_size = value;
                }
                settings_id::MAX_FRAME_SIZE => {
                    if !(DEFAULT_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&value) {
                        return Err(Error::protocol(
                            ErrorCode::ProtocolError,
                            format!("SETTINGS_MAX_FRAME_SIZE {value} out of range"),
                        ));
                    }
                    if value != next.max_frame_size {
                        change.max_frame_size = Some(value);
                    }
                    next.max_frame_size = value;
                }
                settings_id::MAX_HEADER_LIST_SIZE => next.max_header_list_size = Some(value),
                _ => {}
            }
        }

        *self = next;
        Ok(change)
    }

    /// Whether MAX_CONCURRENT_STREAMS leaves room for one more stream when
    /// `active` are already open.
    pub fn allows_another_stream(&self, active: usize) -> bool {
        self.max_concurrent_streams
            .map_or(true, |max| active < max as usize)
    }
}
