//! Credit-based flow-control window.
//!
//! One window exists per stream plus one for the whole connection. Senders
//! block in [`FlowControlWindow::reserve`] until enough credit is available;
//! the returned [`Reservation`] holds the window lock so the caller can look
//! at a second window before committing the decrement with
//! [`Reservation::consume`].

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Largest window size allowed by the protocol (2^31 - 1).
pub const MAX_WINDOW_SIZE: i64 = 0x7fff_ffff;

/// Initial window size for new streams and the connection (RFC 7540 6.9.2).
pub const DEFAULT_WINDOW_SIZE: u32 = 65_535;

#[derive(Debug)]
struct WindowState {
    initial: i64,
    available: i64,
    closed: bool,
}

#[derive(Debug)]
pub struct FlowControlWindow {
    /// 0 for the connection window.
    stream_id: u32,
    state: Mutex<WindowState>,
    credit: Condvar,
}

impl FlowControlWindow {
    pub fn new(stream_id: u32, initial: u32) -> Self {
        Self {
            stream_id,
            state: Mutex::new(WindowState {
                initial: i64::from(initial),
                available: i64::from(initial),
                closed: false,
            }),
            credit: Condvar::new(),
        }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Current credit. May be negative after a shrinking resize.
    pub fn available(&self) -> i64 {
        self.state.lock().available
    }

    pub fn initial_size(&self) -> i64 {
        self.state.lock().initial
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Block until at least `min` bytes of credit are available and return
    /// the locked reservation. No timeout; use [`Self::close`] to cancel.
    pub fn reserve(&self, min: u32) -> Result<Reservation<'_>> {
        let min = i64::from(min);
        let mut state = self.state.lock();
        while state.available < min && !state.closed {
            debug!(
                stream_id = self.stream_id,
                available = state.available,
                needed = min,
                "waiting for flow-control credit"
            );
            self.credit.wait(&mut state);
        }
        self.reservation(state)
    }

    /// Non-blocking variant: `Ok(None)` when fewer than `min` bytes are
    /// available right now.
    pub fn try_reserve(&self, min: u32) -> Result<Option<Reservation<'_>>> {
        let state = self.state.lock();
        if !state.closed && state.available < i64::from(min) {
            return Ok(None);
        }
        self.reservation(state).map(Some)
    }

    fn reservation<'a>(&'a self, state: MutexGuard<'a, WindowState>) -> Result<Reservation<'a>> {
        if state.closed {
            return Err(Error::FlowControlClosed {
                stream_id: self.stream_id,
            });
        }
        Ok(Reservation { window: self, state })
    }

    /// Add credit from a WINDOW_UPDATE. Returns false (and applies nothing)
    /// when the window would exceed 2^31 - 1; the caller treats that as a
    /// FLOW_CONTROL_ERROR.
    pub fn increment(&self, delta: u32) -> bool {
        let mut state = self.state.lock();
        let next = state.available + i64::from(delta);
        if next > MAX_WINDOW_SIZE {
            warn!(
                stream_id = self.stream_id,
                available = state.available,
                delta,
                "flow-control window overflow"
            );
            self.credit.notify_one();
            return false;
        }
        state.available = next;
        drop(state);
        self.credit.notify_one();
        true
    }

    /// Apply a new SETTINGS_INITIAL_WINDOW_SIZE, keeping what was already
    /// consumed: `available = new_initial - (initial - available)`.
    /// Returns false when the result would exceed 2^31 - 1.
    pub fn resize(&self, new_initial: u32) -> bool {
        let mut state = self.state.lock();
        let consumed = state.initial - state.available;
        let new_initial = i64::from(new_initial);
        let next = new_initial - consumed;
        if next > MAX_WINDOW_SIZE {
            warn!(stream_id = self.stream_id, new_initial, consumed, "window resize overflows");
            return false;
        }
        debug!(
            stream_id = self.stream_id,
            old_initial = state.initial,
            new_initial,
            available = next,
            "flow-control window resized"
        );
        state.initial = new_initial;
        state.available = next;
        drop(state);
        self.credit.notify_one();
        true
    }

    /// Cancel every waiter; further reservations fail with
    /// [`Error::FlowControlClosed`].
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            drop(state);
            self.credit.notify_all();
        }
    }
}

/// Locked view of a window between `reserve` and `consume`. Dropping it
/// without consuming releases the lock untouched.
#[derive(Debug)]
pub struct Reservation<'a> {
    window: &'a FlowControlWindow,
    state: MutexGuard<'a, WindowState>,
}

impl Reservation<'_> {
    pub fn available(&self) -> i64 {
        self.state.available
    }

    /// Deduct `size` bytes and release the lock.
    pub fn consume(mut self, size: u32) {
        debug_assert!(i64::from(size) <= self.state.available);
        self.state.available -= i64::from(size);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        // Pass leftover credit on to the next waiter.
        if self.state.available > 0 {
            self.window.credit.notify_one();
        }
    }
}

/// Inbound side of flow control: tracks how much the peer may still send
/// and how much has been consumed since the last WINDOW_UPDATE.
#[derive(Debug)]
pub struct ReceiveWindow {
    initial: i64,
    available: i64,
}

impl ReceiveWindow {
    pub fn new(initial: u32) -> Self {
        Self {
            initial: i64::from(initial),
            available: i64::from(initial),
        }
    }

    pub fn available(&self) -> i64 {
        self.available
    }

    /// Record `size` received bytes. Returns false if the peer overran the
    /// window.
    pub fn receive(&mut self, size: usize) -> bool {
        self.available -= size as i64;
        self.available >= 0
    }

    /// Give back `size` bytes of credit; returns the increment to announce.
    pub fn release(&mut self, size: usize) -> u32 {
        let size = (size as i64).min(MAX_WINDOW_SIZE - self.available).max(0);
        self.available += size;
        size as u32
    }

    pub fn resize(&mut self, new_initial: u32) {
        let consumed = self.initial - self.available;
        self.initial = i64::from(new_initial);
        self.available = self.initial - consumed;
    }
}
