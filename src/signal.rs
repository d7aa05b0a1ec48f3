//! One-shot completion signal shared between the reader thread (which
//! resolves it) and a caller thread (which blocks on it).

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::Result;

#[derive(Debug)]
enum Slot<T> {
    Pending,
    Ready(Result<T>),
    Taken,
}

#[derive(Debug)]
pub struct Promise<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending),
            ready: Condvar::new(),
        }
    }

    /// Resolve with a value. Returns false if already resolved.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Resolve with an error. Returns false if already resolved.
    pub fn fail(&self, err: crate::error::Error) -> bool {
        self.settle(Err(err))
    }

    fn settle(&self, outcome: Result<T>) -> bool {
        let mut slot = self.slot.lock();
        if !matches!(*slot, Slot::Pending) {
            return false;
        }
        *slot = Slot::Ready(outcome);
        drop(slot);
        self.ready.notify_all();
        true
    }

    /// True once a waiter has taken the outcome.
    pub fn is_taken(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Taken)
    }

    /// Block until resolved or `timeout` elapses. `None` on timeout, or when
    /// another waiter already took the outcome.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while matches!(*slot, Slot::Pending) {
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(outcome) => Some(outcome),
            Slot::Pending => {
                *slot = Slot::Pending;
                None
            }
            Slot::Taken => None,
        }
    }
}
