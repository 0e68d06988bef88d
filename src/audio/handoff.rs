//! Single-slot chunk handoff between the capture and decode threads.
//!
//! The producer always wins: publishing replaces any chunk the consumer has
//! not yet taken. A stateful streaming recognizer only wants the freshest
//! audio, so under load older chunks are discarded instead of queued, which
//! keeps both memory and latency bounded.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// One-slot mailbox connecting a producer and a consumer thread.
///
/// `publish` never blocks. The consumer parks on a condvar in
/// [`take_timeout`] until a value arrives or the timeout lapses, so there is
/// no spinning on an empty slot.
pub struct Handoff<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Handoff<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Replace the slot contents with `value`.
    ///
    /// Returns true when an unconsumed value was overwritten so the caller
    /// can count drops.
    pub fn publish(&self, value: T) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let overwrote = slot.replace(value).is_some();
        drop(slot);
        self.ready.notify_one();
        overwrote
    }

    /// Take the pending value without waiting.
    pub fn take(&self) -> Option<T> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Block until a value is published or `timeout` lapses.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = self
            .ready
            .wait_timeout_while(slot, timeout, |slot| slot.is_none());
        let (mut slot, _timed_out) = match result {
            Ok(pair) => pair,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.take()
    }
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}
