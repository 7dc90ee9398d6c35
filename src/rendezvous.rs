//! Local rendezvous surface between the server loop and application threads.
//!
//! This replaces the original implementation's `socketpair(2)` +
//! `eventfd(2)` pair (with an error code smuggled through the eventfd's
//! counter value) with two typed primitives: a `Mailbox<T>` the server uses
//! to hand newly admitted clients to `accept`, and an `mpsc`-backed pair
//! carrying inbound application bytes to each accepted client.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Why a blocked `pop_blocking` woke up with no item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxClosed {
    /// A single pending/next `accept` should fail once; normal delivery
    /// resumes immediately after.
    Cancelled,
    /// The mailbox was permanently closed; it will never deliver again.
    Closed,
}

struct MailboxState<T> {
    queue: VecDeque<T>,
    /// One-shot: consumed (cleared) by the first `pop_blocking` that observes it.
    cancelled: bool,
    /// Sticky: once set, `pop_blocking`/`available` never reports anything
    /// else again.
    closed: bool,
}

/// A single-producer, single-consumer queue distinguishing a one-shot
/// cancellation from a permanent close, used as the server's side of
/// `Gateway::accept`/`Gateway::available`.
pub struct Mailbox<T> {
    state: Mutex<MailboxState<T>>,
    signal: Condvar,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Mailbox {
            state: Mutex::new(MailboxState { queue: VecDeque::new(), cancelled: false, closed: false }),
            signal: Condvar::new(),
        }
    }

    /// Pushes an item and wakes one waiter. No-op once closed.
    pub fn push(&self, item: T) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return;
        }
        state.queue.push_back(item);
        self.signal.notify_one();
    }

    /// Blocks until an item is available, a cancellation is observed (once),
    /// or the mailbox is permanently closed.
    pub fn pop_blocking(&self) -> Result<T, MailboxClosed> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Ok(item);
            }
            // A permanent close always takes priority over a stale cancel flag.
            if state.closed {
                return Err(MailboxClosed::Closed);
            }
            if state.cancelled {
                state.cancelled = false;
                return Err(MailboxClosed::Cancelled);
            }
            state = self.signal.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// `true` if an item is ready within `timeout`.
    pub fn available(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.queue.is_empty() {
            return true;
        }
        if state.closed {
            return false;
        }
        let (guard, _) = self
            .signal
            .wait_timeout(state, timeout)
            .unwrap_or_else(|e| e.into_inner());
        state = guard;
        !state.queue.is_empty()
    }

    /// Wakes every waiter; exactly one pending/next `pop_blocking` observes
    /// `Cancelled` and the flag self-clears. Does not clear queued items and
    /// does not affect a permanent close.
    pub fn cancel_one(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cancelled = true;
        self.signal.notify_all();
    }

    /// Permanently closes the mailbox (used on `Gateway::close` and on
    /// channel-acquisition failure). Every current and future
    /// `pop_blocking` reports `Closed`.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closed = true;
        self.signal.notify_all();
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Mailbox::new()
    }
}

/// The application-facing half of an accepted client: receives inbound
/// application messages as they are reassembled by the server loop.
pub struct ClientEndpoint {
    inbox: mpsc::Receiver<Vec<u8>>,
}

impl ClientEndpoint {
    /// Blocks until the next inbound application message, or the session is
    /// evicted and the sender is dropped.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.inbox.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.inbox.try_recv().ok()
    }
}

/// The server-loop-facing half of an accepted client: delivers reassembled
/// application messages toward the application.
pub struct LoopEndpoint {
    outbox: mpsc::Sender<Vec<u8>>,
}

impl LoopEndpoint {
    /// Delivers a reassembled application message. Fails silently if the
    /// application has already dropped its `ClientEndpoint`.
    pub fn deliver(&self, message: Vec<u8>) {
        let _ = self.outbox.send(message);
    }
}

/// Builds a connected `(LoopEndpoint, ClientEndpoint)` pair for a freshly
/// admitted client.
pub fn endpoint_pair() -> (LoopEndpoint, ClientEndpoint) {
    let (tx, rx) = mpsc::channel();
    (LoopEndpoint { outbox: tx }, ClientEndpoint { inbox: rx })
}

/// Shared handle applications hold to signal server-loop-driven events back
/// to themselves; kept as a thin `Arc` wrapper so `Gateway` can clone it
/// across its own public methods without exposing the mailbox internals.
pub type SharedMailbox<T> = Arc<Mailbox<T>>;
