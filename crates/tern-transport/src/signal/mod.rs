//! Signalable wait primitive.
//!
//! `Signal` is an auto-reset event: `set()` wakes one waiter (or the next
//! one to arrive), and a successful `wait` consumes the signal. A signal
//! delivered before anybody waits is kept, so there is no missed wakeup
//! between a setter on one thread and a waiter on another.
//!
//! Two backends implement the same four operations and are selected at
//! build time:
//! - `condvar` (default): `Mutex` + `Condvar` + flag
//! - `channel` (`channel-signal` feature): a one-slot crossbeam channel
//!
//! Once closed, a signal ignores `set()` and every wait returns
//! [`WaitOutcome::Closed`] immediately.

use std::time::Duration;

#[cfg(feature = "channel-signal")]
mod channel;
#[cfg(not(feature = "channel-signal"))]
mod condvar;

#[cfg(feature = "channel-signal")]
use channel::Event;
#[cfg(not(feature = "channel-signal"))]
use condvar::Event;

/// Why a wait returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The signal was set and this wait consumed it
    Signaled,
    /// The timeout elapsed first
    TimedOut,
    /// The signal is closed
    Closed,
}

/// Auto-reset event with timed wait
#[derive(Debug)]
pub struct Signal {
    event: Event,
}

impl Signal {
    /// Create an unsignaled event
    #[must_use]
    pub fn new() -> Self {
        Self {
            event: Event::new(),
        }
    }

    /// Signal the event, releasing a blocked waiter
    ///
    /// Setting an already signaled event has no further effect.
    pub fn set(&self) {
        self.event.set();
    }

    /// Block until signaled, closed, or `timeout` elapses
    ///
    /// `None` waits forever; `Some(Duration::ZERO)` checks once without
    /// blocking.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.event.wait(timeout)
    }

    /// Millisecond form of [`Signal::wait`]
    ///
    /// A negative timeout waits forever and zero polls once.
    pub fn wait_ms(&self, timeout_ms: i64) -> WaitOutcome {
        let timeout = u64::try_from(timeout_ms).ok().map(Duration::from_millis);
        self.wait(timeout)
    }

    /// Close the event, waking every waiter
    pub fn close(&self) {
        self.event.close();
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.event.is_closed()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        self.event.close();
    }
}
