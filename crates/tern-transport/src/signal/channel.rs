use super::WaitOutcome;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// One-slot channel event
///
/// The pending token sits in the channel buffer, so a `set()` that lands
/// before `wait()` is observed by the next receive. Dropping the sender on
/// close disconnects every blocked receiver.
#[derive(Debug)]
pub(super) struct Event {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
    closed: AtomicBool,
}

impl Event {
    pub(super) fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            closed: AtomicBool::new(false),
        }
    }

    pub(super) fn set(&self) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx.as_ref() {
            // Full means already signaled
            let _ = tx.try_send(());
        }
    }

    pub(super) fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        if self.is_closed() {
            return WaitOutcome::Closed;
        }

        let outcome = match timeout {
            None => match self.rx.recv() {
                Ok(()) => WaitOutcome::Signaled,
                Err(_) => WaitOutcome::Closed,
            },
            Some(timeout) if timeout.is_zero() => match self.rx.try_recv() {
                Ok(()) => WaitOutcome::Signaled,
                Err(TryRecvError::Empty) => WaitOutcome::TimedOut,
                Err(TryRecvError::Disconnected) => WaitOutcome::Closed,
            },
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(()) => WaitOutcome::Signaled,
                Err(RecvTimeoutError::Timeout) => WaitOutcome::TimedOut,
                Err(RecvTimeoutError::Disconnected) => WaitOutcome::Closed,
            },
        };

        // A token buffered before close does not count once closed
        if outcome == WaitOutcome::Signaled && self.is_closed() {
            WaitOutcome::Closed
        } else {
            outcome
        }
    }

    pub(super) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
