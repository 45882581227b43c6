use super::WaitOutcome;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct State {
    signaled: bool,
    closed: bool,
}

/// Mutex + Condvar + flag event
#[derive(Debug, Default)]
pub(super) struct Event {
    state: Mutex<State>,
    cond: Condvar,
}

impl Event {
    pub(super) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn set(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.signaled = true;
        drop(state);
        self.cond.notify_one();
    }

    pub(super) fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        // A timeout too large to represent is treated as infinite
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let mut state = self.lock();
        loop {
            if state.closed {
                return WaitOutcome::Closed;
            }
            if state.signaled {
                state.signaled = false;
                return WaitOutcome::Signaled;
            }

            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    let (guard, _) = self
                        .cond
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
                None => {
                    state = self
                        .cond
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    pub(super) fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.signaled = false;
        drop(state);
        self.cond.notify_all();
    }

    pub(super) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
