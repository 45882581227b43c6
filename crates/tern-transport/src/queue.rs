//! Hand-off queue between a receive thread and the update loop.
//!
//! The receive thread is the only producer and the session's update tick is
//! the only consumer. Both sides take the same mutex for the length of a
//! single push or pop, never across I/O.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// A datagram captured by a receive thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedDatagram {
    /// Payload bytes as read from the socket
    pub data: Vec<u8>,
    /// Sender address
    pub from: SocketAddr,
    /// When the datagram was read
    pub received_at: Instant,
}

impl ReceivedDatagram {
    /// Capture a datagram received now
    pub fn new(data: Vec<u8>, from: SocketAddr) -> Self {
        Self {
            data,
            from,
            received_at: Instant::now(),
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Consumer of datagrams delivered by a receive thread
///
/// Called on the receive thread, so implementations must be cheap and must
/// not block on anything the update loop holds.
pub trait DatagramSink: Send + Sync {
    /// Take ownership of one received datagram
    fn on_datagram(&self, datagram: ReceivedDatagram);
}

/// Mutex-protected FIFO of received datagrams
#[derive(Debug, Default)]
pub struct PacketQueue {
    inner: Mutex<VecDeque<ReceivedDatagram>>,
}

impl PacketQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ReceivedDatagram>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a datagram at the tail
    pub fn push(&self, datagram: ReceivedDatagram) {
        self.lock().push_back(datagram);
    }

    /// Remove the oldest datagram
    pub fn pop(&self) -> Option<ReceivedDatagram> {
        self.lock().pop_front()
    }

    /// Discard every queued datagram, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Number of queued datagrams
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl DatagramSink for PacketQueue {
    fn on_datagram(&self, datagram: ReceivedDatagram) {
        self.push(datagram);
    }
}
