//! Background receive thread for a `RawSocket`.
//!
//! The thread owns nothing but a shared handle to the socket and the sink.
//! It reads until the socket would block, then parks on its stop signal for
//! one poll interval. Stopping is a handshake: the owner clears the running
//! flag, sets the stop signal, and blocks until the thread acknowledges on a
//! second signal before joining it.

use crate::queue::{DatagramSink, ReceivedDatagram};
use crate::signal::{Signal, WaitOutcome};
use crate::{RawSocketConfig, TransportError, TransportResult};
use std::io;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Receive thread statistics
#[derive(Debug, Default)]
pub struct ReceiveStats {
    /// Datagrams handed to the sink
    pub datagrams_received: AtomicU64,
    /// Payload bytes handed to the sink
    pub bytes_received: AtomicU64,
    /// Receive errors other than `WouldBlock`
    pub errors: AtomicU64,
}

impl ReceiveStats {
    /// Total datagrams delivered
    pub fn datagrams(&self) -> u64 {
        self.datagrams_received.load(Ordering::Relaxed)
    }

    /// Total payload bytes delivered
    pub fn bytes(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Total receive errors
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    fn record_datagram(&self, bytes: usize) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Sets the exit acknowledgment when the thread body returns or unwinds
struct ExitGuard(Arc<Signal>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// Handle to a running receive thread
pub(crate) struct ReceiveThread {
    name: String,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Signal>,
    exit_ack: Arc<Signal>,
    stop_ack_interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl ReceiveThread {
    /// Start polling `socket` and delivering datagrams to `sink`
    pub(crate) fn spawn(
        socket: Arc<UdpSocket>,
        sink: Arc<dyn DatagramSink>,
        stats: Arc<ReceiveStats>,
        config: &RawSocketConfig,
    ) -> TransportResult<Self> {
        let port = socket.local_addr()?.port();
        let name = format!("tern-recv-{port}");

        let running = Arc::new(AtomicBool::new(true));
        let stop_signal = Arc::new(Signal::new());
        let exit_ack = Arc::new(Signal::new());

        let handle = {
            let name = name.clone();
            let running = running.clone();
            let stop_signal = stop_signal.clone();
            let exit_ack = exit_ack.clone();
            let poll_interval = config.poll_interval;
            let buffer_size = config.recv_buffer_size;

            thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    let _ack = ExitGuard(exit_ack);
                    debug!("{} starting", name);
                    receive_loop(
                        &socket,
                        sink.as_ref(),
                        &stats,
                        &running,
                        &stop_signal,
                        poll_interval,
                        buffer_size,
                    );
                    info!(
                        "{} stopped ({} datagrams, {} bytes, {} errors)",
                        name,
                        stats.datagrams(),
                        stats.bytes(),
                        stats.error_count()
                    );
                })
                .map_err(|e| TransportError::ThreadSpawn(e.to_string()))?
        };

        Ok(Self {
            name,
            running,
            stop_signal,
            exit_ack,
            stop_ack_interval: config.stop_ack_interval,
            handle: Some(handle),
        })
    }

    /// Whether the thread has been started and not yet stopped
    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the thread and block until it has exited
    ///
    /// On return no further sink callback can happen. Calling it again is a
    /// no-op.
    pub(crate) fn stop_blocking(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        debug!("Stopping {}", self.name);
        self.running.store(false, Ordering::Release);
        self.stop_signal.set();

        loop {
            match self.exit_ack.wait(Some(self.stop_ack_interval)) {
                WaitOutcome::Signaled | WaitOutcome::Closed => break,
                WaitOutcome::TimedOut => {
                    trace!("Still waiting for {} to acknowledge stop", self.name);
                }
            }
        }

        if let Err(e) = handle.join() {
            error!("{} failed to join: {:?}", self.name, e);
        }
    }
}

impl Drop for ReceiveThread {
    fn drop(&mut self) {
        self.stop_blocking();
    }
}

fn receive_loop(
    socket: &UdpSocket,
    sink: &dyn DatagramSink,
    stats: &ReceiveStats,
    running: &AtomicBool,
    stop_signal: &Signal,
    poll_interval: Duration,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];

    while running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                trace!("Received {} bytes from {}", len, from);
                stats.record_datagram(len);
                sink.on_datagram(ReceivedDatagram::new(buf[..len].to_vec(), from));
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                stop_signal.wait(Some(poll_interval));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                // ICMP port-unreachable surfaces here as ConnectionReset on some platforms
                stats.record_error();
                warn!("Receive error on secondary socket: {}", e);
                stop_signal.wait(Some(poll_interval));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::PacketQueue;

    fn bound_socket() -> Arc<UdpSocket> {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_nonblocking(true).unwrap();
        Arc::new(socket)
    }

    fn wait_for_len(queue: &PacketQueue, len: usize) {
        for _ in 0..200 {
            if queue.len() >= len {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("expected {} datagrams, got {}", len, queue.len());
    }

    #[test]
    fn test_receive_thread_delivers_datagrams() {
        let socket = bound_socket();
        let addr = socket.local_addr().unwrap();
        let queue = Arc::new(PacketQueue::new());
        let stats = Arc::new(ReceiveStats::default());

        let mut thread = ReceiveThread::spawn(
            socket,
            queue.clone(),
            stats.clone(),
            &RawSocketConfig::default(),
        )
        .unwrap();
        assert!(thread.is_running());

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"one", addr).unwrap();
        sender.send_to(b"two", addr).unwrap();

        wait_for_len(&queue, 2);
        thread.stop_blocking();
        assert!(!thread.is_running());

        assert_eq!(queue.pop().unwrap().data, b"one");
        let second = queue.pop().unwrap();
        assert_eq!(second.data, b"two");
        assert_eq!(second.from, sender.local_addr().unwrap());
        assert_eq!(stats.datagrams(), 2);
        assert_eq!(stats.bytes(), 6);
    }

    #[test]
    fn test_no_delivery_after_stop() {
        let socket = bound_socket();
        let addr = socket.local_addr().unwrap();
        let queue = Arc::new(PacketQueue::new());

        let mut thread = ReceiveThread::spawn(
            socket.clone(),
            queue.clone(),
            Arc::new(ReceiveStats::default()),
            &RawSocketConfig::default(),
        )
        .unwrap();
        thread.stop_blocking();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"late", addr).unwrap();
        thread::sleep(Duration::from_millis(50));

        assert!(queue.is_empty());
        // The datagram is still sitting in the socket buffer
        let mut buf = [0u8; 16];
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"late");
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut thread = ReceiveThread::spawn(
            bound_socket(),
            Arc::new(PacketQueue::new()),
            Arc::new(ReceiveStats::default()),
            &RawSocketConfig::default(),
        )
        .unwrap();

        thread.stop_blocking();
        thread.stop_blocking();
        assert!(!thread.is_running());
    }

    #[test]
    fn test_stop_returns_promptly_with_long_poll_interval() {
        let config = RawSocketConfig {
            poll_interval: Duration::from_secs(30),
            ..Default::default()
        };
        let mut thread = ReceiveThread::spawn(
            bound_socket(),
            Arc::new(PacketQueue::new()),
            Arc::new(ReceiveStats::default()),
            &config,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        let start = std::time::Instant::now();
        thread.stop_blocking();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_receive_stats_accumulation() {
        let stats = ReceiveStats::default();
        stats.record_datagram(10);
        stats.record_datagram(5);
        stats.record_error();

        assert_eq!(stats.datagrams(), 2);
        assert_eq!(stats.bytes(), 15);
        assert_eq!(stats.error_count(), 1);
    }
}
