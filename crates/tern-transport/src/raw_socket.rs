//! Non-blocking secondary UDP socket.
//!
//! A `RawSocket` is bound next to the host's primary socket (same local IP,
//! OS-chosen port) and is used for datagrams that must bypass the reliable
//! channel. Incoming traffic is read by an optional background thread and
//! delivered to a [`DatagramSink`].
//!
//! Dropping the socket stops the receive thread first and blocks until it
//! has exited, so the sink is never called once destruction has begun.

use crate::queue::DatagramSink;
use crate::receiver::{ReceiveStats, ReceiveThread};
use crate::{RawSocketConfig, TransportError, TransportResult};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Secondary datagram socket with an optional receive thread
pub struct RawSocket {
    socket: Arc<UdpSocket>,
    bound_addr: SocketAddr,
    config: RawSocketConfig,
    stats: Arc<ReceiveStats>,
    receiver: Option<ReceiveThread>,
}

impl RawSocket {
    /// Open a non-blocking socket on `local_ip` with an ephemeral port
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidConfig` for an unusable config and
    /// `TransportError::BindFailed` if the socket cannot be created or bound.
    ///
    /// # Examples
    /// ```no_run
    /// use tern_transport::{RawSocket, RawSocketConfig};
    ///
    /// let socket = RawSocket::open("127.0.0.1".parse().unwrap(), &RawSocketConfig::default()).unwrap();
    /// println!("Secondary socket on port {}", socket.port());
    /// ```
    pub fn open(local_ip: IpAddr, config: &RawSocketConfig) -> TransportResult<Self> {
        Self::open_at(SocketAddr::new(local_ip, 0), config)
    }

    /// Open a non-blocking socket on an explicit local address
    ///
    /// # Errors
    ///
    /// Same as [`RawSocket::open`].
    pub fn open_at(addr: SocketAddr, config: &RawSocketConfig) -> TransportResult<Self> {
        config.validate()?;

        let socket = Self::bind_socket(addr, config)
            .map_err(|e| TransportError::BindFailed(format!("{addr}: {e}")))?;
        let bound_addr = socket.local_addr()?;

        info!("Secondary socket bound to {}", bound_addr);

        Ok(Self {
            socket: Arc::new(socket),
            bound_addr,
            config: config.clone(),
            stats: Arc::new(ReceiveStats::default()),
            receiver: None,
        })
    }

    fn bind_socket(addr: SocketAddr, config: &RawSocketConfig) -> std::io::Result<UdpSocket> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;

        if let Some(size) = config.socket_buffer_size {
            // Kernel limits may cap these; a refusal is not fatal
            if let Err(e) = socket.set_recv_buffer_size(size) {
                warn!("Could not set receive buffer to {} bytes: {}", size, e);
            }
            if let Err(e) = socket.set_send_buffer_size(size) {
                warn!("Could not set send buffer to {} bytes: {}", size, e);
            }
        }

        socket.bind(&addr.into())?;
        Ok(socket.into())
    }

    /// Send one unreliable datagram
    ///
    /// Non-blocking: a full send buffer surfaces as an `Io` error of kind
    /// `WouldBlock` rather than stalling the caller.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the OS rejects the send.
    pub fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        let sent = self.socket.send_to(buf, addr)?;
        debug!("Secondary socket sent {} bytes to {}", sent, addr);
        Ok(sent)
    }

    /// Start delivering received datagrams to `sink`
    ///
    /// Idempotent: if a receive thread is already running this returns `Ok`
    /// without spawning another one, and the existing sink is kept.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ThreadSpawn` if the OS refuses the thread.
    pub fn start_receive_thread(&mut self, sink: Arc<dyn DatagramSink>) -> TransportResult<()> {
        if self.is_receiving() {
            debug!("Receive thread for {} already running", self.bound_addr);
            return Ok(());
        }

        let thread =
            ReceiveThread::spawn(self.socket.clone(), sink, self.stats.clone(), &self.config)?;
        self.receiver = Some(thread);
        Ok(())
    }

    /// Stop the receive thread and wait until it has fully exited
    ///
    /// After this returns no datagram is delivered to the sink again.
    /// Does nothing if no thread is running.
    pub fn stop_receive_thread_blocking(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.stop_blocking();
        }
    }

    /// Whether a receive thread is running
    pub fn is_receiving(&self) -> bool {
        self.receiver.as_ref().is_some_and(ReceiveThread::is_running)
    }

    /// Close the socket, stopping the receive thread first
    pub fn close(mut self) {
        self.stop_receive_thread_blocking();
        debug!("Secondary socket {} closed", self.bound_addr);
    }

    /// Local address the socket is bound to
    pub fn bound_addr(&self) -> SocketAddr {
        self.bound_addr
    }

    /// Local port the socket is bound to
    pub fn port(&self) -> u16 {
        self.bound_addr.port()
    }

    /// Receive statistics accumulated across receive threads
    pub fn stats(&self) -> &ReceiveStats {
        &self.stats
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        self.stop_receive_thread_blocking();
    }
}

impl std::fmt::Debug for RawSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSocket")
            .field("bound_addr", &self.bound_addr)
            .field("receiving", &self.is_receiving())
            .finish()
    }
}
