//! NAT type detection state machine.
//!
//! ```text
//! Idle ──detect_nat_type──▶ InProgress ──completion / connection lost /
//!  ▲                                     host shutdown / detach──┐
//!  └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The client handles one detection at a time. While it is in progress the
//! secondary socket's receive thread feeds a [`PacketQueue`], which
//! [`NatTypeDetectionClient::update`] drains from the host's main loop.
//! Completion can be triggered from either path; whichever arrives first
//! wins and the other finds the client idle.

use crate::DetectionConfig;
use crate::error::NatError;
use crate::host::{Packet, PeerHost, ReceiveAction};
use crate::message::{
    ClientRequest, MessageId, PortRestrictedProbe, ProbeInstruction, decode_detection_result,
    decode_out_of_band_result, encode_detection_result, is_no_nat_sentinel,
};
use crate::types::NatType;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tern_transport::{PacketQueue, RawSocket};
use tracing::{debug, info, trace, warn};

/// Client side of NAT type detection against a single server
pub struct NatTypeDetectionClient {
    host: Arc<dyn PeerHost>,
    config: DetectionConfig,
    /// `None` while idle
    server: Option<SocketAddr>,
    socket: Option<RawSocket>,
    queue: Arc<PacketQueue>,
}

impl NatTypeDetectionClient {
    /// Create an idle client bound to `host`
    pub fn new(host: Arc<dyn PeerHost>, config: DetectionConfig) -> Self {
        Self {
            host,
            config,
            server: None,
            socket: None,
            queue: Arc::new(PacketQueue::new()),
        }
    }

    /// Start detecting the NAT type with the help of `server`
    ///
    /// Opens the secondary socket on the primary socket's local IP if it is
    /// not open yet, makes sure its receive thread runs, and asks the server
    /// to begin. Calling this while a detection is in progress does nothing.
    ///
    /// # Errors
    ///
    /// Returns `NatError::NoPrimarySocket` if the host has no bound socket,
    /// `NatError::Transport` if the secondary socket cannot be opened, and
    /// `NatError::Host` if the request cannot be sent. The client is idle
    /// after any error.
    pub fn detect_nat_type(&mut self, server: SocketAddr) -> Result<(), NatError> {
        if self.is_in_progress() {
            debug!(
                "NAT type detection already in progress against {:?}, ignoring request for {}",
                self.server, server
            );
            return Ok(());
        }

        let secondary_port = self.arm_secondary_socket()?;
        self.server = Some(server);

        let request = ClientRequest::Start { secondary_port }.encode();
        if let Err(e) = self.host.send(
            &request,
            self.config.request_priority,
            self.config.reliability,
            self.config.channel,
            server,
        ) {
            warn!("Failed to send NAT detection request to {}: {}", server, e);
            self.shutdown();
            return Err(e.into());
        }

        info!(
            "NAT type detection started against {} (secondary port {})",
            server, secondary_port
        );
        Ok(())
    }

    /// Open the secondary socket if needed and start its receive thread
    fn arm_secondary_socket(&mut self) -> Result<u16, NatError> {
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => {
                let template = self.primary_address().ok_or(NatError::NoPrimarySocket)?;
                RawSocket::open(template.ip(), &self.config.socket)?
            }
        };
        let socket = self.socket.insert(socket);

        socket.start_receive_thread(self.queue.clone())?;
        Ok(socket.port())
    }

    fn primary_address(&self) -> Option<SocketAddr> {
        self.host.bound_addresses().first().copied()
    }

    /// Whether a detection is running
    pub fn is_in_progress(&self) -> bool {
        self.server.is_some()
    }

    /// Server of the running detection
    pub fn server_address(&self) -> Option<SocketAddr> {
        self.server
    }

    /// The secondary socket, while one is open
    pub fn secondary_socket(&self) -> Option<&RawSocket> {
        self.socket.as_ref()
    }

    /// Process datagrams received on the secondary socket
    ///
    /// Never blocks. Drains the whole queue; a no-NAT sentinel completes the
    /// detection with [`NatType::None`], anything else is discarded.
    pub fn update(&mut self) {
        if !self.is_in_progress() {
            return;
        }

        while let Some(datagram) = self.queue.pop() {
            if self.is_in_progress() && is_no_nat_sentinel(&datagram.data) {
                debug!("No-NAT sentinel received from {}", datagram.from);
                self.on_completion(NatType::None);
                debug_assert!(!self.is_in_progress());
            } else {
                trace!(
                    "Discarding {} byte datagram from {} (queued {:?})",
                    datagram.len(),
                    datagram.from,
                    datagram.received_at.elapsed()
                );
            }
        }
    }

    /// Offer an inbound packet from the host pipeline
    ///
    /// Only acts while a detection is in progress.
    pub fn on_receive(&mut self, packet: &Packet) -> ReceiveAction {
        if !self.is_in_progress() {
            return ReceiveAction::Continue;
        }
        let Some(Ok(id)) = packet.id().map(MessageId::try_from) else {
            return ReceiveAction::Continue;
        };

        match id {
            MessageId::OutOfBandInternal => match decode_out_of_band_result(&packet.data) {
                Ok(result) => {
                    self.on_completion(result);
                    ReceiveAction::StopProcessing
                }
                // Some other out-of-band user's datagram
                Err(_) => ReceiveAction::Continue,
            },
            MessageId::DetectionResult if !packet.locally_generated => {
                match decode_detection_result(&packet.data) {
                    Ok(result) => self.on_completion(result),
                    Err(e) => debug!(
                        "Dropping malformed detection result from {}: {}",
                        packet.system_address, e
                    ),
                }
                ReceiveAction::StopProcessing
            }
            MessageId::DetectionRequest => {
                self.on_test_port_restricted(packet);
                ReceiveAction::StopProcessing
            }
            _ => ReceiveAction::Continue,
        }
    }

    /// Send the port-restricted probe the server asked for
    ///
    /// Goes out once, on the secondary socket, since that is the port the
    /// server was told about. The server repeats the instruction to cover
    /// loss.
    fn on_test_port_restricted(&self, packet: &Packet) {
        let instruction = match ProbeInstruction::decode(&packet.data) {
            Ok(instruction) => instruction,
            Err(e) => {
                debug!(
                    "Dropping malformed probe instruction from {}: {}",
                    packet.system_address, e
                );
                return;
            }
        };

        let Some(template) = self.primary_address() else {
            warn!("Probe instruction received but host has no bound socket");
            return;
        };
        let Some(target) = probe_target(&instruction, template) else {
            debug!(
                "Probe target {}:{} unusable with local address {}",
                instruction.address, instruction.port, template
            );
            return;
        };
        let Some(socket) = self.socket.as_ref() else {
            warn!("Probe instruction received without a secondary socket");
            return;
        };

        let probe = PortRestrictedProbe {
            guid: self.host.local_guid(),
        };
        match socket.send_to(&probe.encode(), target) {
            Ok(_) => debug!("Sent port-restricted probe to {}", target),
            Err(e) => warn!("Port-restricted probe to {} failed: {}", target, e),
        }
    }

    /// Deliver `result` to the application and end the detection
    ///
    /// Callers check `is_in_progress()` first.
    fn on_completion(&mut self, result: NatType) {
        let Some(server) = self.server else {
            return;
        };

        info!("NAT type detection against {} finished: {}", server, result);

        self.host.push_back_packet(Packet {
            data: encode_detection_result(result),
            system_address: server,
            guid: self.host.guid_for(server),
            locally_generated: true,
        });

        // The server determined these itself and is not waiting on us
        if !result.is_server_determined() {
            if let Err(e) = self.host.send(
                &ClientRequest::Done.encode(),
                self.config.done_priority,
                self.config.reliability,
                self.config.channel,
                server,
            ) {
                warn!("Failed to notify {} that detection is done: {}", server, e);
            }
        }

        self.shutdown();
    }

    /// Abort or finish the running detection and release the socket
    ///
    /// Blocks until the receive thread has stopped. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        let server = self.server.take();

        if let Some(mut socket) = self.socket.take() {
            socket.stop_receive_thread_blocking();
            socket.close();
        }

        let dropped = self.queue.clear();
        if server.is_some() || dropped > 0 {
            debug!(
                "NAT type detection shut down (server {:?}, {} queued datagrams dropped)",
                server, dropped
            );
        }
    }

    /// The host lost its connection to `address`
    pub fn on_closed_connection(&mut self, address: SocketAddr) {
        if self.server == Some(address) {
            info!("Lost connection to detection server {}, aborting", address);
            self.shutdown();
        }
    }

    /// The host peer is shutting down
    pub fn on_host_shutdown(&mut self) {
        self.shutdown();
    }

    /// The client is being detached from its host
    pub fn on_detach(&mut self) {
        self.shutdown();
    }
}

impl Drop for NatTypeDetectionClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for NatTypeDetectionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatTypeDetectionClient")
            .field("server", &self.server)
            .field("socket", &self.socket)
            .field("queued", &self.queue.len())
            .finish()
    }
}

/// Build the probe destination in the address family of `template`
///
/// IPv4 targets are mapped into IPv6 for an IPv6 template. An IPv6 target
/// is only usable from an IPv4 template if it is itself IPv4-mapped.
fn probe_target(instruction: &ProbeInstruction, template: SocketAddr) -> Option<SocketAddr> {
    let ip: IpAddr = instruction.address.trim().parse().ok()?;
    let ip = match (template, ip) {
        (SocketAddr::V4(_), IpAddr::V4(v4)) => IpAddr::V4(v4),
        (SocketAddr::V4(_), IpAddr::V6(v6)) => IpAddr::V4(v6.to_ipv4_mapped()?),
        (SocketAddr::V6(_), IpAddr::V4(v4)) => IpAddr::V6(v4.to_ipv6_mapped()),
        (SocketAddr::V6(_), IpAddr::V6(v6)) => IpAddr::V6(v6),
    };
    Some(SocketAddr::new(ip, instruction.port))
}
