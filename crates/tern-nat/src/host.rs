//! Capabilities the detection client needs from its host peer.
//!
//! The host owns the reliable channel, the primary sockets and the inbound
//! packet pipeline. The client only sees it through [`PeerHost`], injected
//! at construction.

use crate::error::HostError;
use crate::types::PeerGuid;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Send priority on the reliable channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Sent ahead of everything else, unbuffered
    Immediate,
    /// High priority
    High,
    /// Medium priority
    Medium,
    /// Low priority
    Low,
}

/// Delivery guarantee requested from the host transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    /// Fire and forget
    Unreliable,
    /// Unreliable, older packets dropped
    UnreliableSequenced,
    /// Retransmitted until acknowledged, any order
    Reliable,
    /// Retransmitted and delivered in order
    ReliableOrdered,
    /// Retransmitted, older packets dropped
    ReliableSequenced,
}

/// A packet in the host's inbound pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Message bytes, identifier first
    pub data: Vec<u8>,
    /// Remote system the packet came from (or is about)
    pub system_address: SocketAddr,
    /// Identity of that system, when known
    pub guid: Option<PeerGuid>,
    /// Injected by a local component rather than received from the network
    pub locally_generated: bool,
}

impl Packet {
    /// A packet received from the network
    pub fn from_network(data: Vec<u8>, system_address: SocketAddr) -> Self {
        Self {
            data,
            system_address,
            guid: None,
            locally_generated: false,
        }
    }

    /// Leading message identifier byte
    pub fn id(&self) -> Option<u8> {
        self.data.first().copied()
    }
}

/// What the host should do with a packet after offering it to a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveAction {
    /// Not handled here; keep offering it to other components
    Continue,
    /// Handled and consumed; stop processing
    StopProcessing,
}

/// Host peer capabilities used by the detection client
pub trait PeerHost: Send + Sync {
    /// Send a message over the reliable channel
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the host will not queue the message.
    fn send(
        &self,
        message: &[u8],
        priority: Priority,
        reliability: Reliability,
        channel: u8,
        destination: SocketAddr,
    ) -> Result<(), HostError>;

    /// Addresses of the locally bound primary sockets; the first one is the
    /// template for the secondary socket
    fn bound_addresses(&self) -> Vec<SocketAddr>;

    /// This host's own identity
    fn local_guid(&self) -> PeerGuid;

    /// Identity of a connected remote system
    fn guid_for(&self, address: SocketAddr) -> Option<PeerGuid>;

    /// Inject a packet into the inbound stream as if it came off the network
    fn push_back_packet(&self, packet: Packet);
}
