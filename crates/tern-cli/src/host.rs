//! Minimal datagram host for driving a single detection from the CLI.
//!
//! Messages for the detection server go straight out of the primary socket.
//! There is no retransmission; a lost request shows up as a timeout.

use socket2::{SockAddr, SockRef};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tern_nat::{HostError, Packet, PeerGuid, PeerHost, Priority, Reliability};
use tokio::net::UdpSocket;

/// `PeerHost` over one bound tokio UDP socket
pub struct DatagramHost {
    socket: Arc<UdpSocket>,
    guid: PeerGuid,
    pushed: Mutex<VecDeque<Packet>>,
}

impl DatagramHost {
    /// Wrap a bound primary socket with a fresh random identity
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self {
            socket,
            guid: PeerGuid(rand::random()),
            pushed: Mutex::new(VecDeque::new()),
        }
    }

    /// Next packet injected by a local component
    pub fn pop_pushed(&self) -> Option<Packet> {
        self.pushed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

impl PeerHost for DatagramHost {
    fn send(
        &self,
        message: &[u8],
        priority: Priority,
        reliability: Reliability,
        channel: u8,
        destination: SocketAddr,
    ) -> Result<(), HostError> {
        tracing::trace!(
            "Sending {} bytes to {} ({:?}, {:?}, channel {})",
            message.len(),
            destination,
            priority,
            reliability,
            channel
        );
        // The tokio socket reports WouldBlock until the reactor has polled
        // it once, so sends go through the raw handle.
        let raw = SockRef::from(&*self.socket);
        match raw.send_to(message, &SockAddr::from(destination)) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(HostError::Rejected("send buffer full".to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NetworkUnreachable => {
                Err(HostError::Unreachable(destination))
            }
            Err(e) => Err(HostError::Rejected(e.to_string())),
        }
    }

    fn bound_addresses(&self) -> Vec<SocketAddr> {
        self.socket.local_addr().into_iter().collect()
    }

    fn local_guid(&self) -> PeerGuid {
        self.guid
    }

    fn guid_for(&self, _address: SocketAddr) -> Option<PeerGuid> {
        None
    }

    fn push_back_packet(&self, packet: Packet) {
        self.pushed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_right_after_bind_reaches_destination() {
        let primary = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let host = DatagramHost::new(primary.clone());

        host.send(
            &[0x50, 0x00],
            Priority::High,
            Reliability::Reliable,
            0,
            peer.local_addr().unwrap(),
        )
        .unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[0x50, 0x00]);
        assert_eq!(from, primary.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_bound_addresses_and_pushed_packets() {
        let primary = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let host = DatagramHost::new(primary.clone());

        assert_eq!(host.bound_addresses(), vec![primary.local_addr().unwrap()]);
        assert!(host.pop_pushed().is_none());

        let from = "198.51.100.1:61111".parse().unwrap();
        host.push_back_packet(Packet::from_network(vec![1], from));
        host.push_back_packet(Packet::from_network(vec![2], from));
        assert_eq!(host.pop_pushed().unwrap().data, vec![1]);
        assert_eq!(host.pop_pushed().unwrap().data, vec![2]);
        assert!(host.pop_pushed().is_none());
    }
}
