//! Fuzz target for the detection client's inbound packet handling
//!
//! Feeds arbitrary packet sequences to a running detection and checks that
//! at most one result is ever injected. Inputs tagged as detection requests
//! are skipped so the secondary socket never sends to arbitrary addresses.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tern_nat::{
    DetectionConfig, HostError, MessageId, NatTypeDetectionClient, Packet, PeerGuid, PeerHost,
    Priority, Reliability,
};

#[derive(Debug, Arbitrary)]
struct FuzzPacket {
    data: Vec<u8>,
    locally_generated: bool,
}

#[derive(Default)]
struct NullHost {
    injected: Mutex<usize>,
}

impl PeerHost for NullHost {
    fn send(
        &self,
        _message: &[u8],
        _priority: Priority,
        _reliability: Reliability,
        _channel: u8,
        _destination: SocketAddr,
    ) -> Result<(), HostError> {
        Ok(())
    }

    fn bound_addresses(&self) -> Vec<SocketAddr> {
        vec![SocketAddr::from(([127, 0, 0, 1], 0))]
    }

    fn local_guid(&self) -> PeerGuid {
        PeerGuid(1)
    }

    fn guid_for(&self, _address: SocketAddr) -> Option<PeerGuid> {
        None
    }

    fn push_back_packet(&self, _packet: Packet) {
        *self.injected.lock().unwrap() += 1;
    }
}

fuzz_target!(|packets: Vec<FuzzPacket>| {
    let host = Arc::new(NullHost::default());
    let mut client = NatTypeDetectionClient::new(host.clone(), DetectionConfig::default());
    let server = SocketAddr::from(([127, 0, 0, 1], 9));
    if client.detect_nat_type(server).is_err() {
        return;
    }

    for fuzz in packets.into_iter().take(64) {
        if fuzz.data.first() == Some(&MessageId::DetectionRequest.as_u8()) {
            continue;
        }
        let mut packet = Packet::from_network(fuzz.data, server);
        packet.locally_generated = fuzz.locally_generated;
        client.on_receive(&packet);
    }

    assert!(*host.injected.lock().unwrap() <= 1);
});
