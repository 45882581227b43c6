//! Property-based tests for tern
//!
//! Uses proptest to verify invariants across large input spaces.

use proptest::prelude::*;

// ============================================================================
// Message Decoding Properties
// ============================================================================

mod message_properties {
    use super::*;
    use tern_nat::NatType;
    use tern_nat::message::{
        ClientRequest, PortRestrictedProbe, ProbeInstruction, decode_detection_result,
        decode_out_of_band_result, is_no_nat_sentinel,
    };

    proptest! {
        /// Decoders reject or accept arbitrary bytes without panicking
        #[test]
        fn decoders_never_panic(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = ClientRequest::decode(&data);
            let _ = ProbeInstruction::decode(&data);
            let _ = decode_detection_result(&data);
            let _ = decode_out_of_band_result(&data);
            let _ = PortRestrictedProbe::decode(&data);
            let _ = is_no_nat_sentinel(&data);
        }

        /// Every result byte decodes, and the code survives unchanged
        #[test]
        fn result_byte_always_decodes(code in any::<u8>()) {
            let decoded = decode_detection_result(&[0x51, code]).unwrap();
            prop_assert_eq!(decoded.as_u8(), code);
            prop_assert_eq!(decoded == NatType::Other(code), code > 5);
        }

        /// Probe instructions survive encoding for any address text and port
        #[test]
        fn probe_instruction_preserves_fields(address in "[0-9a-f:.]{0,64}", port in any::<u16>()) {
            let instruction = ProbeInstruction { address, port };
            let decoded = ProbeInstruction::decode(&instruction.encode()).unwrap();
            prop_assert_eq!(decoded, instruction);
        }

        /// Only the single sentinel byte counts as the sentinel
        #[test]
        fn sentinel_requires_exact_payload(data in prop::collection::vec(any::<u8>(), 0..8)) {
            prop_assert_eq!(is_no_nat_sentinel(&data), data == [0x00]);
        }
    }
}

// ============================================================================
// Session Properties
// ============================================================================

mod session_properties {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tern_integration_tests::MockHost;
    use tern_nat::message::encode_detection_result;
    use tern_nat::{DetectionConfig, NatType, NatTypeDetectionClient, Packet};

    fn addr(octets: [u8; 4], port: u16) -> SocketAddr {
        SocketAddr::from((octets, port))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Later starts never change the recorded server or secondary port
        #[test]
        fn repeated_start_is_noop(
            others in prop::collection::vec((any::<[u8; 4]>(), 1u16..), 1..8),
        ) {
            let host = Arc::new(MockHost::loopback());
            let mut client = NatTypeDetectionClient::new(host.clone(), DetectionConfig::default());
            let server = addr([198, 51, 100, 1], 61111);

            client.detect_nat_type(server).unwrap();
            let port = client.secondary_socket().unwrap().port();

            for (octets, p) in others {
                client.detect_nat_type(addr(octets, p)).unwrap();
                prop_assert_eq!(client.server_address(), Some(server));
                prop_assert_eq!(client.secondary_socket().unwrap().port(), port);
            }
            prop_assert_eq!(host.sent().len(), 1);
        }

        /// At most one result is injected whatever the server sends
        #[test]
        fn one_result_per_session(codes in prop::collection::vec(any::<u8>(), 1..6)) {
            let host = Arc::new(MockHost::loopback());
            let mut client = NatTypeDetectionClient::new(host.clone(), DetectionConfig::default());
            let server = addr([198, 51, 100, 1], 61111);
            client.detect_nat_type(server).unwrap();

            for code in codes {
                let packet = Packet::from_network(
                    encode_detection_result(NatType::from_wire(code)),
                    server,
                );
                client.on_receive(&packet);
                prop_assert!(!client.is_in_progress());
            }
            prop_assert_eq!(host.injected().len(), 1);
        }
    }
}

// ============================================================================
// Queue Properties
// ============================================================================

mod queue_properties {
    use super::*;
    use std::net::SocketAddr;
    use tern_transport::{PacketQueue, ReceivedDatagram};

    proptest! {
        /// Queue hands datagrams back in push order
        #[test]
        fn queue_is_fifo(payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..64)) {
            let queue = PacketQueue::new();
            let from: SocketAddr = "127.0.0.1:9".parse().unwrap();
            for payload in &payloads {
                queue.push(ReceivedDatagram::new(payload.clone(), from));
            }

            let drained: Vec<Vec<u8>> = std::iter::from_fn(|| queue.pop()).map(|d| d.data).collect();
            prop_assert_eq!(drained, payloads);
            prop_assert!(queue.is_empty());
        }
    }
}
