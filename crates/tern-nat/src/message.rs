//! Wire messages of the NAT detection protocol.
//!
//! Every message starts with a one-byte identifier. Multi-byte integers are
//! big-endian (network byte order); strings carry a `u16` length prefix.
//!
//! | Message | Layout |
//! |---|---|
//! | start request | `DetectionRequest`, `1`, `port:u16` |
//! | done | `DetectionRequest`, `0` |
//! | probe instruction | `DetectionRequest`, `len:u16`, `addr[len]`, `port:u16` |
//! | result | `DetectionResult`, `code:u8` |
//! | out-of-band result | `OutOfBandInternal`, `NatTypeDetect`, `code:u8` |
//! | port-restricted probe (raw) | `code:u8 = 3`, `guid:u64` |
//! | no-NAT sentinel (raw) | `code:u8 = 0` |

use crate::error::MessageError;
use crate::types::{NatType, PeerGuid};

/// Message identifiers used by the detection protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageId {
    /// Client request / done notice, or server probe instruction
    DetectionRequest = 0x50,
    /// Final NAT type
    DetectionResult = 0x51,
    /// Raw, unverified datagram handled outside the reliable pipeline
    OutOfBandInternal = 0x52,
    /// Second byte of an out-of-band detection result
    NatTypeDetect = 0x53,
}

impl MessageId {
    /// Raw byte value
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageId {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x50 => Ok(Self::DetectionRequest),
            0x51 => Ok(Self::DetectionResult),
            0x52 => Ok(Self::OutOfBandInternal),
            0x53 => Ok(Self::NatTypeDetect),
            _ => Err(MessageError::UnexpectedId(value)),
        }
    }
}

/// Single byte the server sends to the secondary socket when it is reachable
/// without NAT
pub const NO_NAT_SENTINEL: u8 = NatType::None.as_u8();

/// Whether a raw datagram is the no-NAT sentinel
pub fn is_no_nat_sentinel(payload: &[u8]) -> bool {
    payload == [NO_NAT_SENTINEL]
}

/// Bounds-checked cursor over a message body
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], MessageError> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(MessageError::TooShort {
                expected: end,
                actual: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, MessageError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, MessageError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn string(&mut self) -> Result<String, MessageError> {
        let len = usize::from(self.u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| MessageError::InvalidUtf8)
    }

    fn expect_id(&mut self, id: MessageId) -> Result<(), MessageError> {
        let byte = self.u8()?;
        if byte == id.as_u8() {
            Ok(())
        } else {
            Err(MessageError::UnexpectedId(byte))
        }
    }
}

/// Client-to-server `DetectionRequest`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRequest {
    /// Begin detection; the server probes `secondary_port`
    Start {
        /// Port the client's secondary socket is bound to
        secondary_port: u16,
    },
    /// Detection finished; stop sending probes
    Done,
}

impl ClientRequest {
    /// Encode to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![MessageId::DetectionRequest.as_u8()];
        match self {
            Self::Start { secondary_port } => {
                bytes.push(1);
                bytes.extend_from_slice(&secondary_port.to_be_bytes());
            }
            Self::Done => bytes.push(0),
        }
        bytes
    }

    /// Decode from wire bytes
    ///
    /// # Errors
    ///
    /// Returns `MessageError` for a wrong identifier or truncated body.
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let mut reader = Reader::new(bytes);
        reader.expect_id(MessageId::DetectionRequest)?;
        if reader.u8()? != 0 {
            Ok(Self::Start {
                secondary_port: reader.u16()?,
            })
        } else {
            Ok(Self::Done)
        }
    }
}

/// Server instruction to send a port-restricted probe to a third party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInstruction {
    /// Textual IP address of the probe target
    pub address: String,
    /// Probe target port
    pub port: u16,
}

impl ProbeInstruction {
    /// Encode to wire bytes
    ///
    /// Addresses longer than `u16::MAX` bytes are truncated at that length.
    pub fn encode(&self) -> Vec<u8> {
        let address = self.address.as_bytes();
        let len = address.len().min(usize::from(u16::MAX));

        let mut bytes = Vec::with_capacity(5 + len);
        bytes.push(MessageId::DetectionRequest.as_u8());
        bytes.extend_from_slice(&(len as u16).to_be_bytes());
        bytes.extend_from_slice(&address[..len]);
        bytes.extend_from_slice(&self.port.to_be_bytes());
        bytes
    }

    /// Decode from wire bytes
    ///
    /// # Errors
    ///
    /// Returns `MessageError` for a wrong identifier, truncated body or a
    /// non-UTF-8 address.
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let mut reader = Reader::new(bytes);
        reader.expect_id(MessageId::DetectionRequest)?;
        let address = reader.string()?;
        let port = reader.u16()?;
        Ok(Self { address, port })
    }
}

/// Encode a `DetectionResult` message
pub fn encode_detection_result(result: NatType) -> Vec<u8> {
    vec![MessageId::DetectionResult.as_u8(), result.as_u8()]
}

/// Decode a `DetectionResult` message
///
/// # Errors
///
/// Returns `MessageError` for a wrong identifier or missing result byte.
pub fn decode_detection_result(bytes: &[u8]) -> Result<NatType, MessageError> {
    let mut reader = Reader::new(bytes);
    reader.expect_id(MessageId::DetectionResult)?;
    Ok(NatType::from_wire(reader.u8()?))
}

/// Encode an out-of-band detection result
pub fn encode_out_of_band_result(result: NatType) -> Vec<u8> {
    vec![
        MessageId::OutOfBandInternal.as_u8(),
        MessageId::NatTypeDetect.as_u8(),
        result.as_u8(),
    ]
}

/// Decode an out-of-band detection result
///
/// # Errors
///
/// Returns `MessageError::UnexpectedId` when the datagram is out-of-band
/// but carries something other than a detection result.
pub fn decode_out_of_band_result(bytes: &[u8]) -> Result<NatType, MessageError> {
    let mut reader = Reader::new(bytes);
    reader.expect_id(MessageId::OutOfBandInternal)?;
    reader.expect_id(MessageId::NatTypeDetect)?;
    Ok(NatType::from_wire(reader.u8()?))
}

/// Unformatted datagram sent from the secondary socket to the probe target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRestrictedProbe {
    /// Identity of the probing peer
    pub guid: PeerGuid,
}

impl PortRestrictedProbe {
    /// Leading byte of the probe
    pub const TAG: u8 = NatType::PortRestricted.as_u8();

    /// Encoded size in bytes
    pub const SIZE: usize = 1 + PeerGuid::SIZE;

    /// Encode to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.push(Self::TAG);
        bytes.extend_from_slice(&self.guid.to_bytes());
        bytes
    }

    /// Decode from wire bytes
    ///
    /// # Errors
    ///
    /// Returns `MessageError` for a wrong tag or truncated body.
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let mut reader = Reader::new(bytes);
        let tag = reader.u8()?;
        if tag != Self::TAG {
            return Err(MessageError::UnexpectedId(tag));
        }
        let mut guid = [0u8; PeerGuid::SIZE];
        guid.copy_from_slice(reader.take(PeerGuid::SIZE)?);
        Ok(Self {
            guid: PeerGuid::from_bytes(guid),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_try_from() {
        assert_eq!(
            MessageId::try_from(0x50).unwrap(),
            MessageId::DetectionRequest
        );
        assert_eq!(
            MessageId::try_from(0x53).unwrap(),
            MessageId::NatTypeDetect
        );
        assert_eq!(
            MessageId::try_from(0x00),
            Err(MessageError::UnexpectedId(0x00))
        );
    }

    #[test]
    fn test_start_request_layout() {
        let bytes = ClientRequest::Start {
            secondary_port: 0xABCD,
        }
        .encode();
        assert_eq!(bytes, vec![0x50, 0x01, 0xAB, 0xCD]);
        assert_eq!(
            ClientRequest::decode(&bytes).unwrap(),
            ClientRequest::Start {
                secondary_port: 0xABCD
            }
        );
    }

    #[test]
    fn test_done_request_layout() {
        let bytes = ClientRequest::Done.encode();
        assert_eq!(bytes, vec![0x50, 0x00]);
        assert_eq!(ClientRequest::decode(&bytes).unwrap(), ClientRequest::Done);
    }

    #[test]
    fn test_truncated_start_request() {
        assert_eq!(
            ClientRequest::decode(&[0x50, 0x01, 0xAB]),
            Err(MessageError::TooShort {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_probe_instruction_layout() {
        let instruction = ProbeInstruction {
            address: "203.0.113.5".to_string(),
            port: 40000,
        };
        let bytes = instruction.encode();
        assert_eq!(bytes[0], 0x50);
        assert_eq!(&bytes[1..3], &[0x00, 11]);
        assert_eq!(&bytes[3..14], b"203.0.113.5");
        assert_eq!(&bytes[14..], &40000u16.to_be_bytes());

        assert_eq!(ProbeInstruction::decode(&bytes).unwrap(), instruction);
    }

    #[test]
    fn test_probe_instruction_truncated_address() {
        // Claims 11 address bytes, carries 3
        let bytes = [0x50, 0x00, 11, b'2', b'0', b'3'];
        assert!(matches!(
            ProbeInstruction::decode(&bytes),
            Err(MessageError::TooShort { .. })
        ));
    }

    #[test]
    fn test_probe_instruction_missing_port() {
        let mut bytes = ProbeInstruction {
            address: "10.0.0.1".to_string(),
            port: 1,
        }
        .encode();
        bytes.truncate(bytes.len() - 1);
        assert!(ProbeInstruction::decode(&bytes).is_err());
    }

    #[test]
    fn test_probe_instruction_invalid_utf8() {
        let bytes = [0x50, 0x00, 0x02, 0xFF, 0xFE, 0x00, 0x01];
        assert_eq!(
            ProbeInstruction::decode(&bytes),
            Err(MessageError::InvalidUtf8)
        );
    }

    #[test]
    fn test_detection_result() {
        let bytes = encode_detection_result(NatType::FullCone);
        assert_eq!(bytes, vec![0x51, 0x01]);
        assert_eq!(decode_detection_result(&bytes).unwrap(), NatType::FullCone);
        assert!(decode_detection_result(&[0x51]).is_err());
        assert!(decode_detection_result(&[0x50, 0x01]).is_err());
    }

    #[test]
    fn test_out_of_band_result() {
        let bytes = encode_out_of_band_result(NatType::Symmetric);
        assert_eq!(bytes, vec![0x52, 0x53, 0x04]);
        assert_eq!(
            decode_out_of_band_result(&bytes).unwrap(),
            NatType::Symmetric
        );
    }

    #[test]
    fn test_out_of_band_other_payload() {
        assert_eq!(
            decode_out_of_band_result(&[0x52, 0x99, 0x00]),
            Err(MessageError::UnexpectedId(0x99))
        );
        assert!(decode_out_of_band_result(&[0x52, 0x53]).is_err());
    }

    #[test]
    fn test_port_restricted_probe() {
        let probe = PortRestrictedProbe {
            guid: PeerGuid(0xDEAD_BEEF_0000_0001),
        };
        let bytes = probe.encode();
        assert_eq!(bytes.len(), PortRestrictedProbe::SIZE);
        assert_eq!(bytes[0], 3);
        assert_eq!(PortRestrictedProbe::decode(&bytes).unwrap(), probe);
        assert!(PortRestrictedProbe::decode(&bytes[..5]).is_err());
        assert_eq!(
            PortRestrictedProbe::decode(&[0x00; 9]),
            Err(MessageError::UnexpectedId(0x00))
        );
    }

    #[test]
    fn test_no_nat_sentinel() {
        assert!(is_no_nat_sentinel(&[0]));
        assert!(!is_no_nat_sentinel(&[0, 0]));
        assert!(!is_no_nat_sentinel(&[1]));
        assert!(!is_no_nat_sentinel(&[]));
    }

    #[test]
    fn test_result_code_passes_through() {
        let bytes = [0x51, 0x07];
        let result = decode_detection_result(&bytes).unwrap();
        assert_eq!(result, NatType::Other(7));
        assert_eq!(encode_detection_result(result), bytes);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decoders_reject_garbage_without_panicking(
                data in prop::collection::vec(any::<u8>(), 0..300),
            ) {
                let _ = ClientRequest::decode(&data);
                let _ = ProbeInstruction::decode(&data);
                let _ = decode_detection_result(&data);
                let _ = decode_out_of_band_result(&data);
                let _ = PortRestrictedProbe::decode(&data);
            }

            #[test]
            fn result_bytes_are_preserved(code in any::<u8>()) {
                let in_band = encode_detection_result(NatType::from_wire(code));
                prop_assert_eq!(in_band, vec![0x51, code]);

                let out_of_band = decode_out_of_band_result(&[0x52, 0x53, code]).unwrap();
                prop_assert_eq!(out_of_band.as_u8(), code);
            }
        }
    }
}
