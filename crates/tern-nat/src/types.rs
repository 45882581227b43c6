//! NAT classification and peer identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// NAT type classification reported by the detection server
///
/// The result set is defined by the server. Codes the client has no name
/// for are kept as `Other` and forwarded unchanged. Only `PortRestricted`
/// and `Symmetric` change client behavior: the server already holds those
/// answers, so the client does not acknowledge them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NatType {
    /// No NAT detected; the secondary socket is directly reachable
    None,
    /// Full Cone NAT - any external host can send to the mapped port
    FullCone,
    /// Address Restricted NAT - only contacted IPs can send
    AddressRestricted,
    /// Port Restricted NAT - only contacted IP:port pairs can send
    PortRestricted,
    /// Symmetric NAT - different mapping per destination
    Symmetric,
    /// The server could not classify the NAT
    Unknown,
    /// A server-defined code without a name here (never 0..=5)
    Other(u8),
}

impl NatType {
    /// Decode a wire result code
    pub const fn from_wire(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::FullCone,
            2 => Self::AddressRestricted,
            3 => Self::PortRestricted,
            4 => Self::Symmetric,
            5 => Self::Unknown,
            other => Self::Other(other),
        }
    }

    /// Wire result code
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::FullCone => 1,
            Self::AddressRestricted => 2,
            Self::PortRestricted => 3,
            Self::Symmetric => 4,
            Self::Unknown => 5,
            Self::Other(code) => code,
        }
    }

    /// Whether the server already knows this answer and expects no
    /// acknowledgment from the client
    pub fn is_server_determined(self) -> bool {
        matches!(self, Self::PortRestricted | Self::Symmetric)
    }
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "Open (No NAT)"),
            Self::FullCone => write!(f, "Full Cone NAT"),
            Self::AddressRestricted => write!(f, "Address Restricted NAT"),
            Self::PortRestricted => write!(f, "Port Restricted NAT"),
            Self::Symmetric => write!(f, "Symmetric NAT"),
            Self::Unknown => write!(f, "Unknown NAT Type"),
            Self::Other(code) => write!(f, "Server Result {}", code),
        }
    }
}

/// Unique peer identifier assigned by the host transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerGuid(pub u64);

impl PeerGuid {
    /// Encoded size in bytes
    pub const SIZE: usize = 8;

    /// Big-endian wire encoding
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        self.0.to_be_bytes()
    }

    /// Decode from big-endian bytes
    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for PeerGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
