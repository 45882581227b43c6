//! Error types for NAT type detection.

use std::net::SocketAddr;
use tern_transport::TransportError;
use thiserror::Error;

/// NAT detection errors
#[derive(Debug, Error)]
pub enum NatError {
    /// Secondary socket could not be opened or driven
    #[error("secondary socket error: {0}")]
    Transport(#[from] TransportError),

    /// The host has no bound primary socket to take the local address from
    #[error("host has no bound primary socket")]
    NoPrimarySocket,

    /// The host refused to send a message
    #[error("host send failed: {0}")]
    Host(#[from] HostError),
}

/// Errors reported by the host transport's send primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// No connection to the destination
    #[error("destination unreachable: {0}")]
    Unreachable(SocketAddr),

    /// The host rejected the message for another reason
    #[error("send rejected: {0}")]
    Rejected(String),
}

/// Wire message decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Message too short to parse
    #[error("message too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Leading message identifier is not the one expected
    #[error("unexpected message id: 0x{0:02X}")]
    UnexpectedId(u8),

    /// Embedded address string is not UTF-8
    #[error("address is not valid UTF-8")]
    InvalidUtf8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_error_display() {
        let err = MessageError::TooShort {
            expected: 5,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "message too short: expected at least 5, got 2"
        );
        assert_eq!(
            MessageError::UnexpectedId(0x7F).to_string(),
            "unexpected message id: 0x7F"
        );
    }

    #[test]
    fn test_nat_error_from_transport() {
        let err = NatError::from(TransportError::Closed);
        assert!(matches!(err, NatError::Transport(_)));
        assert!(err.to_string().contains("Socket is closed"));
    }

    #[test]
    fn test_nat_error_from_host() {
        let addr: SocketAddr = "198.51.100.1:61111".parse().unwrap();
        let err = NatError::from(HostError::Unreachable(addr));
        assert_eq!(
            err.to_string(),
            "host send failed: destination unreachable: 198.51.100.1:61111"
        );
    }
}
