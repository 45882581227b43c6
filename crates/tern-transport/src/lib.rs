//! # tern Transport
//!
//! Secondary datagram socket layer used by NAT type detection.
//!
//! This crate provides:
//! - `RawSocket`: a non-blocking, address-bound UDP socket with an optional
//!   background receive thread
//! - `PacketQueue`: the mutex-guarded FIFO that hands received datagrams from
//!   that thread to a cooperative update loop
//! - `Signal`: a signalable wait primitive with timeout, used to stop the
//!   receive thread deterministically
//! - Local address enumeration
//!
//! ## Threading model
//!
//! ```text
//! ┌──────────────────────┐  push   ┌─────────────┐  pop   ┌──────────────────┐
//! │ receive thread       │ ──────▶ │ PacketQueue │ ─────▶ │ update() tick    │
//! │ (one per RawSocket)  │         │  (Mutex)    │        │ (host main loop) │
//! └──────────────────────┘         └─────────────┘        └──────────────────┘
//!            ▲ stop: Signal + exit acknowledgment
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod interfaces;
pub mod queue;
pub mod raw_socket;
mod receiver;
pub mod signal;

pub use error::{TransportError, TransportResult};
pub use queue::{DatagramSink, PacketQueue, ReceivedDatagram};
pub use raw_socket::RawSocket;
pub use receiver::ReceiveStats;
pub use signal::{Signal, WaitOutcome};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest UDP payload the receive thread will accept in one datagram
pub const MAX_DATAGRAM_SIZE: usize = 65536;

/// Secondary socket configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSocketConfig {
    /// How long the receive thread sleeps on its stop signal when the
    /// socket has nothing to read
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Per-datagram receive buffer size
    pub recv_buffer_size: usize,
    /// Kernel send/receive buffer size (None = leave OS default)
    pub socket_buffer_size: Option<usize>,
    /// Wait slice used while blocking on receive thread shutdown
    #[serde(with = "millis")]
    pub stop_ack_interval: Duration,
}

impl Default for RawSocketConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            recv_buffer_size: MAX_DATAGRAM_SIZE,
            socket_buffer_size: None,
            stop_ack_interval: Duration::from_millis(100),
        }
    }
}

impl RawSocketConfig {
    /// Check the configuration for values the receive loop cannot run with
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidConfig` for a zero poll interval or a
    /// receive buffer outside `1..=MAX_DATAGRAM_SIZE`.
    pub fn validate(&self) -> TransportResult<()> {
        if self.poll_interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        if self.recv_buffer_size == 0 || self.recv_buffer_size > MAX_DATAGRAM_SIZE {
            return Err(TransportError::InvalidConfig(format!(
                "recv_buffer_size must be between 1 and {MAX_DATAGRAM_SIZE}"
            )));
        }
        if self.stop_ack_interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "stop_ack_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RawSocketConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recv_buffer_size, MAX_DATAGRAM_SIZE);
    }

    #[test]
    fn test_config_rejects_zero_poll_interval() {
        let config = RawSocketConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_config_rejects_oversized_buffer() {
        let config = RawSocketConfig {
            recv_buffer_size: MAX_DATAGRAM_SIZE + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RawSocketConfig {
            recv_buffer_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
