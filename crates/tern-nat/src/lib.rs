//! # tern NAT
//!
//! Client side of NAT type detection.
//!
//! A detection runs against one remote detection server and uses two paths:
//! - the host's reliable channel, for the request, the server's probe
//!   instructions, the result and the final acknowledgment
//! - a secondary UDP socket whose port is advertised to the server, for
//!   out-of-band reachability probes
//!
//! The client reports its answer by injecting a locally generated
//! `DetectionResult` packet into the host's inbound stream.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tern_nat::{DetectionConfig, NatTypeDetectionClient, PeerHost};
//!
//! # fn example(host: Arc<dyn PeerHost>) -> Result<(), tern_nat::NatError> {
//! let mut client = NatTypeDetectionClient::new(host, DetectionConfig::default());
//! client.detect_nat_type("198.51.100.1:61111".parse().unwrap())?;
//!
//! // From the host's main loop:
//! while client.is_in_progress() {
//!     client.update();
//!     // ...offer inbound packets with client.on_receive(&packet)
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod host;
pub mod message;
pub mod types;

pub use client::NatTypeDetectionClient;
pub use error::{HostError, MessageError, NatError};
pub use host::{Packet, PeerHost, Priority, ReceiveAction, Reliability};
pub use message::{MessageId, NO_NAT_SENTINEL};
pub use types::{NatType, PeerGuid};

use serde::{Deserialize, Serialize};
use tern_transport::RawSocketConfig;

/// Detection client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Priority of the initial detection request
    pub request_priority: Priority,
    /// Priority of the "done" notice sent after completion
    pub done_priority: Priority,
    /// Reliability used for both messages
    pub reliability: Reliability,
    /// Ordering channel on the reliable transport
    pub channel: u8,
    /// Secondary socket settings
    pub socket: RawSocketConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            request_priority: Priority::Medium,
            done_priority: Priority::High,
            reliability: Reliability::Reliable,
            channel: 0,
            socket: RawSocketConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_detection_config() {
        let config = DetectionConfig::default();
        assert_eq!(config.request_priority, Priority::Medium);
        assert_eq!(config.done_priority, Priority::High);
        assert_eq!(config.reliability, Reliability::Reliable);
        assert_eq!(config.channel, 0);
        assert!(config.socket.validate().is_ok());
    }
}
