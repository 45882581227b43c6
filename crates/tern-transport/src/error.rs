//! Error types for the secondary socket layer.

use std::io;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Socket has been closed
    #[error("Socket is closed")]
    Closed,

    /// Address binding failed
    #[error("Failed to bind to address: {0}")]
    BindFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The receive thread could not be started
    #[error("Failed to spawn receive thread: {0}")]
    ThreadSpawn(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
