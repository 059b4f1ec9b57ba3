//! Transport seam.
//!
//! The bridge never touches the network itself. Whatever session layer owns
//! the radio implements [`Transport`]; the sequencer hands it fully framed
//! vendor commands and waits for its status.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::status::Status;

/// One framed vendor command ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub cluster_id: u16,
    pub command_id: u8,
    pub payload: Vec<u8>,
    /// Manufacturer code for the frame header, if any
    pub manufacturer: Option<u16>,
    pub sequence: u16,
    pub timeout: Duration,
    pub expect_reply: bool,
}

/// Errors the transport can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Device not reachable: {0}")]
    Unreachable(String),

    #[error("Transport failure: {0}")]
    Io(String),

    #[error("Transport closed")]
    Closed,
}

/// Sends framed commands to a device.
///
/// Implementations must be cancel-safe: the sequencer drops the future when
/// its own timeout fires or the session shuts down.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a request and return the device's status.
    async fn send(&self, request: TransportRequest) -> Result<Status, TransportError>;

    /// Transport name for logging.
    fn name(&self) -> &str {
        "transport"
    }
}

/// Shared transport handle.
pub type SharedTransport = Arc<dyn Transport>;
