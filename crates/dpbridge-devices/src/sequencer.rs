//! Outbound command sequencing.
//!
//! Each device session owns one [`CommandSequencer`]. Sequence allocation and
//! transmission happen under a single async lock, so commands leave in the
//! order their sequence numbers were handed out and at most one is in flight
//! per session.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use dpbridge_core::BridgeConfig;

use crate::datapoint::{frame_payload, serialize_hex};
use crate::status::Status;
use crate::transport::{SharedTransport, TransportError, TransportRequest};

/// A command as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingCommand {
    pub sequence: u16,
    pub cluster_id: u16,
    pub command_id: u8,
    #[serde(serialize_with = "serialize_hex")]
    pub payload: Vec<u8>,
    pub manufacturer_override: Option<u16>,
}

/// Why an outbound command did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("No acknowledgement within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Device answered {0}")]
    Rejected(Status),

    #[error("Session shut down")]
    Cancelled,
}

impl SendError {
    pub fn status(&self) -> Status {
        match self {
            Self::Rejected(status) => *status,
            _ => Status::Failure,
        }
    }
}

pub struct CommandSequencer {
    transport: SharedTransport,
    /// Last sequence handed out
    counter: Mutex<u16>,
    timeout: Duration,
    expect_reply: bool,
    cluster_id: u16,
    command_id: u8,
    shutdown: watch::Sender<bool>,
}

impl CommandSequencer {
    pub fn new(transport: SharedTransport, config: &BridgeConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            transport,
            counter: Mutex::new(0),
            timeout: config.send_timeout(),
            expect_reply: config.expect_reply,
            cluster_id: config.command_cluster_id,
            command_id: config.set_data_command_id,
            shutdown,
        }
    }

    /// Continue numbering after `last`; the next command gets `last + 1`.
    pub fn with_last_sequence(self, last: u16) -> Self {
        Self {
            counter: Mutex::new(last),
            ..self
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Allocate a sequence number without sending anything.
    pub async fn next_sequence(&self) -> u16 {
        advance(&mut *self.counter.lock().await)
    }

    /// Frame already-encoded datapoint records and send them.
    ///
    /// Waits for the transport at most the configured timeout. Failures are
    /// returned to the caller; nothing is retried.
    pub async fn send(
        &self,
        records: &[u8],
        manufacturer: Option<u16>,
    ) -> Result<OutgoingCommand, SendError> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(SendError::Cancelled);
        }

        let mut counter = tokio::select! {
            guard = self.counter.lock() => guard,
            _ = shutdown.changed() => return Err(SendError::Cancelled),
        };
        let sequence = advance(&mut counter);

        let command = OutgoingCommand {
            sequence,
            cluster_id: self.cluster_id,
            command_id: self.command_id,
            payload: frame_payload(sequence, 0, records),
            manufacturer_override: manufacturer,
        };
        let request = TransportRequest {
            cluster_id: command.cluster_id,
            command_id: command.command_id,
            payload: command.payload.clone(),
            manufacturer,
            sequence,
            timeout: self.timeout,
            expect_reply: self.expect_reply,
        };

        debug!(
            sequence,
            transport = self.transport.name(),
            payload = %hex::encode(&command.payload),
            "Sending datapoint command"
        );

        let outcome = tokio::select! {
            result = tokio::time::timeout(self.timeout, self.transport.send(request)) => result,
            _ = shutdown.changed() => {
                debug!(sequence, "Send abandoned on shutdown");
                return Err(SendError::Cancelled);
            }
        };
        drop(counter);

        match outcome {
            Err(_) => {
                warn!(sequence, timeout_ms = self.timeout.as_millis() as u64, "Command timed out");
                Err(SendError::Timeout(self.timeout))
            }
            Ok(Err(e)) => {
                warn!(sequence, error = %e, "Transport error");
                Err(SendError::Transport(e))
            }
            Ok(Ok(status)) if status.is_success() => Ok(command),
            Ok(Ok(status)) => {
                warn!(sequence, %status, "Device rejected command");
                Err(SendError::Rejected(status))
            }
        }
    }

    /// Abandon the in-flight send and refuse new ones.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl std::fmt::Debug for CommandSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSequencer")
            .field("transport", &self.transport.name())
            .field("timeout", &self.timeout)
            .field("expect_reply", &self.expect_reply)
            .finish()
    }
}

fn advance(counter: &mut u16) -> u16 {
    *counter = counter.wrapping_add(1);
    *counter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Ack;

    #[async_trait]
    impl Transport for Ack {
        async fn send(&self, _request: TransportRequest) -> Result<Status, TransportError> {
            Ok(Status::Success)
        }
    }

    fn sequencer() -> CommandSequencer {
        CommandSequencer::new(Arc::new(Ack), &BridgeConfig::default())
    }

    #[tokio::test]
    async fn test_sequence_starts_at_one() {
        let seq = sequencer();
        assert_eq!(seq.next_sequence().await, 1);
        assert_eq!(seq.next_sequence().await, 2);
    }

    #[tokio::test]
    async fn test_sequence_wraps() {
        let seq = sequencer().with_last_sequence(u16::MAX - 1);
        assert_eq!(seq.next_sequence().await, u16::MAX);
        assert_eq!(seq.next_sequence().await, 0);
        assert_eq!(seq.next_sequence().await, 1);
    }

    #[tokio::test]
    async fn test_send_frames_payload() {
        let seq = sequencer();
        let command = seq.send(&[0x65, 0x04, 0x00, 0x01, 0x01], Some(0x1002)).await.unwrap();

        assert_eq!(command.sequence, 1);
        assert_eq!(command.cluster_id, 0xEF00);
        assert_eq!(command.command_id, 0x00);
        assert_eq!(command.payload, vec![0x01, 0x00, 0x65, 0x04, 0x00, 0x01, 0x01]);
        assert_eq!(command.manufacturer_override, Some(0x1002));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_sends() {
        let seq = sequencer();
        seq.shutdown();
        assert!(seq.is_shut_down());
        assert_eq!(seq.send(&[], None).await, Err(SendError::Cancelled));
    }

    #[test]
    fn test_error_status() {
        assert_eq!(SendError::Timeout(Duration::from_secs(5)).status(), Status::Failure);
        assert_eq!(SendError::Cancelled.status(), Status::Failure);
        assert_eq!(
            SendError::Rejected(Status::InvalidValue).status(),
            Status::InvalidValue
        );
    }
}
