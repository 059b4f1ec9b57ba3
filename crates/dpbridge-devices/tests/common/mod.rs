//! Shared fixtures for device integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dpbridge_core::{BridgeConfig, EventBus, EventBusReceiver};
use dpbridge_devices::{
    builtin_registry, CommandSequencer, McuDispatcher, Status, Transport, TransportError,
    TransportRequest,
};

/// Transport double that records every request.
pub struct RecordingTransport {
    requests: Mutex<Vec<TransportRequest>>,
    outcome: Result<Status, TransportError>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingTransport {
    /// Acknowledges everything immediately.
    pub fn ack() -> Self {
        Self::answering(Ok(Status::Success))
    }

    pub fn answering(outcome: Result<Status, TransportError>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            outcome,
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fails every send with an I/O error.
    pub fn failing() -> Self {
        Self::answering(Err(TransportError::Io("radio offline".to_string())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last(&self) -> Option<TransportRequest> {
        self.requests.lock().last().cloned()
    }

    /// Highest number of sends observed in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: TransportRequest) -> Result<Status, TransportError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.requests.lock().push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.outcome.clone()
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// A dispatcher for one built-in family, wired to a transport double.
pub struct Session {
    pub dispatcher: McuDispatcher,
    pub transport: Arc<RecordingTransport>,
    pub events: EventBusReceiver,
}

pub fn session(family: &str) -> Session {
    session_with(family, RecordingTransport::ack(), BridgeConfig::default())
}

pub fn session_with(family: &str, transport: RecordingTransport, config: BridgeConfig) -> Session {
    let registry = builtin_registry().unwrap();
    let family = registry.get(family).unwrap();
    let transport = Arc::new(transport);
    let sequencer = Arc::new(CommandSequencer::new(transport.clone(), &config));
    let bus = Arc::new(EventBus::with_capacity(config.event_channel_capacity));
    let events = bus.subscribe();

    Session {
        dispatcher: McuDispatcher::new("test-device", 1, family, sequencer, bus),
        transport,
        events,
    }
}

/// Frame with sequence 0x01, status 0x00 and the given records.
pub fn frame<R: AsRef<[u8]>>(records: &[R]) -> Vec<u8> {
    let mut out = vec![0x01, 0x00];
    for record in records {
        out.extend_from_slice(record.as_ref());
    }
    out
}

pub fn value_record(dp_id: u8, value: i32) -> Vec<u8> {
    let mut out = vec![dp_id, 0x02, 0x00, 0x04];
    out.extend_from_slice(&value.to_be_bytes());
    out
}

pub fn enum_record(dp_id: u8, value: u8) -> Vec<u8> {
    vec![dp_id, 0x04, 0x00, 0x01, value]
}

pub fn bool_record(dp_id: u8, value: bool) -> Vec<u8> {
    vec![dp_id, 0x01, 0x00, 0x01, u8::from(value)]
}
