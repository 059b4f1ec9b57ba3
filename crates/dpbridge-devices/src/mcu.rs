//! MCU dispatcher.
//!
//! One [`McuDispatcher`] serves one endpoint of one device. Inbound frames are
//! decoded, routed through the family's mapping table into the endpoint's
//! [`ClusterState`], and announced on the event bus. Outbound attribute writes
//! take the reverse path and leave through the session's [`CommandSequencer`].
//!
//! Inbound handling is synchronous. A frame that fails to decode changes
//! nothing; after that, each record stands on its own: unknown datapoints are
//! skipped and a record whose converter fails is dropped without affecting
//! the others.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use dpbridge_core::{BridgeEvent, SharedEventBus};

use crate::attribute::{AttributeKey, AttributeValue};
use crate::cluster::{AttributeRead, ClusterState};
use crate::convert::ConversionError;
use crate::datapoint::{self, DatapointRecord, EncodeError, McuFrame};
use crate::mapping::MappingEntry;
use crate::registry::DeviceFamily;
use crate::sequencer::{CommandSequencer, OutgoingCommand, SendError};
use crate::status::Status;

const EVENT_SOURCE: &str = "mcu";

/// Why an attribute write was not sent, or did not complete.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OutgoingError {
    #[error("Attribute {0} is not supported by this device")]
    Unsupported(AttributeKey),

    #[error("Attribute {0} is fixed by the device family")]
    ReadOnly(AttributeKey),

    #[error("Attribute {0} has no writable datapoint")]
    Unmapped(AttributeKey),

    #[error("Invalid value for {key}: {source}")]
    Conversion {
        key: AttributeKey,
        #[source]
        source: ConversionError,
    },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Send(#[from] SendError),
}

impl OutgoingError {
    /// Status reported to the gateway for this failure.
    pub fn status(&self) -> Status {
        match self {
            Self::Unsupported(_) | Self::Unmapped(_) => Status::UnsupportedAttribute,
            Self::ReadOnly(_) => Status::ReadOnly,
            Self::Conversion { .. } | Self::Encode(_) => Status::InvalidValue,
            Self::Send(e) => e.status(),
        }
    }
}

/// Outcome of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub status: Status,
    /// Frame sequence byte, when the frame decoded
    pub sequence: Option<u8>,
    /// Attribute values written to the cache
    pub applied: usize,
    /// Momentary events fired
    pub events: usize,
    /// Records with no mapping or an unrecognized momentary code
    pub skipped: usize,
    /// Records whose conversion failed
    pub failed: usize,
}

impl DispatchReport {
    fn rejected() -> Self {
        Self {
            status: Status::Failure,
            sequence: None,
            applied: 0,
            events: 0,
            skipped: 0,
            failed: 0,
        }
    }
}

pub struct McuDispatcher {
    device_id: String,
    endpoint: u8,
    family: Arc<DeviceFamily>,
    state: Mutex<ClusterState>,
    sequencer: Arc<CommandSequencer>,
    events: SharedEventBus,
}

impl McuDispatcher {
    pub fn new(
        device_id: impl Into<String>,
        endpoint: u8,
        family: Arc<DeviceFamily>,
        sequencer: Arc<CommandSequencer>,
        events: SharedEventBus,
    ) -> Self {
        let state = ClusterState::for_family(endpoint, &family);
        Self {
            device_id: device_id.into(),
            endpoint,
            family,
            state: Mutex::new(state),
            sequencer,
            events,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    pub fn family(&self) -> &Arc<DeviceFamily> {
        &self.family
    }

    pub fn sequencer(&self) -> &Arc<CommandSequencer> {
        &self.sequencer
    }

    /// Process one inbound frame.
    pub fn handle_incoming(&self, raw: &[u8]) -> Status {
        self.handle_incoming_report(raw).status
    }

    /// Process one inbound frame and report what happened to each record.
    pub fn handle_incoming_report(&self, raw: &[u8]) -> DispatchReport {
        let frame = match McuFrame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    device_id = %self.device_id,
                    error = %e,
                    frame = %hex::encode(raw),
                    "Rejected datapoint frame"
                );
                return DispatchReport::rejected();
            }
        };

        let mut report = DispatchReport {
            status: Status::Success,
            sequence: Some(frame.sequence),
            ..DispatchReport::rejected()
        };
        let timestamp = chrono::Utc::now().timestamp();
        let mut outbox = Vec::new();

        {
            let mut state = self.state.lock();
            for record in &frame.records {
                let Some(entry) = self.family.table.resolve_inbound(record.id) else {
                    debug!(
                        device_id = %self.device_id,
                        dp_id = record.id,
                        dp_type = %record.dp_type,
                        "Ignoring unmapped datapoint"
                    );
                    report.skipped += 1;
                    continue;
                };

                if let Some(events) = &entry.events {
                    match self.momentary_event(entry, record, timestamp) {
                        Some(event) => {
                            report.events += 1;
                            outbox.push(event);
                            if !events.persist {
                                continue;
                            }
                        }
                        None => {
                            debug!(
                                device_id = %self.device_id,
                                dp_id = record.id,
                                "Unrecognized momentary code"
                            );
                            report.skipped += 1;
                            continue;
                        }
                    }
                }

                let value = match entry.decode_value(&record.value) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(
                            device_id = %self.device_id,
                            dp_id = record.id,
                            error = %e,
                            "Dropping datapoint"
                        );
                        report.failed += 1;
                        outbox.push(BridgeEvent::ConversionFailed {
                            device_id: self.device_id.clone(),
                            endpoint: self.endpoint,
                            dp_id: record.id,
                            reason: e.to_string(),
                            timestamp,
                        });
                        continue;
                    }
                };

                state.update(entry.key(), value.clone());
                report.applied += 1;
                outbox.push(BridgeEvent::AttributeUpdated {
                    device_id: self.device_id.clone(),
                    endpoint: self.endpoint,
                    cluster: entry.attribute.cluster.clone(),
                    attribute_id: entry.attribute.attribute_id,
                    attribute: entry.attribute.name.clone(),
                    value,
                    timestamp,
                });
            }
        }

        for event in outbox {
            self.events.publish_with_source(event, EVENT_SOURCE);
        }
        report
    }

    fn momentary_event(
        &self,
        entry: &MappingEntry,
        record: &DatapointRecord,
        timestamp: i64,
    ) -> Option<BridgeEvent> {
        let code = record.value.as_i64()?;
        let name = entry.events.as_ref()?.name_for(code)?;
        Some(BridgeEvent::DeviceEvent {
            device_id: self.device_id.clone(),
            endpoint: self.endpoint,
            name: name.to_string(),
            code,
            args: serde_json::json!({ "value": code, "dp_id": record.id }),
            timestamp,
        })
    }

    /// Encode an attribute write into datapoint records without sending it.
    pub fn encode_write(
        &self,
        key: &AttributeKey,
        value: &AttributeValue,
    ) -> Result<Vec<u8>, OutgoingError> {
        {
            let state = self.state.lock();
            if state.is_unsupported(key) {
                return Err(OutgoingError::Unsupported(key.clone()));
            }
            if state.is_constant(key) {
                return Err(OutgoingError::ReadOnly(key.clone()));
            }
        }

        let entry = self
            .family
            .table
            .resolve_outbound(key)
            .ok_or_else(|| OutgoingError::Unmapped(key.clone()))?;
        let dp_value = entry
            .encode_value(value)
            .ok_or_else(|| OutgoingError::Unmapped(key.clone()))?
            .map_err(|source| OutgoingError::Conversion {
                key: key.clone(),
                source,
            })?;

        Ok(datapoint::encode(entry.dp_id, entry.dp_type, &dp_value)?)
    }

    /// Write one attribute to the device.
    ///
    /// Suspends until the transport acknowledges. The cache is not touched;
    /// the device reports the new value on its own.
    pub async fn handle_outgoing(
        &self,
        key: &AttributeKey,
        value: &AttributeValue,
        manufacturer: Option<u16>,
    ) -> Result<OutgoingCommand, OutgoingError> {
        let records = self.encode_write(key, value).map_err(|e| {
            debug!(device_id = %self.device_id, attribute = %key, error = %e, "Write rejected");
            e
        })?;
        let manufacturer = self.family.manufacturer.resolve(manufacturer);
        let timestamp = chrono::Utc::now().timestamp();

        match self.sequencer.send(&records, manufacturer).await {
            Ok(command) => {
                self.events.publish_with_source(
                    BridgeEvent::CommandSent {
                        device_id: self.device_id.clone(),
                        endpoint: self.endpoint,
                        sequence: command.sequence,
                        timestamp,
                    },
                    EVENT_SOURCE,
                );
                Ok(command)
            }
            Err(e) => {
                self.events.publish_with_source(
                    BridgeEvent::CommandFailed {
                        device_id: self.device_id.clone(),
                        endpoint: self.endpoint,
                        reason: e.to_string(),
                        timestamp,
                    },
                    EVENT_SOURCE,
                );
                Err(e.into())
            }
        }
    }

    /// Write several attributes, one command each, in request order.
    pub async fn write_attributes(
        &self,
        writes: &[(AttributeKey, AttributeValue)],
        manufacturer: Option<u16>,
    ) -> Vec<Status> {
        let mut statuses = Vec::with_capacity(writes.len());
        for (key, value) in writes {
            let status = match self.handle_outgoing(key, value, manufacturer).await {
                Ok(_) => Status::Success,
                Err(e) => e.status(),
            };
            statuses.push(status);
        }
        statuses
    }

    /// Cached, constant or missing value of an attribute.
    ///
    /// Attributes the family neither maps nor declares read as unsupported.
    pub fn read_attribute(&self, key: &AttributeKey) -> AttributeRead {
        let read = self.state.lock().read(key);
        match read {
            AttributeRead::NeverReported if self.family.table.resolve_attribute(key).is_none() => {
                AttributeRead::Unsupported
            }
            other => other,
        }
    }

    pub fn read_attributes(&self, keys: &[AttributeKey]) -> Vec<(AttributeKey, AttributeRead)> {
        keys.iter()
            .map(|key| (key.clone(), self.read_attribute(key)))
            .collect()
    }

    /// Snapshot of every reported value.
    pub fn reported_values(&self) -> Vec<(AttributeKey, AttributeValue)> {
        self.state
            .lock()
            .reported()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Tear the session down; in-flight writes are abandoned.
    pub fn shutdown(&self) {
        self.sequencer.shutdown();
    }
}

impl std::fmt::Debug for McuDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McuDispatcher")
            .field("device_id", &self.device_id)
            .field("endpoint", &self.endpoint)
            .field("family", &self.family.name)
            .finish()
    }
}
