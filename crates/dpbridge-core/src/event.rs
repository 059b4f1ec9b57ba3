//! Bridge events.
//!
//! Everything a listener can observe about a device session is published as a
//! [`BridgeEvent`]: attribute updates, momentary device events, per-record
//! conversion failures and the outcome of outbound commands.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::AttributeValue;

/// Event published by a device session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    /// A standard attribute received a new value
    AttributeUpdated {
        device_id: String,
        endpoint: u8,
        cluster: String,
        attribute_id: u16,
        attribute: String,
        value: AttributeValue,
        timestamp: i64,
    },

    /// A momentary code (button press, scene trigger) was recognized
    DeviceEvent {
        device_id: String,
        endpoint: u8,
        name: String,
        code: i64,
        args: serde_json::Value,
        timestamp: i64,
    },

    /// A datapoint was dropped because its converter rejected the value
    ConversionFailed {
        device_id: String,
        endpoint: u8,
        dp_id: u8,
        reason: String,
        timestamp: i64,
    },

    /// An outbound command was acknowledged by the transport
    CommandSent {
        device_id: String,
        endpoint: u8,
        sequence: u16,
        timestamp: i64,
    },

    /// An outbound command did not complete
    CommandFailed {
        device_id: String,
        endpoint: u8,
        reason: String,
        timestamp: i64,
    },
}

impl BridgeEvent {
    /// Name of the event variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AttributeUpdated { .. } => "AttributeUpdated",
            Self::DeviceEvent { .. } => "DeviceEvent",
            Self::ConversionFailed { .. } => "ConversionFailed",
            Self::CommandSent { .. } => "CommandSent",
            Self::CommandFailed { .. } => "CommandFailed",
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            Self::AttributeUpdated { device_id, .. }
            | Self::DeviceEvent { device_id, .. }
            | Self::ConversionFailed { device_id, .. }
            | Self::CommandSent { device_id, .. }
            | Self::CommandFailed { device_id, .. } => device_id,
        }
    }

    pub fn endpoint(&self) -> u8 {
        match self {
            Self::AttributeUpdated { endpoint, .. }
            | Self::DeviceEvent { endpoint, .. }
            | Self::ConversionFailed { endpoint, .. }
            | Self::CommandSent { endpoint, .. }
            | Self::CommandFailed { endpoint, .. } => *endpoint,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::AttributeUpdated { timestamp, .. }
            | Self::DeviceEvent { timestamp, .. }
            | Self::ConversionFailed { timestamp, .. }
            | Self::CommandSent { timestamp, .. }
            | Self::CommandFailed { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_attribute_update(&self) -> bool {
        matches!(self, Self::AttributeUpdated { .. })
    }

    pub fn is_device_event(&self) -> bool {
        matches!(self, Self::DeviceEvent { .. })
    }

    pub fn is_command_event(&self) -> bool {
        matches!(self, Self::CommandSent { .. } | Self::CommandFailed { .. })
    }
}

/// Metadata attached to every published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    /// Component that published the event
    pub source: String,
    /// Publication time in milliseconds since the Unix epoch
    pub published_at: i64,
}

impl EventMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            source: source.into(),
            published_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
