//! Core types for the datapoint bridge.
//!
//! This crate holds what the device layer and the command-line tool share:
//! attribute values, bridge events, the event bus that carries them to
//! listeners, and runtime configuration.

pub mod config;
pub mod event;
pub mod eventbus;
pub mod value;

pub use config::{BridgeConfig, ConfigError};
pub use event::{BridgeEvent, EventMetadata};
pub use eventbus::{
    DEFAULT_CHANNEL_CAPACITY, EventBus, EventBusReceiver, FilterBuilder, FilteredReceiver,
    SharedEventBus,
};
pub use value::AttributeValue;

