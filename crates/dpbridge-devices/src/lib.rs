//! Datapoint bridge device layer.
//!
//! Vendor MCUs tunnel typed datapoints through a single manufacturer command.
//! This crate turns those frames into standard cluster attributes and turns
//! attribute writes back into frames:
//!
//! - [`datapoint`]: the wire codec
//! - [`convert`] and [`mapping`]: named converters and the compiled per-family table
//! - [`registry`] and [`builtin_families`]: family definitions and their lookup
//! - [`mcu`]: the per-endpoint dispatcher
//! - [`sequencer`] and [`transport`]: outbound sequencing over an injected transport

pub mod attribute;
pub mod builtin_families;
pub mod cluster;
pub mod convert;
pub mod datapoint;
pub mod mapping;
pub mod mcu;
pub mod registry;
pub mod sequencer;
pub mod status;
pub mod transport;

pub use attribute::{AttributeKey, AttributeRef, AttributeValue};
pub use builtin_families::{builtin_families, builtin_registry};
pub use cluster::{AttributeRead, ClusterState};
pub use convert::{
    Bounds, ConversionError, ConverterMetadata, DecodeConverter, EncodeConverter, EnumTable,
};
pub use datapoint::{
    DatapointRecord, DatapointType, DatapointValue, DecodeError, EncodeError, McuFrame,
};
pub use mapping::{EventTable, MappingEntry, MappingError, MappingTable};
pub use mcu::{DispatchReport, McuDispatcher, OutgoingError};
pub use registry::{
    DeviceFamily, DeviceSignature, FamilyDefinition, FamilyRegistry, FamilyRegistryBuilder,
    ManufacturerPolicy, RegistryError,
};
pub use sequencer::{CommandSequencer, OutgoingCommand, SendError};
pub use status::Status;
pub use transport::{SharedTransport, Transport, TransportError, TransportRequest};
