//! Datapoint ↔ attribute mapping table.
//!
//! A [`MappingTable`] is compiled once per device family from a list of
//! [`MappingEntry`] values and then shared read-only by every dispatcher of
//! that family. Compilation validates everything up front so lookups never
//! fail for structural reasons.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::attribute::{AttributeKey, AttributeRef, AttributeValue};
use crate::convert::{
    Bounds, ConversionResult, ConverterMetadata, DecodeConverter, EncodeConverter, EnumTable,
};
use crate::datapoint::{DatapointType, DatapointValue};

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors raised while compiling a mapping table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// Two entries claim the same datapoint id
    #[error("Datapoint {0} is mapped more than once")]
    DuplicateDatapoint(u8),

    /// Two writable entries target the same attribute
    #[error("Attribute {attribute} is written by datapoints {first} and {second}")]
    DuplicateAttribute {
        attribute: AttributeKey,
        first: u8,
        second: u8,
    },

    /// An entry's converters or parameters are inconsistent
    #[error("Invalid mapping for datapoint {dp_id}: {reason}")]
    InvalidEntry { dp_id: u8, reason: String },
}

/// Momentary codes carried by a datapoint.
///
/// Recognized codes fire a named device event. With `persist` the converted
/// value is also written to the attribute; unknown codes do neither.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventTable {
    pub codes: BTreeMap<i64, String>,
    #[serde(default)]
    pub persist: bool,
}

impl EventTable {
    pub fn name_for(&self, code: i64) -> Option<&str> {
        self.codes.get(&code).map(String::as_str)
    }
}

/// How one datapoint maps onto one standard attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub dp_id: u8,
    pub dp_type: DatapointType,
    pub attribute: AttributeRef,
    #[serde(default)]
    pub decode: DecodeConverter,
    /// Absent for read-only datapoints
    #[serde(default)]
    pub encode: Option<EncodeConverter>,
    #[serde(default)]
    pub metadata: ConverterMetadata,
    #[serde(default)]
    pub events: Option<EventTable>,
}

impl MappingEntry {
    /// A read-only entry decoded as-is.
    pub fn new(dp_id: u8, dp_type: DatapointType, attribute: AttributeRef) -> Self {
        Self {
            dp_id,
            dp_type,
            attribute,
            decode: DecodeConverter::Identity,
            encode: None,
            metadata: ConverterMetadata::default(),
            events: None,
        }
    }

    pub fn with_decode(mut self, decode: DecodeConverter) -> Self {
        self.decode = decode;
        self
    }

    pub fn with_encode(mut self, encode: EncodeConverter) -> Self {
        self.encode = Some(encode);
        self
    }

    pub fn with_scale(mut self, scale: i64) -> Self {
        self.metadata.scale = Some(scale);
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.metadata.bounds = Some(Bounds::new(min, max));
        self
    }

    pub fn with_enum_table(mut self, table: EnumTable) -> Self {
        self.metadata.enum_table = Some(table);
        self
    }

    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.metadata.threshold = Some(threshold);
        self
    }

    pub fn with_events(mut self, events: EventTable) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_writable(&self) -> bool {
        self.encode.is_some()
    }

    pub fn key(&self) -> AttributeKey {
        self.attribute.key()
    }

    /// Datapoint value → attribute value, then bounds.
    pub fn decode_value(&self, value: &DatapointValue) -> ConversionResult<AttributeValue> {
        let host = self.decode.apply(&self.metadata, value)?;
        self.check_bounds(&host)?;
        Ok(host)
    }

    /// Bounds, then attribute value → datapoint value.
    ///
    /// Returns `None` for read-only entries.
    pub fn encode_value(&self, value: &AttributeValue) -> Option<ConversionResult<DatapointValue>> {
        let encode = self.encode.as_ref()?;
        Some(
            self.check_bounds(value)
                .and_then(|()| encode.apply(&self.metadata, self.dp_type, value)),
        )
    }

    fn check_bounds(&self, value: &AttributeValue) -> ConversionResult<()> {
        match &self.metadata.bounds {
            Some(bounds) => bounds.check(value),
            None => Ok(()),
        }
    }

    fn validate(&self) -> MappingResult<()> {
        let invalid = |reason: String| MappingError::InvalidEntry {
            dp_id: self.dp_id,
            reason,
        };

        self.decode.validate(&self.metadata).map_err(invalid)?;
        if let Some(encode) = &self.encode {
            encode
                .validate(&self.metadata, self.dp_type)
                .map_err(invalid)?;
        }
        if let Some(bounds) = &self.metadata.bounds {
            if bounds.min > bounds.max {
                return Err(invalid(format!(
                    "bounds min {} exceeds max {}",
                    bounds.min, bounds.max
                )));
            }
        }
        if let Some(events) = &self.events {
            if events.codes.is_empty() {
                return Err(invalid("event table has no codes".to_string()));
            }
        }
        Ok(())
    }
}

/// Immutable, validated set of mapping entries.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: Vec<MappingEntry>,
    by_dp: HashMap<u8, usize>,
    by_attribute: HashMap<AttributeKey, usize>,
}

impl MappingTable {
    /// Validate and index entries.
    ///
    /// Fails if a datapoint id appears twice, if two writable entries target
    /// the same attribute, or if any entry's converters are misconfigured.
    pub fn build(entries: Vec<MappingEntry>) -> MappingResult<Self> {
        let mut by_dp = HashMap::with_capacity(entries.len());
        let mut by_attribute = HashMap::new();

        for (index, entry) in entries.iter().enumerate() {
            entry.validate()?;

            if by_dp.insert(entry.dp_id, index).is_some() {
                return Err(MappingError::DuplicateDatapoint(entry.dp_id));
            }

            if entry.is_writable() {
                if let Some(previous) = by_attribute.insert(entry.key(), index) {
                    let first: &MappingEntry = &entries[previous];
                    return Err(MappingError::DuplicateAttribute {
                        attribute: entry.key(),
                        first: first.dp_id,
                        second: entry.dp_id,
                    });
                }
            }
        }

        Ok(Self {
            entries,
            by_dp,
            by_attribute,
        })
    }

    /// Entry for an inbound datapoint.
    pub fn resolve_inbound(&self, dp_id: u8) -> Option<&MappingEntry> {
        self.by_dp.get(&dp_id).map(|&i| &self.entries[i])
    }

    /// Writable entry for an outbound attribute.
    pub fn resolve_outbound(&self, key: &AttributeKey) -> Option<&MappingEntry> {
        self.by_attribute.get(key).map(|&i| &self.entries[i])
    }

    /// Any entry reporting into the attribute, writable or not.
    pub fn resolve_attribute(&self, key: &AttributeKey) -> Option<&MappingEntry> {
        self.resolve_outbound(key)
            .or_else(|| self.entries.iter().find(|e| &e.key() == key))
    }

    /// Look an attribute up by cluster and attribute name.
    pub fn find_by_name(&self, cluster: &str, name: &str) -> Option<&MappingEntry> {
        self.entries
            .iter()
            .find(|e| e.attribute.cluster == cluster && e.attribute.name == name)
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{clusters, thermostat_attrs};

    fn setpoint(dp_id: u8) -> MappingEntry {
        MappingEntry::new(
            dp_id,
            DatapointType::Value,
            AttributeRef::new(
                clusters::THERMOSTAT,
                thermostat_attrs::OCCUPIED_HEATING_SETPOINT,
                "occupied_heating_setpoint",
            ),
        )
        .with_decode(DecodeConverter::Scale)
        .with_encode(EncodeConverter::Scale)
        .with_scale(10)
    }

    fn local_temperature(dp_id: u8) -> MappingEntry {
        MappingEntry::new(
            dp_id,
            DatapointType::Value,
            AttributeRef::new(
                clusters::THERMOSTAT,
                thermostat_attrs::LOCAL_TEMPERATURE,
                "local_temperature",
            ),
        )
        .with_decode(DecodeConverter::Scale)
        .with_scale(10)
    }

    #[test]
    fn test_build_and_resolve() {
        let table = MappingTable::build(vec![setpoint(103), local_temperature(102)]).unwrap();
        assert_eq!(table.len(), 2);

        assert_eq!(table.resolve_inbound(103).unwrap().dp_id, 103);
        assert!(table.resolve_inbound(1).is_none());

        let key = AttributeKey::new(clusters::THERMOSTAT, thermostat_attrs::OCCUPIED_HEATING_SETPOINT);
        assert_eq!(table.resolve_outbound(&key).unwrap().dp_id, 103);

        // Read-only entries are not outbound targets
        let temp = AttributeKey::new(clusters::THERMOSTAT, thermostat_attrs::LOCAL_TEMPERATURE);
        assert!(table.resolve_outbound(&temp).is_none());
        assert_eq!(table.resolve_attribute(&temp).unwrap().dp_id, 102);

        assert_eq!(
            table
                .find_by_name(clusters::THERMOSTAT, "local_temperature")
                .unwrap()
                .dp_id,
            102
        );
    }

    #[test]
    fn test_duplicate_datapoint_rejected() {
        let err = MappingTable::build(vec![setpoint(4), local_temperature(4)]).unwrap_err();
        assert_eq!(err, MappingError::DuplicateDatapoint(4));
    }

    #[test]
    fn test_duplicate_outbound_attribute_rejected() {
        let err = MappingTable::build(vec![setpoint(4), setpoint(103)]).unwrap_err();
        assert!(matches!(
            err,
            MappingError::DuplicateAttribute {
                first: 4,
                second: 103,
                ..
            }
        ));
    }

    #[test]
    fn test_two_readers_of_one_attribute_allowed() {
        let table = MappingTable::build(vec![local_temperature(24), local_temperature(102)]);
        assert!(table.is_ok());
    }

    #[test]
    fn test_invalid_converter_parameters_rejected() {
        let missing_scale = MappingEntry::new(
            1,
            DatapointType::Value,
            AttributeRef::new(clusters::THERMOSTAT, 0, "local_temperature"),
        )
        .with_decode(DecodeConverter::Scale);
        assert!(matches!(
            MappingTable::build(vec![missing_scale]),
            Err(MappingError::InvalidEntry { dp_id: 1, .. })
        ));

        let bad_table = MappingEntry::new(
            2,
            DatapointType::Enum,
            AttributeRef::new(clusters::THERMOSTAT, thermostat_attrs::SYSTEM_MODE, "system_mode"),
        )
        .with_decode(DecodeConverter::EnumMap)
        .with_enum_table(EnumTable::new().with(1, 4, "Heat").with(1, 0, "Off"));
        assert!(MappingTable::build(vec![bad_table]).is_err());

        let string_scale = MappingEntry::new(
            3,
            DatapointType::String,
            AttributeRef::new(clusters::VENDOR, 0xEF03, "label"),
        )
        .with_encode(EncodeConverter::Scale)
        .with_scale(10);
        assert!(MappingTable::build(vec![string_scale]).is_err());
    }

    #[test]
    fn test_bounds_apply_both_ways() {
        let entry = setpoint(103).with_bounds(500.0, 3000.0);

        assert!(entry.decode_value(&DatapointValue::Value(250)).is_ok());
        assert!(entry.decode_value(&DatapointValue::Value(301)).is_err());

        assert!(entry
            .encode_value(&AttributeValue::Integer(2500))
            .unwrap()
            .is_ok());
        assert!(entry
            .encode_value(&AttributeValue::Integer(100))
            .unwrap()
            .is_err());
    }

    #[test]
    fn test_read_only_entry_has_no_encoding() {
        let entry = local_temperature(102);
        assert!(!entry.is_writable());
        assert!(entry.encode_value(&AttributeValue::Integer(1)).is_none());
    }

    #[test]
    fn test_entry_from_json() {
        let entry: MappingEntry = serde_json::from_value(serde_json::json!({
            "dp_id": 101,
            "dp_type": "enum",
            "attribute": {"cluster": "thermostat", "attribute_id": 28, "name": "system_mode"},
            "decode": {"kind": "enum_map"},
            "encode": {"kind": "enum_map"},
            "metadata": {"enum_table": [
                {"raw": 1, "code": 4, "name": "Heat"},
                {"raw": 2, "code": 0, "name": "Off"}
            ]}
        }))
        .unwrap();

        let table = MappingTable::build(vec![entry]).unwrap();
        let entry = table.resolve_inbound(101).unwrap();
        assert_eq!(
            entry.decode_value(&DatapointValue::Enum(1)).unwrap(),
            AttributeValue::enumeration(4, "Heat")
        );
    }
}
