//! Standard attribute addressing.
//!
//! Attributes are addressed by cluster name plus attribute id. The constants
//! below cover the clusters the built-in families map onto.

use serde::{Deserialize, Serialize};

pub use dpbridge_core::AttributeValue;

/// Lookup key of a standard attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeKey {
    pub cluster: String,
    pub attribute_id: u16,
}

impl AttributeKey {
    pub fn new(cluster: impl Into<String>, attribute_id: u16) -> Self {
        Self {
            cluster: cluster.into(),
            attribute_id,
        }
    }
}

impl std::fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/0x{:04x}", self.cluster, self.attribute_id)
    }
}

/// A standard attribute with its human-readable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeRef {
    pub cluster: String,
    pub attribute_id: u16,
    pub name: String,
}

impl AttributeRef {
    pub fn new(cluster: impl Into<String>, attribute_id: u16, name: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            attribute_id,
            name: name.into(),
        }
    }

    pub fn key(&self) -> AttributeKey {
        AttributeKey::new(self.cluster.clone(), self.attribute_id)
    }
}

/// Cluster ids and names.
pub mod clusters {
    pub const POWER_CONFIGURATION: &str = "power_configuration";
    pub const MULTISTATE_INPUT: &str = "multistate_input";
    pub const THERMOSTAT: &str = "thermostat";
    pub const TEMPERATURE_MEASUREMENT: &str = "temperature_measurement";
    pub const RELATIVE_HUMIDITY: &str = "relative_humidity";
    pub const CARBON_DIOXIDE: &str = "carbon_dioxide_concentration";
    /// Vendor cluster; datapoints without a standard home land here
    pub const VENDOR: &str = "tuya_manufacturer";

    pub mod id {
        pub const POWER_CONFIGURATION: u16 = 0x0001;
        pub const MULTISTATE_INPUT: u16 = 0x0012;
        pub const THERMOSTAT: u16 = 0x0201;
        pub const TEMPERATURE_MEASUREMENT: u16 = 0x0402;
        pub const RELATIVE_HUMIDITY: u16 = 0x0405;
        pub const CARBON_DIOXIDE: u16 = 0x040D;
        pub const VENDOR: u16 = 0xEF00;
    }
}

/// Thermostat cluster attributes.
pub mod thermostat_attrs {
    pub const LOCAL_TEMPERATURE: u16 = 0x0000;
    pub const PI_HEATING_DEMAND: u16 = 0x0008;
    pub const LOCAL_TEMPERATURE_CALIBRATION: u16 = 0x0010;
    pub const OCCUPIED_HEATING_SETPOINT: u16 = 0x0012;
    pub const MIN_HEAT_SETPOINT_LIMIT: u16 = 0x0015;
    pub const MAX_HEAT_SETPOINT_LIMIT: u16 = 0x0016;
    pub const CTRL_SEQUENCE_OF_OPER: u16 = 0x001B;
    pub const SYSTEM_MODE: u16 = 0x001C;
    pub const RUNNING_STATE: u16 = 0x0029;
    pub const SETPOINT_CHANGE_SOURCE: u16 = 0x0030;
    pub const SETPOINT_CHANGE_SOURCE_TIMESTAMP: u16 = 0x0032;
}

/// Thermostat system modes.
pub mod system_mode {
    pub const OFF: i64 = 0x00;
    pub const AUTO: i64 = 0x01;
    pub const HEAT: i64 = 0x04;
}

/// Measured value attribute shared by the measurement clusters.
pub const MEASURED_VALUE: u16 = 0x0000;

pub const MULTISTATE_PRESENT_VALUE: u16 = 0x0055;
pub const BATTERY_PERCENTAGE_REMAINING: u16 = 0x0021;

/// Attribute id used on the vendor cluster for a datapoint with no standard home.
pub fn vendor_attribute_id(dp_id: u8) -> u16 {
    clusters::id::VENDOR + u16::from(dp_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = AttributeKey::new(clusters::THERMOSTAT, thermostat_attrs::SYSTEM_MODE);
        assert_eq!(key.to_string(), "thermostat/0x001c");
    }

    #[test]
    fn test_vendor_attribute_id() {
        assert_eq!(vendor_attribute_id(8), 0xEF08);
        assert_eq!(vendor_attribute_id(130), 0xEF82);
    }
}
