//! Built-in device families.
//!
//! Each family is declared as a JSON document and deserialized into a
//! [`FamilyDefinition`], the same shape a gateway would load from its own
//! catalog.

use serde_json::{json, Value};

use crate::attribute::{
    clusters, system_mode, thermostat_attrs, vendor_attribute_id, BATTERY_PERCENTAGE_REMAINING,
    MEASURED_VALUE, MULTISTATE_PRESENT_VALUE,
};
use crate::registry::{FamilyDefinition, FamilyRegistry, FamilyRegistryBuilder, RegistryError};

pub const TRV_V1: &str = "tuya_trv_v1";
pub const TRV_V2: &str = "tuya_trv_v2";
pub const AIR_QUALITY: &str = "tuya_co2_sensor";
pub const QUAD_SCENE_SWITCH: &str = "quad_scene_switch";
pub const BATTERY_REMOTE: &str = "battery_remote";

/// Every built-in family definition.
pub fn builtin_families() -> Result<Vec<FamilyDefinition>, RegistryError> {
    [
        trv_v1(),
        trv_v2(),
        air_quality(),
        quad_scene_switch(),
        battery_remote(),
    ]
    .into_iter()
    .map(|doc| {
        serde_json::from_value(doc).map_err(|e| RegistryError::InvalidDefinition(e.to_string()))
    })
    .collect()
}

/// Registry holding every built-in family.
pub fn builtin_registry() -> Result<FamilyRegistry, RegistryError> {
    let mut builder = FamilyRegistryBuilder::new();
    for family in builtin_families()? {
        builder.register(family)?;
    }
    Ok(builder.build())
}

fn attr(cluster: &str, attribute_id: u16, name: &str) -> Value {
    json!({"cluster": cluster, "attribute_id": attribute_id, "name": name})
}

fn thermostat(attribute_id: u16, name: &str) -> Value {
    attr(clusters::THERMOSTAT, attribute_id, name)
}

/// Writable on/off datapoint on the vendor cluster.
fn vendor_switch(dp_id: u8, name: &str) -> Value {
    json!({
        "dp_id": dp_id,
        "dp_type": "bool",
        "attribute": attr(clusters::VENDOR, vendor_attribute_id(dp_id), name),
        "decode": {"kind": "boolean"},
        "encode": {"kind": "boolean"}
    })
}

fn setpoint(dp_id: u8) -> Value {
    json!({
        "dp_id": dp_id,
        "dp_type": "value",
        "attribute": thermostat(thermostat_attrs::OCCUPIED_HEATING_SETPOINT, "occupied_heating_setpoint"),
        "decode": {"kind": "scale"},
        "encode": {"kind": "scale"},
        "metadata": {"scale": 10}
    })
}

/// Older valves: mode and setpoint only.
fn trv_v1() -> Value {
    json!({
        "name": TRV_V1,
        "description": "Thermostatic radiator valve, first datapoint layout",
        "applies_to": [{"manufacturer": "_TZE204_ogx8u5z6", "model": "TS0601"}],
        "mappings": [
            {
                "dp_id": 2,
                "dp_type": "enum",
                "attribute": thermostat(thermostat_attrs::SYSTEM_MODE, "system_mode"),
                "decode": {"kind": "enum_map"},
                "encode": {"kind": "enum_map"},
                "metadata": {"enum_table": [
                    {"raw": 0, "code": system_mode::AUTO, "name": "Auto"},
                    {"raw": 1, "code": system_mode::HEAT, "name": "Heat"},
                    {"raw": 2, "code": system_mode::OFF, "name": "Off"}
                ]}
            },
            setpoint(4)
        ],
        "manufacturer": "suppress"
    })
}

fn trv_v2() -> Value {
    let applies_to: Vec<Value> = [
        "_TZE200_c88teujp",
        "_TZE200_azqp6ssj",
        "_TZE200_yw7cahqs",
        "_TZE200_9gvruqf5",
        "_TZE200_zuhszj9s",
        "_TZE200_zr9c0day",
        "_TZE200_0dvm9mva",
        "_TZE200_h4cgnbzg",
        "_TZE200_exfrnlow",
        "_TZE200_9m4kmbfu",
        "_TZE200_3yp57tby",
    ]
    .iter()
    .map(|m| json!({"manufacturer": m, "model": "TS0601"}))
    .collect();

    json!({
        "name": TRV_V2,
        "description": "Thermostatic radiator valve with window detection and child lock",
        "applies_to": applies_to,
        "mappings": [
            {
                "dp_id": 3,
                "dp_type": "enum",
                "attribute": thermostat(thermostat_attrs::RUNNING_STATE, "running_state"),
                "decode": {"kind": "inverted_flag"}
            },
            vendor_switch(8, "window_detection"),
            vendor_switch(10, "frost_protection"),
            {
                "dp_id": 27,
                "dp_type": "value",
                "attribute": thermostat(thermostat_attrs::LOCAL_TEMPERATURE_CALIBRATION, "local_temperature_calibration"),
                "decode": {"kind": "identity"},
                "encode": {"kind": "threshold_invert"},
                "metadata": {"threshold": 6}
            },
            vendor_switch(40, "child_lock"),
            {
                "dp_id": 101,
                "dp_type": "enum",
                "attribute": thermostat(thermostat_attrs::SYSTEM_MODE, "system_mode"),
                "decode": {"kind": "enum_map"},
                "encode": {"kind": "enum_map"},
                "metadata": {"enum_table": [
                    {"raw": 1, "code": system_mode::HEAT, "name": "Heat"},
                    {"raw": 2, "code": system_mode::OFF, "name": "Off"}
                ]}
            },
            {
                "dp_id": 102,
                "dp_type": "value",
                "attribute": thermostat(thermostat_attrs::LOCAL_TEMPERATURE, "local_temperature"),
                "decode": {"kind": "scale"},
                "metadata": {"scale": 10}
            },
            setpoint(103),
            {
                "dp_id": 104,
                "dp_type": "value",
                "attribute": attr(clusters::VENDOR, vendor_attribute_id(104), "valve_position"),
                "decode": {"kind": "divide"},
                "metadata": {"scale": 10}
            },
            {
                "dp_id": 105,
                "dp_type": "bool",
                "attribute": attr(clusters::VENDOR, vendor_attribute_id(105), "battery_low"),
                "decode": {"kind": "boolean"}
            },
            vendor_switch(106, "away_mode"),
            vendor_switch(108, "schedule_enable"),
            vendor_switch(130, "scale_protection")
        ],
        "constants": [
            {
                "attribute": thermostat(thermostat_attrs::MIN_HEAT_SETPOINT_LIMIT, "min_heat_setpoint_limit"),
                "value": {"Integer": 500}
            },
            {
                "attribute": thermostat(thermostat_attrs::MAX_HEAT_SETPOINT_LIMIT, "max_heat_setpoint_limit"),
                "value": {"Integer": 3000}
            },
            {
                "attribute": thermostat(thermostat_attrs::CTRL_SEQUENCE_OF_OPER, "ctrl_sequence_of_oper"),
                "value": {"Enum": {"code": 2, "name": "Heating_Only"}}
            }
        ],
        "unsupported": [
            {"cluster": clusters::THERMOSTAT, "attribute_id": thermostat_attrs::SETPOINT_CHANGE_SOURCE},
            {"cluster": clusters::THERMOSTAT, "attribute_id": thermostat_attrs::SETPOINT_CHANGE_SOURCE_TIMESTAMP},
            {"cluster": clusters::THERMOSTAT, "attribute_id": thermostat_attrs::PI_HEATING_DEMAND}
        ],
        "manufacturer": "suppress"
    })
}

/// CO₂ sensor reporting temperature in the low half of a packed value.
fn air_quality() -> Value {
    json!({
        "name": AIR_QUALITY,
        "description": "CO2 sensor with temperature and humidity",
        "applies_to": [
            {"manufacturer": "_TZE200_3ejwxpmu", "model": "TS0601"},
            {"manufacturer": "_TZE200_ogkdpgy2", "model": "TS0601"},
            {"manufacturer": "_TZE204_ogkdpgy2", "model": "TS0601"}
        ],
        "mappings": [
            {
                "dp_id": 2,
                "dp_type": "value",
                "attribute": attr(clusters::CARBON_DIOXIDE, MEASURED_VALUE, "measured_value"),
                "decode": {"kind": "divide"},
                "metadata": {"scale": 1_000_000}
            },
            {
                "dp_id": 18,
                "dp_type": "value",
                "attribute": attr(clusters::TEMPERATURE_MEASUREMENT, MEASURED_VALUE, "measured_value"),
                "decode": {"kind": "int16_field", "index": 1},
                "metadata": {"scale": 10}
            },
            {
                "dp_id": 19,
                "dp_type": "value",
                "attribute": attr(clusters::RELATIVE_HUMIDITY, MEASURED_VALUE, "measured_value"),
                "decode": {"kind": "scale"},
                "metadata": {"scale": 10}
            }
        ]
    })
}

/// Four-button scene switch; presses are momentary events only.
fn quad_scene_switch() -> Value {
    json!({
        "name": QUAD_SCENE_SWITCH,
        "description": "Four-button scene switch",
        "applies_to": [{"manufacturer": "smarthjemmet.dk", "model": "QUAD-ZIG-SW"}],
        "mappings": [
            {
                "dp_id": 1,
                "dp_type": "enum",
                "attribute": attr(clusters::MULTISTATE_INPUT, MULTISTATE_PRESENT_VALUE, "present_value"),
                "decode": {"kind": "identity"},
                "events": {
                    "codes": {"0": "release", "1": "single", "2": "double", "3": "triple", "4": "hold"},
                    "persist": true
                }
            }
        ]
    })
}

/// Remote reporting battery voltage in tenths of a volt.
fn battery_remote() -> Value {
    json!({
        "name": BATTERY_REMOTE,
        "description": "Battery remote with voltage based battery level",
        "applies_to": [{"manufacturer": "Legrand", "model": "Remote dimmer switch"}],
        "mappings": [
            {
                "dp_id": 4,
                "dp_type": "value",
                "attribute": attr(clusters::POWER_CONFIGURATION, BATTERY_PERCENTAGE_REMAINING, "battery_percentage_remaining"),
                "decode": {"kind": "linear_range", "raw_min": 250, "raw_max": 300, "host_min": 0, "host_max": 200},
                "metadata": {"bounds": {"min": 0.0, "max": 200.0}}
            }
        ]
    })
}
