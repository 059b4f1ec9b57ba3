//! Datapoint converters.
//!
//! Every mapping entry names one decode converter (datapoint → attribute)
//! and optionally one encode converter (attribute → datapoint). Converters
//! are plain enum variants applied by pure functions; their parameters come
//! from the entry's [`ConverterMetadata`] so a family definition stays a data
//! document.

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeValue;
use crate::datapoint::{DatapointType, DatapointValue};

/// 2^32, the modulus vendors use to carry negative numbers in a value datapoint.
const WRAP: i64 = 1 << 32;

/// Result type for conversions.
pub type ConversionResult<T> = Result<T, ConversionError>;

/// Errors raised by converters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("{converter} converter cannot take a {found} value")]
    UnsupportedInput {
        converter: &'static str,
        found: &'static str,
    },

    #[error("{converter} converter cannot produce a {dp_type} datapoint")]
    UnsupportedOutput {
        converter: &'static str,
        dp_type: DatapointType,
    },

    #[error("Vendor code {0} is not in the enum table")]
    UnknownRawCode(i64),

    #[error("Value {0} is not in the enum table")]
    UnknownHostValue(String),

    #[error("Value {value} outside bounds [{min}, {max}]")]
    OutOfBounds { value: f64, min: f64, max: f64 },

    #[error("Value {value} does not fit a {dp_type} datapoint")]
    OutOfRange { value: i64, dp_type: DatapointType },

    #[error("{converter} converter requires the '{parameter}' parameter")]
    MissingParameter {
        converter: &'static str,
        parameter: &'static str,
    },

    #[error("Arithmetic overflow in {0} converter")]
    Overflow(&'static str),
}

/// One row of a bidirectional enum table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntry {
    /// Vendor code on the wire
    pub raw: i64,
    /// Standard enumeration code
    pub code: i64,
    /// Standard enumeration member name
    pub name: String,
}

/// Explicit vendor-code ↔ standard-enum table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnumTable {
    entries: Vec<EnumEntry>,
}

impl EnumTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row mapping vendor `raw` to the standard member `name` (`code`).
    pub fn with(mut self, raw: i64, code: i64, name: impl Into<String>) -> Self {
        self.entries.push(EnumEntry {
            raw,
            code,
            name: name.into(),
        });
        self
    }

    pub fn by_raw(&self, raw: i64) -> Option<&EnumEntry> {
        self.entries.iter().find(|e| e.raw == raw)
    }

    pub fn by_code(&self, code: i64) -> Option<&EnumEntry> {
        self.entries.iter().find(|e| e.code == code)
    }

    pub fn by_name(&self, name: &str) -> Option<&EnumEntry> {
        self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn entries(&self) -> &[EnumEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Both directions must be unambiguous.
    pub fn validate(&self) -> Result<(), String> {
        if self.entries.is_empty() {
            return Err("enum table is empty".to_string());
        }
        for (i, entry) in self.entries.iter().enumerate() {
            for other in &self.entries[i + 1..] {
                if entry.raw == other.raw {
                    return Err(format!("vendor code {} listed twice", entry.raw));
                }
                if entry.code == other.code {
                    return Err(format!("standard code {} listed twice", entry.code));
                }
            }
        }
        Ok(())
    }
}

/// Inclusive host-side value range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn check(&self, value: &AttributeValue) -> ConversionResult<()> {
        match value.as_f64() {
            Some(v) if v < self.min || v > self.max => Err(ConversionError::OutOfBounds {
                value: v,
                min: self.min,
                max: self.max,
            }),
            _ => Ok(()),
        }
    }
}

/// Parameters shared by an entry's converters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterMetadata {
    /// Host units per vendor unit
    pub scale: Option<i64>,
    pub bounds: Option<Bounds>,
    pub enum_table: Option<EnumTable>,
    /// Magnitude above which calibration values are sent inverted
    pub threshold: Option<i64>,
}

impl ConverterMetadata {
    fn scale(&self, converter: &'static str) -> ConversionResult<i64> {
        self.scale.ok_or(ConversionError::MissingParameter {
            converter,
            parameter: "scale",
        })
    }

    fn enum_table(&self, converter: &'static str) -> ConversionResult<&EnumTable> {
        self.enum_table
            .as_ref()
            .ok_or(ConversionError::MissingParameter {
                converter,
                parameter: "enum_table",
            })
    }

    fn threshold(&self, converter: &'static str) -> ConversionResult<i64> {
        self.threshold.ok_or(ConversionError::MissingParameter {
            converter,
            parameter: "threshold",
        })
    }
}

/// Datapoint → attribute conversion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeConverter {
    /// Pass the datapoint through in its natural host form
    #[default]
    Identity,
    /// `raw * scale`
    Scale,
    /// `raw / scale` as a float
    Divide,
    /// Vendor code looked up in the enum table
    EnumMap,
    /// Nonzero is true
    Boolean,
    /// 1 when the datapoint is zero, 0 otherwise
    InvertedFlag,
    /// One signed 16-bit half of a 4-byte value (0 = high, 1 = low), times scale if set
    Int16Field { index: u8 },
    /// Linear map of a clamped raw range onto a host range
    LinearRange {
        raw_min: i64,
        raw_max: i64,
        host_min: i64,
        host_max: i64,
    },
}

impl DecodeConverter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Scale => "scale",
            Self::Divide => "divide",
            Self::EnumMap => "enum_map",
            Self::Boolean => "boolean",
            Self::InvertedFlag => "inverted_flag",
            Self::Int16Field { .. } => "int16_field",
            Self::LinearRange { .. } => "linear_range",
        }
    }

    /// Check parameters at table build time.
    pub fn validate(&self, meta: &ConverterMetadata) -> Result<(), String> {
        match self {
            Self::Scale | Self::Divide => validate_scale(meta),
            Self::EnumMap => validate_enum_table(meta),
            Self::Int16Field { index } if *index > 1 => {
                Err(format!("int16_field index {} out of range", index))
            }
            Self::Int16Field { .. } => match meta.scale {
                Some(s) if s <= 0 => Err(format!("scale must be positive, got {}", s)),
                _ => Ok(()),
            },
            Self::LinearRange {
                raw_min, raw_max, ..
            } if raw_min >= raw_max => Err(format!(
                "linear_range raw_min {} must be below raw_max {}",
                raw_min, raw_max
            )),
            _ => Ok(()),
        }
    }

    pub fn apply(
        &self,
        meta: &ConverterMetadata,
        value: &DatapointValue,
    ) -> ConversionResult<AttributeValue> {
        let name = self.name();
        match self {
            Self::Identity => Ok(match value {
                DatapointValue::Raw(bytes) => AttributeValue::Binary(bytes.clone()),
                DatapointValue::Bool(v) => AttributeValue::Boolean(*v),
                DatapointValue::Value(v) => AttributeValue::Integer(i64::from(*v)),
                DatapointValue::String(s) => AttributeValue::String(s.clone()),
                DatapointValue::Enum(v) => AttributeValue::Integer(i64::from(*v)),
                DatapointValue::Bitmap { bits, .. } => AttributeValue::Bitmap(*bits),
            }),
            Self::Scale => {
                let raw = numeric(name, value)?;
                raw.checked_mul(meta.scale(name)?)
                    .map(AttributeValue::Integer)
                    .ok_or(ConversionError::Overflow(name))
            }
            Self::Divide => {
                let raw = numeric(name, value)?;
                Ok(AttributeValue::Float(raw as f64 / meta.scale(name)? as f64))
            }
            Self::EnumMap => {
                let raw = numeric(name, value)?;
                let entry = meta
                    .enum_table(name)?
                    .by_raw(raw)
                    .ok_or(ConversionError::UnknownRawCode(raw))?;
                Ok(AttributeValue::enumeration(entry.code, entry.name.clone()))
            }
            Self::Boolean => Ok(AttributeValue::Boolean(numeric(name, value)? != 0)),
            Self::InvertedFlag => Ok(AttributeValue::Integer(i64::from(
                numeric(name, value)? == 0,
            ))),
            Self::Int16Field { index } => {
                let bits = match value {
                    DatapointValue::Value(v) => *v as u32,
                    DatapointValue::Raw(bytes) if bytes.len() == 4 => {
                        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
                    }
                    other => {
                        return Err(ConversionError::UnsupportedInput {
                            converter: name,
                            found: other.dp_type().name(),
                        })
                    }
                };
                let half = if *index == 0 { bits >> 16 } else { bits & 0xFFFF };
                let field = i64::from(half as u16 as i16);
                field
                    .checked_mul(meta.scale.unwrap_or(1))
                    .map(AttributeValue::Integer)
                    .ok_or(ConversionError::Overflow(name))
            }
            Self::LinearRange {
                raw_min,
                raw_max,
                host_min,
                host_max,
            } => {
                let raw = numeric(name, value)?.clamp(*raw_min, *raw_max);
                let overflow = || ConversionError::Overflow(name);
                let span = host_max.checked_sub(*host_min).ok_or_else(overflow)?;
                let width = raw_max.checked_sub(*raw_min).ok_or_else(overflow)?;
                let host = (raw - raw_min)
                    .checked_mul(span)
                    .map(|scaled| scaled / width)
                    .and_then(|offset| host_min.checked_add(offset))
                    .ok_or_else(overflow)?;
                Ok(AttributeValue::Integer(host))
            }
        }
    }
}

/// Attribute → datapoint conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncodeConverter {
    /// Host value written as-is into the entry's datapoint type
    Identity,
    /// `host // scale` (floor division)
    Scale,
    /// `round(host * scale)`
    Divide,
    /// Standard enum member looked up in the enum table
    EnumMap,
    /// Truthiness of the host value
    Boolean,
    /// Negative values sent as `2^32 + value`
    SignedWrap,
    /// Values above the threshold sent as `2^32 - value`, others literally
    ThresholdInvert,
}

impl EncodeConverter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Scale => "scale",
            Self::Divide => "divide",
            Self::EnumMap => "enum_map",
            Self::Boolean => "boolean",
            Self::SignedWrap => "signed_wrap",
            Self::ThresholdInvert => "threshold_invert",
        }
    }

    /// Check parameters and the target datapoint type at table build time.
    pub fn validate(&self, meta: &ConverterMetadata, dp_type: DatapointType) -> Result<(), String> {
        let numeric_only = !matches!(self, Self::Identity | Self::Boolean);
        if numeric_only && matches!(dp_type, DatapointType::Raw | DatapointType::String) {
            return Err(format!(
                "{} converter cannot target a {} datapoint",
                self.name(),
                dp_type
            ));
        }
        match self {
            Self::Scale | Self::Divide => validate_scale(meta),
            Self::EnumMap => validate_enum_table(meta),
            Self::ThresholdInvert if meta.threshold.is_none() => {
                Err("threshold_invert converter requires a threshold".to_string())
            }
            _ => Ok(()),
        }
    }

    pub fn apply(
        &self,
        meta: &ConverterMetadata,
        dp_type: DatapointType,
        value: &AttributeValue,
    ) -> ConversionResult<DatapointValue> {
        let name = self.name();
        match self {
            Self::Identity => match (dp_type, value) {
                (DatapointType::Raw, AttributeValue::Binary(bytes)) => {
                    Ok(DatapointValue::Raw(bytes.clone()))
                }
                (DatapointType::String, AttributeValue::String(s)) => {
                    Ok(DatapointValue::String(s.clone()))
                }
                (DatapointType::Bool, v) => v
                    .as_bool()
                    .map(DatapointValue::Bool)
                    .ok_or(ConversionError::UnsupportedInput {
                        converter: name,
                        found: v.type_name(),
                    }),
                (DatapointType::Raw | DatapointType::String, v) => {
                    Err(ConversionError::UnsupportedInput {
                        converter: name,
                        found: v.type_name(),
                    })
                }
                (_, v) => to_datapoint(name, dp_type, host_integer(name, v)?),
            },
            Self::Scale => {
                let host = host_integer(name, value)?;
                to_datapoint(name, dp_type, host.div_euclid(meta.scale(name)?))
            }
            Self::Divide => {
                let host = value.as_f64().ok_or(ConversionError::UnsupportedInput {
                    converter: name,
                    found: value.type_name(),
                })?;
                let raw = (host * meta.scale(name)? as f64).round();
                if !raw.is_finite() || raw.abs() > i64::MAX as f64 {
                    return Err(ConversionError::Overflow(name));
                }
                to_datapoint(name, dp_type, raw as i64)
            }
            Self::EnumMap => {
                let table = meta.enum_table(name)?;
                let entry = match value {
                    AttributeValue::Enum { code, .. } | AttributeValue::Integer(code) => {
                        table.by_code(*code)
                    }
                    AttributeValue::String(member) => table.by_name(member),
                    other => {
                        return Err(ConversionError::UnsupportedInput {
                            converter: name,
                            found: other.type_name(),
                        })
                    }
                }
                .ok_or_else(|| ConversionError::UnknownHostValue(value.to_string()))?;
                to_datapoint(name, dp_type, entry.raw)
            }
            Self::Boolean => {
                let flag = value.as_bool().ok_or(ConversionError::UnsupportedInput {
                    converter: name,
                    found: value.type_name(),
                })?;
                match dp_type {
                    DatapointType::Bool => Ok(DatapointValue::Bool(flag)),
                    _ => to_datapoint(name, dp_type, i64::from(flag)),
                }
            }
            Self::SignedWrap => {
                let host = host_integer(name, value)?;
                let raw = if host < 0 { WRAP + host } else { host };
                to_datapoint(name, dp_type, raw)
            }
            Self::ThresholdInvert => {
                let host = host_integer(name, value)?;
                let raw = if host > meta.threshold(name)? {
                    WRAP - host
                } else {
                    host
                };
                to_datapoint(name, dp_type, raw)
            }
        }
    }
}

fn validate_scale(meta: &ConverterMetadata) -> Result<(), String> {
    match meta.scale {
        Some(s) if s > 0 => Ok(()),
        Some(s) => Err(format!("scale must be positive, got {}", s)),
        None => Err("missing scale".to_string()),
    }
}

fn validate_enum_table(meta: &ConverterMetadata) -> Result<(), String> {
    match &meta.enum_table {
        Some(table) => table.validate(),
        None => Err("missing enum_table".to_string()),
    }
}

fn numeric(converter: &'static str, value: &DatapointValue) -> ConversionResult<i64> {
    value.as_i64().ok_or(ConversionError::UnsupportedInput {
        converter,
        found: value.dp_type().name(),
    })
}

fn host_integer(converter: &'static str, value: &AttributeValue) -> ConversionResult<i64> {
    value.as_i64().ok_or(ConversionError::UnsupportedInput {
        converter,
        found: value.type_name(),
    })
}

/// Fit a raw integer into a numeric datapoint.
///
/// Value datapoints accept anything representable in 32 bits, signed or not;
/// values above `i32::MAX` keep their bit pattern.
fn to_datapoint(
    converter: &'static str,
    dp_type: DatapointType,
    raw: i64,
) -> ConversionResult<DatapointValue> {
    let out_of_range = || ConversionError::OutOfRange {
        value: raw,
        dp_type,
    };
    match dp_type {
        DatapointType::Value => {
            if raw < i64::from(i32::MIN) || raw > i64::from(u32::MAX) {
                return Err(out_of_range());
            }
            Ok(DatapointValue::Value(raw as u32 as i32))
        }
        DatapointType::Enum => u8::try_from(raw)
            .map(DatapointValue::Enum)
            .map_err(|_| out_of_range()),
        DatapointType::Bool => Ok(DatapointValue::Bool(raw != 0)),
        DatapointType::Bitmap => u32::try_from(raw)
            .map(DatapointValue::bitmap)
            .map_err(|_| out_of_range()),
        DatapointType::Raw | DatapointType::String => {
            Err(ConversionError::UnsupportedOutput { converter, dp_type })
        }
    }
}
