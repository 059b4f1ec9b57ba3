//! Host-side attribute values.
//!
//! These are the values a standard cluster attribute holds after a datapoint
//! has been converted, and the values callers hand in when writing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Binary payloads serialize as hex strings
mod binary_serde {
    use super::*;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Value of a standard attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    /// Member of a standard enumeration
    Enum { code: i64, name: String },
    Bitmap(u32),
    #[serde(with = "binary_serde")]
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Create an enumeration value.
    pub fn enumeration(code: i64, name: impl Into<String>) -> Self {
        Self::Enum {
            code,
            name: name.into(),
        }
    }

    /// Integer view of the value.
    ///
    /// Floats only convert when they carry no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Enum { code, .. } => Some(*code),
            Self::Bitmap(v) => Some(i64::from(*v)),
            Self::Boolean(v) => Some(i64::from(*v)),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Enum { code, .. } => Some(*code as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            Self::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Short name of the value's variant, used in log fields and errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::String(_) => "string",
            Self::Enum { .. } => "enum",
            Self::Bitmap(_) => "bitmap",
            Self::Binary(_) => "binary",
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::Enum { code, name } => write!(f, "{}({})", name, code),
            Self::Bitmap(v) => write!(f, "{:#b}", v),
            Self::Binary(v) => write!(f, "0x{}", hex::encode(v)),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_views() {
        assert_eq!(AttributeValue::Integer(-3).as_i64(), Some(-3));
        assert_eq!(AttributeValue::enumeration(4, "Heat").as_i64(), Some(4));
        assert_eq!(AttributeValue::Float(25.0).as_i64(), Some(25));
        assert_eq!(AttributeValue::Float(25.5).as_i64(), None);
        assert_eq!(AttributeValue::String("x".into()).as_i64(), None);
    }

    #[test]
    fn test_binary_serializes_as_hex() {
        let value = AttributeValue::Binary(vec![0x00, 0xfa]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"Binary":"00fa"}"#);

        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_display() {
        assert_eq!(AttributeValue::enumeration(4, "Heat").to_string(), "Heat(4)");
        assert_eq!(AttributeValue::Binary(vec![1, 2]).to_string(), "0x0102");
    }
}
