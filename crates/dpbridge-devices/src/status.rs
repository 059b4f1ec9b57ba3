//! Wire-visible outcome codes.

use serde::{Deserialize, Serialize};

/// Outcome reported back to the gateway for a frame or attribute operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Failure,
    UnsupportedAttribute,
    InvalidValue,
    ReadOnly,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::UnsupportedAttribute => "UNSUPPORTED_ATTRIBUTE",
            Self::InvalidValue => "INVALID_VALUE",
            Self::ReadOnly => "READ_ONLY",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
