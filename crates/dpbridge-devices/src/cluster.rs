//! Per-endpoint attribute cache.
//!
//! A [`ClusterState`] is the standard attribute store of one endpoint. The
//! family's constant and unsupported attributes are layered over it; the
//! dispatcher owning the state is the only writer.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::attribute::{AttributeKey, AttributeValue};
use crate::registry::DeviceFamily;

/// Result of reading one attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum AttributeRead {
    Value(AttributeValue),
    /// Known attribute that the device has not reported yet
    NeverReported,
    Unsupported,
}

impl AttributeRead {
    pub fn value(&self) -> Option<&AttributeValue> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    endpoint: u8,
    values: BTreeMap<AttributeKey, AttributeValue>,
    constants: BTreeMap<AttributeKey, AttributeValue>,
    unsupported: HashSet<AttributeKey>,
}

impl ClusterState {
    pub fn new(endpoint: u8) -> Self {
        Self {
            endpoint,
            ..Default::default()
        }
    }

    /// Empty cache with the family's constant and unsupported attributes.
    pub fn for_family(endpoint: u8, family: &DeviceFamily) -> Self {
        Self {
            endpoint,
            values: BTreeMap::new(),
            constants: family
                .constants
                .iter()
                .map(|(key, c)| (key.clone(), c.value.clone()))
                .collect(),
            unsupported: family.unsupported.iter().cloned().collect(),
        }
    }

    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    /// Unsupported wins over constants, constants over reported values.
    pub fn read(&self, key: &AttributeKey) -> AttributeRead {
        if self.unsupported.contains(key) {
            return AttributeRead::Unsupported;
        }
        match self.constants.get(key).or_else(|| self.values.get(key)) {
            Some(value) => AttributeRead::Value(value.clone()),
            None => AttributeRead::NeverReported,
        }
    }

    pub fn get(&self, key: &AttributeKey) -> Option<&AttributeValue> {
        if self.unsupported.contains(key) {
            return None;
        }
        self.constants.get(key).or_else(|| self.values.get(key))
    }

    /// Store a reported value. Returns the previous one.
    pub fn update(&mut self, key: AttributeKey, value: AttributeValue) -> Option<AttributeValue> {
        self.values.insert(key, value)
    }

    pub fn is_constant(&self, key: &AttributeKey) -> bool {
        self.constants.contains_key(key)
    }

    pub fn is_unsupported(&self, key: &AttributeKey) -> bool {
        self.unsupported.contains(key)
    }

    /// Reported values, constants excluded.
    pub fn reported(&self) -> impl Iterator<Item = (&AttributeKey, &AttributeValue)> {
        self.values.iter()
    }
}
