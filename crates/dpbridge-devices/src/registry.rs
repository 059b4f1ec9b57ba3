//! Device family registry.
//!
//! A family groups the devices that speak the same datapoint dialect. Each
//! [`FamilyDefinition`] is plain data; registering it compiles the mapping
//! table once, and the finished [`FamilyRegistry`] is immutable and shared by
//! reference from the composition root.
//!
//! ```rust,no_run
//! use dpbridge_devices::registry::FamilyRegistryBuilder;
//! use dpbridge_devices::builtin_families::builtin_families;
//!
//! let mut builder = FamilyRegistryBuilder::new();
//! for family in builtin_families()? {
//!     builder.register(family)?;
//! }
//! let registry = builder.build();
//! # Ok::<(), dpbridge_devices::registry::RegistryError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::attribute::{AttributeKey, AttributeRef, AttributeValue};
use crate::mapping::{MappingEntry, MappingError, MappingTable};

/// Errors raised while registering families.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Family '{0}' is already registered")]
    DuplicateFamily(String),

    #[error("Device {manufacturer}/{model} is claimed by both '{first}' and '{second}'")]
    DuplicateSignature {
        manufacturer: String,
        model: String,
        first: String,
        second: String,
    },

    #[error("Family '{family}' has an invalid mapping: {source}")]
    Mapping {
        family: String,
        #[source]
        source: MappingError,
    },

    #[error("Family '{family}' declares {attribute} as both constant and unsupported")]
    ConflictingAttribute { family: String, attribute: AttributeKey },

    #[error("Invalid family definition: {0}")]
    InvalidDefinition(String),
}

/// `(manufacturer, model)` pair a family applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceSignature {
    pub manufacturer: String,
    pub model: String,
}

impl DeviceSignature {
    pub fn new(manufacturer: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            model: model.into(),
        }
    }
}

/// Attribute answered from the definition rather than the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantAttribute {
    pub attribute: AttributeRef,
    pub value: AttributeValue,
}

/// Manufacturer code placed on outbound writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManufacturerPolicy {
    /// Whatever the caller supplies
    #[default]
    Caller,
    /// Never send a manufacturer code
    Suppress,
    /// Always send this code
    Fixed(u16),
}

impl ManufacturerPolicy {
    pub fn resolve(self, caller: Option<u16>) -> Option<u16> {
        match self {
            Self::Caller => caller,
            Self::Suppress => None,
            Self::Fixed(code) => Some(code),
        }
    }
}

/// Declarative description of a device family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub applies_to: Vec<DeviceSignature>,
    pub mappings: Vec<MappingEntry>,
    #[serde(default)]
    pub constants: Vec<ConstantAttribute>,
    #[serde(default)]
    pub unsupported: Vec<AttributeKey>,
    #[serde(default)]
    pub manufacturer: ManufacturerPolicy,
}

/// A compiled family, ready to back dispatchers.
#[derive(Debug, Clone)]
pub struct DeviceFamily {
    pub name: String,
    pub description: String,
    pub applies_to: Vec<DeviceSignature>,
    pub table: Arc<MappingTable>,
    pub constants: BTreeMap<AttributeKey, ConstantAttribute>,
    pub unsupported: Vec<AttributeKey>,
    pub manufacturer: ManufacturerPolicy,
}

impl DeviceFamily {
    /// Validate a definition and build its mapping table.
    pub fn compile(definition: FamilyDefinition) -> Result<Self, RegistryError> {
        let FamilyDefinition {
            name,
            description,
            applies_to,
            mappings,
            constants,
            unsupported,
            manufacturer,
        } = definition;

        let table = MappingTable::build(mappings).map_err(|source| RegistryError::Mapping {
            family: name.clone(),
            source,
        })?;

        let constants: BTreeMap<_, _> = constants
            .into_iter()
            .map(|c| (c.attribute.key(), c))
            .collect();
        if let Some(key) = unsupported.iter().find(|k| constants.contains_key(*k)) {
            return Err(RegistryError::ConflictingAttribute {
                family: name,
                attribute: key.clone(),
            });
        }

        Ok(Self {
            name,
            description,
            applies_to,
            table: Arc::new(table),
            constants,
            unsupported,
            manufacturer,
        })
    }

    pub fn matches(&self, manufacturer: &str, model: &str) -> bool {
        self.applies_to
            .iter()
            .any(|s| s.manufacturer == manufacturer && s.model == model)
    }
}

/// Collects family definitions before the registry is frozen.
#[derive(Debug, Default)]
pub struct FamilyRegistryBuilder {
    families: Vec<Arc<DeviceFamily>>,
    by_name: HashMap<String, usize>,
    by_signature: HashMap<DeviceSignature, usize>,
}

impl FamilyRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and add a family.
    pub fn register(&mut self, definition: FamilyDefinition) -> Result<(), RegistryError> {
        if self.by_name.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateFamily(definition.name));
        }
        for signature in &definition.applies_to {
            if let Some(&index) = self.by_signature.get(signature) {
                return Err(RegistryError::DuplicateSignature {
                    manufacturer: signature.manufacturer.clone(),
                    model: signature.model.clone(),
                    first: self.families[index].name.clone(),
                    second: definition.name.clone(),
                });
            }
        }

        let family = DeviceFamily::compile(definition)?;
        let index = self.families.len();
        self.by_name.insert(family.name.clone(), index);
        for signature in &family.applies_to {
            self.by_signature.insert(signature.clone(), index);
        }

        tracing::debug!(
            family = %family.name,
            datapoints = family.table.len(),
            "Registered device family"
        );
        self.families.push(Arc::new(family));
        Ok(())
    }

    pub fn build(self) -> FamilyRegistry {
        tracing::info!(families = self.families.len(), "Family registry ready");
        FamilyRegistry {
            families: self.families,
            by_name: self.by_name,
            by_signature: self.by_signature,
        }
    }
}

/// Immutable lookup of compiled families.
#[derive(Debug, Clone, Default)]
pub struct FamilyRegistry {
    families: Vec<Arc<DeviceFamily>>,
    by_name: HashMap<String, usize>,
    by_signature: HashMap<DeviceSignature, usize>,
}

impl FamilyRegistry {
    pub fn get(&self, name: &str) -> Option<Arc<DeviceFamily>> {
        self.by_name.get(name).map(|&i| self.families[i].clone())
    }

    /// Family claiming a device signature.
    pub fn find(&self, manufacturer: &str, model: &str) -> Option<Arc<DeviceFamily>> {
        self.by_signature
            .get(&DeviceSignature::new(manufacturer, model))
            .map(|&i| self.families[i].clone())
    }

    /// Family names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.families.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DeviceFamily>> {
        self.families.iter()
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(name: &str, model: &str) -> FamilyDefinition {
        serde_json::from_value(json!({
            "name": name,
            "applies_to": [{"manufacturer": "_TZE200_test", "model": model}],
            "mappings": [{
                "dp_id": 1,
                "dp_type": "bool",
                "attribute": {"cluster": "tuya_manufacturer", "attribute_id": 61185, "name": "switch"},
                "decode": {"kind": "boolean"},
                "encode": {"kind": "boolean"}
            }],
            "manufacturer": "suppress"
        }))
        .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut builder = FamilyRegistryBuilder::new();
        builder.register(definition("a", "TS0601")).unwrap();
        builder.register(definition("b", "TS0602")).unwrap();
        let registry = builder.build();

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.get("b").unwrap().table.len(), 1);
        assert_eq!(registry.find("_TZE200_test", "TS0601").unwrap().name, "a");
        assert!(registry.find("_TZE200_test", "TS0603").is_none());
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut builder = FamilyRegistryBuilder::new();
        builder.register(definition("a", "TS0601")).unwrap();
        assert_eq!(
            builder.register(definition("a", "TS0602")),
            Err(RegistryError::DuplicateFamily("a".to_string()))
        );
    }

    #[test]
    fn test_duplicate_signature_rejected() {
        let mut builder = FamilyRegistryBuilder::new();
        builder.register(definition("a", "TS0601")).unwrap();
        let err = builder.register(definition("b", "TS0601")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateSignature { .. }));
    }

    #[test]
    fn test_invalid_mapping_names_family() {
        let mut def = definition("broken", "TS0601");
        let duplicate = def.mappings[0].clone();
        def.mappings.push(duplicate);

        let err = DeviceFamily::compile(def).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Mapping {
                family: "broken".to_string(),
                source: MappingError::DuplicateDatapoint(1),
            }
        );
    }

    #[test]
    fn test_constant_and_unsupported_conflict() {
        let mut def = definition("a", "TS0601");
        def.constants.push(ConstantAttribute {
            attribute: AttributeRef::new("thermostat", 0x0015, "min_heat_setpoint_limit"),
            value: AttributeValue::Integer(500),
        });
        def.unsupported.push(AttributeKey::new("thermostat", 0x0015));
        assert!(matches!(
            DeviceFamily::compile(def),
            Err(RegistryError::ConflictingAttribute { .. })
        ));
    }

    #[test]
    fn test_manufacturer_policy() {
        assert_eq!(ManufacturerPolicy::Caller.resolve(Some(0x1002)), Some(0x1002));
        assert_eq!(ManufacturerPolicy::Suppress.resolve(Some(0x1002)), None);
        assert_eq!(ManufacturerPolicy::Fixed(0x1141).resolve(None), Some(0x1141));

        let family = DeviceFamily::compile(definition("a", "TS0601")).unwrap();
        assert_eq!(family.manufacturer, ManufacturerPolicy::Suppress);
        assert!(family.matches("_TZE200_test", "TS0601"));
    }
}
