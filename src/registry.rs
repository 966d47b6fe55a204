//! Property registry and name-based property access.
//!
//! Each store owns its registry. Registering a name twice replaces the first
//! definition; nothing is shared between stores unless the registry itself
//! is cloned into both.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::{KeyValueError, Result};
use crate::property::Property;
use crate::store::{KeyValueStore, SetOutcome};
use crate::value::Value;

/// Ordered collection of property descriptors, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    properties: IndexMap<String, Property>,
}

impl PropertyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and install a property, replacing any earlier one of the
    /// same name.
    pub fn define(&mut self, property: Property) -> Result<()> {
        property.validate()?;
        self.properties.insert(property.name().to_string(), property);
        Ok(())
    }

    /// Install several properties in iteration order.
    ///
    /// Stops at the first invalid property; the ones before it stay
    /// installed.
    pub fn define_many(&mut self, properties: impl IntoIterator<Item = Property>) -> Result<()> {
        for property in properties {
            self.define(property)?;
        }
        Ok(())
    }

    /// Build a registry from a built-in table. The table's validity is
    /// covered by tests instead of being checked at run time.
    pub(crate) fn from_table(properties: impl IntoIterator<Item = Property>) -> Self {
        let properties = properties
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        Self { properties }
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Property names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Read a property by name through the store's registry.
pub async fn read_property(store: &dyn KeyValueStore, name: &str) -> Result<Option<Value>> {
    let property = store
        .registry()
        .get(name)
        .ok_or_else(|| KeyValueError::UnknownProperty(name.to_string()))?;
    property.read(store).await
}

/// Read a property by name as text. See [`Property::read_text`].
pub async fn read_property_text(store: &dyn KeyValueStore, name: &str) -> Result<Option<String>> {
    let property = store
        .registry()
        .get(name)
        .ok_or_else(|| KeyValueError::UnknownProperty(name.to_string()))?;
    property.read_text(store).await
}

/// Write a property by name through the store's registry.
pub async fn write_property(
    store: &dyn KeyValueStore,
    name: &str,
    value: Value,
) -> Result<SetOutcome> {
    let property = store
        .registry()
        .get(name)
        .ok_or_else(|| KeyValueError::UnknownProperty(name.to_string()))?;
    property.write(store, value).await
}

/// Name-based property access for any store.
#[async_trait]
pub trait PropertyAccess: Send + Sync {
    /// Read a property by name.
    async fn property(&self, name: &str) -> Result<Option<Value>>;

    /// Read a property by name as text, without numeric inference on
    /// plain keyed fields.
    async fn property_text(&self, name: &str) -> Result<Option<String>>;

    /// Write a property by name.
    async fn set_property(&self, name: &str, value: Value) -> Result<SetOutcome>;
}

#[async_trait]
impl<S: KeyValueStore> PropertyAccess for S {
    async fn property(&self, name: &str) -> Result<Option<Value>> {
        read_property(self, name).await
    }

    async fn property_text(&self, name: &str) -> Result<Option<String>> {
        read_property_text(self, name).await
    }

    async fn set_property(&self, name: &str, value: Value) -> Result<SetOutcome> {
        write_property(self, name, value).await
    }
}

#[async_trait]
impl PropertyAccess for dyn KeyValueStore {
    async fn property(&self, name: &str) -> Result<Option<Value>> {
        read_property(self, name).await
    }

    async fn property_text(&self, name: &str) -> Result<Option<String>> {
        read_property_text(self, name).await
    }

    async fn set_property(&self, name: &str, value: Value) -> Result<SetOutcome> {
        write_property(self, name, value).await
    }
}
