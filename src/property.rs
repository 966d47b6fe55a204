//! Property descriptors.
//!
//! A property maps a logical name onto a raw key, a custom getter, a custom
//! setter, or some mix of those. A property without a key is fully derived
//! and must bring its own getter (and its own setter, unless read-only).

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

use crate::error::{KeyValueError, Result};
use crate::store::{KeyValueStore, SetOutcome};
use crate::value::Value;

/// Custom read path for a property.
pub type GetterFn = Arc<
    dyn for<'a> Fn(&'a dyn KeyValueStore) -> BoxFuture<'a, Result<Option<Value>>> + Send + Sync,
>;

/// Custom write path for a property.
pub type SetterFn = Arc<
    dyn for<'a> Fn(&'a dyn KeyValueStore, Value) -> BoxFuture<'a, Result<SetOutcome>>
        + Send
        + Sync,
>;

/// How a property is written.
#[derive(Clone)]
pub enum Setter {
    /// `store.set(key, value)` on the property's raw key.
    Default,
    /// Writes are rejected with [`KeyValueError::ReadOnly`].
    ReadOnly,
    /// A custom write path.
    Custom(SetterFn),
}

/// A named property descriptor.
#[derive(Clone)]
pub struct Property {
    name: String,
    key: Option<String>,
    getter: Option<GetterFn>,
    setter: Setter,
    doc: Option<String>,
}

impl Property {
    /// A property backed by a raw key, with the default read and write paths.
    pub fn keyed(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: Some(key.into()),
            getter: None,
            setter: Setter::Default,
            doc: None,
        }
    }

    /// A property with no raw key. Needs a getter before it can be
    /// registered, and a setter or [`read_only`](Self::read_only).
    pub fn derived(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
            getter: None,
            setter: Setter::Default,
            doc: None,
        }
    }

    pub fn with_getter<F>(mut self, getter: F) -> Self
    where
        F: for<'a> Fn(&'a dyn KeyValueStore) -> BoxFuture<'a, Result<Option<Value>>>
            + Send
            + Sync
            + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: for<'a> Fn(&'a dyn KeyValueStore, Value) -> BoxFuture<'a, Result<SetOutcome>>
            + Send
            + Sync
            + 'static,
    {
        self.setter = Setter::Custom(Arc::new(setter));
        self
    }

    pub fn read_only(mut self) -> Self {
        self.setter = Setter::ReadOnly;
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.setter, Setter::ReadOnly)
    }

    /// True if the property has no raw key of its own.
    pub fn is_derived(&self) -> bool {
        self.key.is_none()
    }

    /// Check that both the read and the write path can be resolved.
    pub fn validate(&self) -> Result<()> {
        if self.key.is_some() {
            return Ok(());
        }
        if self.getter.is_none() {
            return Err(self.configuration_error("cannot use default getter without a key"));
        }
        if matches!(self.setter, Setter::Default) {
            return Err(self.configuration_error("cannot use default setter without a key"));
        }
        Ok(())
    }

    /// Read the property from `store`.
    pub async fn read(&self, store: &dyn KeyValueStore) -> Result<Option<Value>> {
        if let Some(getter) = &self.getter {
            return getter(store).await;
        }
        match &self.key {
            Some(key) => store.get(key, None).await,
            None => Err(self.configuration_error("cannot use default getter without a key")),
        }
    }

    /// Read the property as text.
    ///
    /// A keyed property without a custom getter returns the field exactly as
    /// stored, so numeric-looking text such as `"12345"` is not reformatted.
    /// Other properties format their decoded value.
    pub async fn read_text(&self, store: &dyn KeyValueStore) -> Result<Option<String>> {
        match (&self.getter, &self.key) {
            (None, Some(key)) => Ok(store.get_raw(key).await?.filter(|raw| !raw.is_empty())),
            _ => Ok(self.read(store).await?.map(|value| match value {
                Value::Text(text) => text,
                other => other.to_string(),
            })),
        }
    }

    /// Write `value` to the property through `store`.
    pub async fn write(&self, store: &dyn KeyValueStore, value: Value) -> Result<SetOutcome> {
        match &self.setter {
            Setter::ReadOnly => Err(KeyValueError::ReadOnly(self.name.clone())),
            Setter::Custom(setter) => setter(store, value).await,
            Setter::Default => match &self.key {
                Some(key) => store.set(key, value).await,
                None => Err(self.configuration_error("cannot use default setter without a key")),
            },
        }
    }

    fn configuration_error(&self, reason: &str) -> KeyValueError {
        KeyValueError::Configuration {
            property: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let setter = match self.setter {
            Setter::Default => "default",
            Setter::ReadOnly => "read-only",
            Setter::Custom(_) => "custom",
        };
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("getter", &self.getter.as_ref().map(|_| "custom"))
            .field("setter", &setter)
            .field("doc", &self.doc)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_keyed_property_is_valid() {
        let property = Property::keyed("nof_pols", "NPOL");
        assert!(property.validate().is_ok());
        assert_eq!(property.raw_key(), Some("NPOL"));
        assert!(!property.is_derived());
        assert!(!property.is_read_only());
    }

    #[test]
    fn test_derived_property_requires_getter() {
        let err = Property::derived("orphan").read_only().validate().unwrap_err();
        assert!(matches!(err, KeyValueError::Configuration { ref property, .. } if property == "orphan"));
    }

    #[test]
    fn test_writable_derived_property_requires_setter() {
        let property = Property::derived("half")
            .with_getter(|_| async { Ok(Some(Value::Float(0.5))) }.boxed());
        let err = property.validate().unwrap_err();
        assert!(err.to_string().contains("default setter"));
    }

    #[test]
    fn test_read_only_derived_property_is_valid() {
        let property = Property::derived("bogus")
            .with_getter(|_| async { Ok(Some(Value::Bool(true))) }.boxed())
            .read_only()
            .with_doc("Always true.");
        assert!(property.validate().is_ok());
        assert!(property.is_read_only());
        assert_eq!(property.doc(), Some("Always true."));
    }

    #[tokio::test]
    async fn test_read_text_keeps_numeric_looking_fields() {
        use crate::addressing::StoreIdentity;
        use crate::registry::PropertyRegistry;
        use crate::snapshot::SnapshotStore;
        use std::collections::BTreeMap;

        let mut values = BTreeMap::new();
        values.insert("OBSID".to_string(), "12345".to_string());
        values.insert("SRC_NAME".to_string(), String::new());
        let store = SnapshotStore::new(
            StoreIdentity::new("cosmic-gpu-0", "1"),
            values,
            PropertyRegistry::new(),
        );

        let observation = Property::keyed("observation_id", "OBSID");
        assert_eq!(observation.read_text(&store).await.unwrap().as_deref(), Some("12345"));
        assert_eq!(
            observation.read(&store).await.unwrap(),
            Some(Value::Float(12345.0))
        );
        assert_eq!(
            Property::keyed("source", "SRC_NAME").read_text(&store).await.unwrap(),
            None
        );

        let derived = Property::derived("half")
            .with_getter(|_| async { Ok(Some(Value::Float(0.5))) }.boxed())
            .read_only();
        assert_eq!(derived.read_text(&store).await.unwrap().as_deref(), Some("0.5"));
    }

    #[test]
    fn test_debug_hides_closures() {
        let property = Property::keyed("source", "SRC_NAME").read_only();
        let text = format!("{:?}", property);
        assert!(text.contains("SRC_NAME"));
        assert!(text.contains("read-only"));
    }
}
