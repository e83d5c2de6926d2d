#![forbid(unsafe_code)]

//! A dynamic, map-backed [`KeyValue`] object.
//!
//! [`Record`] is the quickest way to put an object into a registry without
//! writing a `KeyValue` impl by hand. Attributes are declared up front;
//! each may be read-only and may constrain the kind of value it accepts.
//!
//! ```
//! use kvbind_core::{KeyValue, Record, Value, ValueKind};
//!
//! let mut user = Record::new("User")
//!     .with("name", "Alice")
//!     .with_typed("age", ValueKind::Int, 30)
//!     .with_readonly("id", 7);
//!
//! assert_eq!(user.value_for_key("name"), Some(Value::from("Alice")));
//! assert!(user.set_value_for_key("age", Value::from("old")).is_err());
//! assert!(user.set_value_for_key("id", Value::from(8)).is_err());
//! ```

use std::collections::BTreeMap;

use crate::error::KeyValueError;
use crate::object::KeyValue;
use crate::value::{Value, ValueKind};

#[derive(Clone, Debug, PartialEq)]
struct Attribute {
    value: Value,
    writable: bool,
    /// Accepted kind; `Null` is always accepted as well.
    kind: Option<ValueKind>,
}

/// Map-backed object with declared attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    type_name: String,
    attributes: BTreeMap<String, Attribute>,
}

impl Record {
    /// Create an empty record. `type_name` shows up in diagnostics.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Declare a writable attribute that accepts any value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.declare(key.into(), value.into(), true, None);
        self
    }

    /// Declare a writable attribute that only accepts `kind` (or `Null`).
    #[must_use]
    pub fn with_typed(
        mut self,
        key: impl Into<String>,
        kind: ValueKind,
        value: impl Into<Value>,
    ) -> Self {
        self.declare(key.into(), value.into(), true, Some(kind));
        self
    }

    /// Declare a read-only attribute.
    #[must_use]
    pub fn with_readonly(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.declare(key.into(), value.into(), false, None);
        self
    }

    fn declare(&mut self, key: String, value: Value, writable: bool, kind: Option<ValueKind>) {
        self.attributes.insert(
            key,
            Attribute {
                value,
                writable,
                kind,
            },
        );
    }

    /// Declared attribute names, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.attributes.keys().map(String::as_str)
    }

    /// Borrow an attribute value without cloning.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).map(|attr| &attr.value)
    }
}

impl KeyValue for Record {
    fn value_for_key(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }

    fn is_settable(&self, key: &str) -> bool {
        self.attributes.get(key).is_some_and(|attr| attr.writable)
    }

    fn set_value_for_key(&mut self, key: &str, value: Value) -> Result<(), KeyValueError> {
        let Some(attr) = self.attributes.get_mut(key) else {
            return Err(KeyValueError::UnknownKey {
                key: key.to_owned(),
            });
        };
        if !attr.writable {
            return Err(KeyValueError::ReadOnly {
                key: key.to_owned(),
            });
        }
        if let Some(expected) = attr.kind {
            let found = value.kind();
            if found != expected && found != ValueKind::Null {
                return Err(KeyValueError::TypeMismatch {
                    key: key.to_owned(),
                    expected,
                    found,
                });
            }
        }
        attr.value = value;
        Ok(())
    }

    fn has_key(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }
}
