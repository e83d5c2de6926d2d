#![forbid(unsafe_code)]

//! The key-value capability trait.
//!
//! Objects that take part in bindings expose their attributes by name
//! through [`KeyValue`]. Key-path traversal is done by the registry one
//! segment at a time, so an implementation only ever answers for its own
//! attributes; nested paths are reached by returning
//! [`Value::Object`](crate::Value::Object) links.
//!
//! # Example
//!
//! ```
//! use kvbind_core::{KeyValue, KeyValueError, Value, ValueKind};
//!
//! struct Label {
//!     text: String,
//! }
//!
//! impl KeyValue for Label {
//!     fn value_for_key(&self, key: &str) -> Option<Value> {
//!         match key {
//!             "text" => Some(Value::from(self.text.as_str())),
//!             _ => None,
//!         }
//!     }
//!
//!     fn is_settable(&self, key: &str) -> bool {
//!         key == "text"
//!     }
//!
//!     fn set_value_for_key(&mut self, key: &str, value: Value) -> Result<(), KeyValueError> {
//!         match (key, value) {
//!             ("text", Value::Text(text)) => {
//!                 self.text = text;
//!                 Ok(())
//!             }
//!             ("text", Value::Null) => {
//!                 self.text.clear();
//!                 Ok(())
//!             }
//!             ("text", other) => Err(KeyValueError::TypeMismatch {
//!                 key: key.to_owned(),
//!                 expected: ValueKind::Text,
//!                 found: other.kind(),
//!             }),
//!             _ => Err(KeyValueError::UnknownKey { key: key.to_owned() }),
//!         }
//!     }
//! }
//!
//! let mut label = Label { text: String::new() };
//! label.set_value_for_key("text", Value::from("hi")).unwrap();
//! assert_eq!(label.value_for_key("text"), Some(Value::from("hi")));
//! assert!(label.has_key("text"));
//! assert!(!label.has_key("color"));
//! ```

use crate::error::KeyValueError;
use crate::value::Value;

/// Attribute access by name.
///
/// # Contract
///
/// - `value_for_key` returns `None` exactly for keys the object does not
///   have. A known key with no value returns `Some(Value::Null)`.
/// - `is_settable(key)` implies `has_key(key)`.
/// - `set_value_for_key` must leave the object unchanged when it returns
///   an error.
pub trait KeyValue {
    /// Read the attribute named `key`.
    fn value_for_key(&self, key: &str) -> Option<Value>;

    /// Whether `key` names a writable attribute.
    fn is_settable(&self, key: &str) -> bool;

    /// Write the attribute named `key`.
    fn set_value_for_key(&mut self, key: &str, value: Value) -> Result<(), KeyValueError>;

    /// Whether `key` names a readable attribute.
    fn has_key(&self, key: &str) -> bool {
        self.value_for_key(key).is_some()
    }

    /// Human-readable type name used in diagnostics.
    fn type_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<T: KeyValue + ?Sized> KeyValue for Box<T> {
    fn value_for_key(&self, key: &str) -> Option<Value> {
        (**self).value_for_key(key)
    }

    fn is_settable(&self, key: &str) -> bool {
        (**self).is_settable(key)
    }

    fn set_value_for_key(&mut self, key: &str, value: Value) -> Result<(), KeyValueError> {
        (**self).set_value_for_key(key, value)
    }

    fn has_key(&self, key: &str) -> bool {
        (**self).has_key(key)
    }

    fn type_name(&self) -> &str {
        (**self).type_name()
    }
}
