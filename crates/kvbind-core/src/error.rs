#![forbid(unsafe_code)]

//! Error types for binding, key-value access, and key-path parsing.
//!
//! All errors are local to the call that produced them; none leave a
//! registry in an unusable state.

use thiserror::Error;

use crate::handle::{BindingId, ObjectId};
use crate::value::ValueKind;

/// Errors from key-path parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyPathError {
    #[error("key path is empty")]
    Empty,
    #[error("key path has an empty segment at position {position}")]
    EmptySegment { position: usize },
    #[error("key path segment {segment:?} contains invalid character {ch:?}")]
    InvalidCharacter { segment: String, ch: char },
}

/// Errors raised by a [`KeyValue`](crate::KeyValue) setter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyValueError {
    #[error("unknown key {key:?}")]
    UnknownKey { key: String },
    #[error("key {key:?} is read-only")]
    ReadOnly { key: String },
    #[error("key {key:?} expects {expected}, got {found}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },
}

/// Errors from bind, unbind, and registry mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// The bound property is unknown, read-only, or rejected the value.
    #[error("invalid property {property:?}: {reason}")]
    InvalidProperty { property: String, reason: String },

    /// The key path could not be parsed or resolved on the target.
    #[error("invalid key path {path:?}: {reason}")]
    InvalidKeyPath { path: String, reason: String },

    /// `unbind` found no binding for the tuple (strict unbind only).
    #[error("no binding of {property:?} to key path {key_path:?}")]
    NoSuchBinding { property: String, key_path: String },

    /// No binding is registered under this id (strict unbind only).
    #[error("unknown binding {0}")]
    UnknownBinding(BindingId),

    /// The handle refers to a destroyed or released object.
    #[error("object {0} has been destroyed")]
    StaleObject(ObjectId),

    /// A mutation triggered more propagated writes than the configured limit.
    #[error("change propagation exceeded {steps} writes; bindings form a non-converging cycle")]
    PropagationLimit { steps: usize },
}

impl BindError {
    /// Build an [`BindError::InvalidKeyPath`] from a parse failure.
    #[must_use]
    pub fn from_key_path_error(path: &str, err: &KeyPathError) -> Self {
        Self::unresolvable(path, err)
    }

    /// Build an [`BindError::InvalidProperty`] from a setter failure.
    #[must_use]
    pub fn from_setter_error(property: &str, err: &KeyValueError) -> Self {
        Self::unsettable(property, err)
    }

    #[must_use]
    pub fn unresolvable(path: &str, reason: impl ToString) -> Self {
        Self::InvalidKeyPath {
            path: path.to_owned(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn unsettable(property: &str, reason: impl ToString) -> Self {
        Self::InvalidProperty {
            property: property.to_owned(),
            reason: reason.to_string(),
        }
    }
}
