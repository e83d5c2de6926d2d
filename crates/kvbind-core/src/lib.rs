#![forbid(unsafe_code)]

//! Core types for kvbind: dynamic values, key paths, generation-checked
//! object handles, and the [`KeyValue`] capability trait that objects
//! implement to take part in bindings.
//!
//! This crate is stateless. The object arena, the binding registry, and
//! change propagation live in `kvbind-runtime`.

pub mod error;
pub mod handle;
pub mod key_path;
pub mod object;
pub mod record;
pub mod value;

pub use error::{BindError, KeyPathError, KeyValueError};
pub use handle::{BindingId, ObjectId};
pub use key_path::KeyPath;
pub use object::KeyValue;
pub use record::Record;
pub use value::{Value, ValueKind};
