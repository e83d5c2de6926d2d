#![forbid(unsafe_code)]

//! Keep object properties synchronized with key paths on other objects.
//!
//! Objects implement [`KeyValue`] (or use the ready-made [`Record`]) and
//! are moved into a [`BindingRegistry`]. A binding then keeps a property
//! on a receiver equal to the value at a dotted key path on a target,
//! following changes anywhere along the path.
//!
//! ```
//! use kvbind::prelude::*;
//!
//! let registry = BindingRegistry::new(RegistryConfig::weak());
//! let user = registry.insert(Record::new("User").with("name", "Alice"));
//! let doc = registry.insert(Record::new("Doc").with("user", user));
//! let label = registry.insert(Record::new("Label").with("title", Value::Null));
//!
//! let mut scope = BindingScope::new(&registry);
//! scope.bind(label, "title", doc, "user.name")?;
//! registry.set_value(user, "name", "Bob")?;
//! assert_eq!(registry.value(label, "title"), Some(Value::from("Bob")));
//! # Ok::<(), kvbind::BindError>(())
//! ```
//!
//! # Crates
//!
//! - `kvbind-core`: values, key paths, handles, errors, the [`KeyValue`]
//!   trait.
//! - `kvbind-runtime`: the arena, the registry, propagation, guards and
//!   configuration.
//!
//! # Features
//!
//! - `serde`: serialization for values, handles and configuration.
//! - `config-file`: [`RegistryConfig::load`] from TOML.

pub use kvbind_core::{
    BindError, BindingId, KeyPath, KeyPathError, KeyValue, KeyValueError, ObjectId, Record,
    Value, ValueKind,
};
pub use kvbind_runtime::{
    BindingGuard, BindingInfo, BindingRegistry, BindingScope, ConfigError, RebindPolicy,
    ReferenceMode, RegistryConfig, Subscription, TwoWayBinding, bind, bind_map,
};

/// The types most callers need.
pub mod prelude {
    pub use crate::{
        BindError, BindingGuard, BindingId, BindingRegistry, BindingScope, KeyValue,
        KeyValueError, ObjectId, Record, ReferenceMode, RegistryConfig, Subscription,
        TwoWayBinding, Value, ValueKind,
    };
}
