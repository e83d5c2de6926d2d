#![forbid(unsafe_code)]

//! Runtime for kvbind: the object arena, the binding registry, and change
//! propagation.
//!
//! - [`ObjectStore`] owns objects behind generation-checked [`ObjectId`]s.
//! - [`BindingRegistry`] binds a receiver property to a key path on a
//!   target object and pushes every change along the path into it.
//! - [`BindingGuard`], [`TwoWayBinding`] and [`BindingScope`] tie bindings
//!   to Rust lifetimes.
//! - [`RegistryConfig`] selects strong or weak reference semantics and the
//!   rebind, unbind and propagation policies.
//!
//! The registry is single-threaded (`Rc<RefCell<_>>`). All binding and
//! propagation work for one registry is serialized through its borrow.
//!
//! [`ObjectId`]: kvbind_core::ObjectId

pub mod arena;
pub mod binding;
pub mod config;
pub mod observer;
pub mod registry;

pub use arena::{Link, ObjectStore, Release, Resolution, ResolveError};
pub use binding::{BindingGuard, BindingScope, TwoWayBinding};
pub use config::{
    ConfigError, ENV_REFERENCE_MODE, ENV_STRICT_UNBIND, RebindPolicy, ReferenceMode,
    RegistryConfig,
};
pub use observer::Subscription;
pub use registry::{BindingInfo, BindingRegistry};
