#![forbid(unsafe_code)]

//! RAII handles for bindings, plus scoped lifetime management.
//!
//! [`BindingRegistry::bind`] returns a plain [`BindingId`]; the binding
//! lives until it is explicitly unbound. When a binding should instead be
//! tied to a Rust value's lifetime, wrap it in a [`BindingGuard`]:
//!
//! ```
//! use kvbind_runtime::{BindingRegistry, BindingScope};
//! use kvbind_core::{Record, Value};
//!
//! let registry = BindingRegistry::default();
//! let model = registry.insert(Record::new("Model").with("title", "draft"));
//! let view = registry.insert(Record::new("View").with("caption", Value::Null));
//!
//! let mut scope = BindingScope::new(&registry);
//! scope.bind(view, "caption", model, "title").unwrap();
//! assert_eq!(registry.binding_count(), 1);
//!
//! drop(scope);
//! assert_eq!(registry.binding_count(), 0);
//! ```
//!
//! # Invariants
//!
//! 1. Dropping a guard removes its binding, or does nothing if the binding
//!    or the registry is already gone.
//! 2. A scope releases its items in reverse registration order.
//! 3. Dropping a [`TwoWayBinding`] removes both directions.
//!
//! # Failure Modes
//!
//! - Guard dropped inside a `KeyValue` setter: panics on the registry
//!   borrow, like any other re-entrant registry call.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Weak;

use kvbind_core::{BindError, BindingId, ObjectId, Value};

use crate::observer::Subscription;
use crate::registry::{BindingRegistry, RegistryInner};

// ---------------------------------------------------------------------------
// BindingGuard
// ---------------------------------------------------------------------------

/// Unbinds its binding when dropped.
///
/// Holds the registry weakly, so a guard never keeps a registry alive.
#[must_use = "dropping a BindingGuard unbinds immediately"]
pub struct BindingGuard {
    registry: Weak<RefCell<RegistryInner>>,
    id: Option<BindingId>,
}

impl BindingGuard {
    pub(crate) fn new(registry: &BindingRegistry, id: BindingId) -> Self {
        Self {
            registry: registry.downgrade(),
            id: Some(id),
        }
    }

    /// The guarded binding, or `None` after [`detach`](Self::detach).
    #[must_use]
    pub fn id(&self) -> Option<BindingId> {
        self.id
    }

    /// Give up ownership: the binding stays registered after the guard drops.
    pub fn detach(mut self) -> Option<BindingId> {
        self.id.take()
    }

    /// Unbind now instead of at drop.
    pub fn release(mut self) -> Result<(), BindError> {
        self.unbind()
    }

    fn unbind(&mut self) -> Result<(), BindError> {
        let Some(id) = self.id.take() else {
            return Ok(());
        };
        match BindingRegistry::upgrade(&self.registry) {
            Some(registry) if registry.binding(id).is_some() => registry.unbind_by_id(id),
            _ => Ok(()),
        }
    }
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        if let Err(err) = self.unbind() {
            tracing::warn!(error = %err, "unbind on guard drop failed");
        }
    }
}

impl std::fmt::Debug for BindingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingGuard").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// TwoWayBinding
// ---------------------------------------------------------------------------

/// Two bindings that mirror one property into the other and back.
///
/// Cycles settle through the registry's equal-value no-op: once both sides
/// hold the same value, the echo write changes nothing and stops.
#[must_use = "dropping a TwoWayBinding unbinds both directions"]
pub struct TwoWayBinding {
    forward: BindingGuard,
    backward: BindingGuard,
}

impl TwoWayBinding {
    pub(crate) fn new(forward: BindingGuard, backward: BindingGuard) -> Self {
        Self { forward, backward }
    }

    /// Binding ids as (a → b, b → a).
    #[must_use]
    pub fn ids(&self) -> (Option<BindingId>, Option<BindingId>) {
        (self.forward.id(), self.backward.id())
    }
}

impl std::fmt::Debug for TwoWayBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoWayBinding")
            .field("forward", &self.forward.id())
            .field("backward", &self.backward.id())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BindingScope
// ---------------------------------------------------------------------------

/// Collects bindings and observers for a logical owner (a view, a window
/// controller) and releases them all together.
///
/// # Invariants
///
/// 1. Items are released in reverse registration order on drop.
/// 2. After drop, no binding or callback from this scope remains active.
/// 3. `clear()` releases everything immediately; the scope stays usable.
pub struct BindingScope {
    registry: BindingRegistry,
    /// Guards, two-way bindings, and subscriptions, oldest first.
    items: Vec<Box<dyn Any>>,
}

impl BindingScope {
    /// Create an empty scope that registers through `registry`.
    #[must_use]
    pub fn new(registry: &BindingRegistry) -> Self {
        Self {
            registry: registry.clone(),
            items: Vec::new(),
        }
    }

    /// Take ownership of an existing guard.
    pub fn hold_binding(&mut self, guard: BindingGuard) {
        self.items.push(Box::new(guard));
    }

    /// Take ownership of an observer subscription.
    pub fn hold(&mut self, sub: Subscription) {
        self.items.push(Box::new(sub));
    }

    /// Bind within this scope. See [`BindingRegistry::bind`].
    pub fn bind(
        &mut self,
        receiver: ObjectId,
        property: &str,
        target: ObjectId,
        key_path: &str,
    ) -> Result<BindingId, BindError> {
        let id = self.registry.bind(receiver, property, target, key_path)?;
        self.hold_binding(self.registry.guard(id));
        Ok(id)
    }

    /// Mapped bind within this scope.
    pub fn bind_mapped(
        &mut self,
        receiver: ObjectId,
        property: &str,
        target: ObjectId,
        key_path: &str,
        transform: impl Fn(&Value) -> Value + 'static,
    ) -> Result<BindingId, BindError> {
        let id = self
            .registry
            .bind_mapped(receiver, property, target, key_path, transform)?;
        self.hold_binding(self.registry.guard(id));
        Ok(id)
    }

    /// Two-way bind within this scope.
    pub fn bind_two_way(
        &mut self,
        a: ObjectId,
        prop_a: &str,
        b: ObjectId,
        prop_b: &str,
    ) -> Result<&mut Self, BindError> {
        let binding = self.registry.bind_two_way(a, prop_a, b, prop_b)?;
        self.items.push(Box::new(binding));
        Ok(self)
    }

    /// Observe a key path within this scope.
    pub fn observe(
        &mut self,
        target: ObjectId,
        key_path: &str,
        callback: impl Fn(&Value) + 'static,
    ) -> Result<&mut Self, BindError> {
        let sub = self.registry.observe(target, key_path, callback)?;
        self.hold(sub);
        Ok(self)
    }

    /// Number of items held (a two-way binding counts once).
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Release everything now, newest first.
    pub fn clear(&mut self) {
        while let Some(item) = self.items.pop() {
            drop(item);
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.items.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Macros
// ---------------------------------------------------------------------------

/// Bind `receiver.property` to a key path on `target`.
///
/// # Examples
///
/// ```
/// use kvbind_runtime::{bind, BindingRegistry};
/// use kvbind_core::{Record, Value};
///
/// let registry = BindingRegistry::default();
/// let doc = registry.insert(Record::new("Doc").with("title", "draft"));
/// let label = registry.insert(Record::new("Label").with("text", Value::Null));
///
/// bind!(registry, label.text <- doc."title").unwrap();
/// assert_eq!(registry.value(label, "text"), Some(Value::from("draft")));
/// ```
#[macro_export]
macro_rules! bind {
    ($registry:expr, $receiver:ident . $property:ident <- $target:ident . $path:literal) => {
        $registry.bind($receiver, stringify!($property), $target, $path)
    };
}

/// Like [`bind!`], with a transform.
///
/// # Examples
///
/// ```
/// use kvbind_runtime::{bind_map, BindingRegistry};
/// use kvbind_core::{Record, Value};
///
/// let registry = BindingRegistry::default();
/// let doc = registry.insert(Record::new("Doc").with("pages", 3));
/// let label = registry.insert(Record::new("Label").with("text", Value::Null));
///
/// bind_map!(registry, label.text <- doc."pages", |v| Value::from(format!("{v} pages")))
///     .unwrap();
/// assert_eq!(registry.value(label, "text"), Some(Value::from("3 pages")));
/// ```
#[macro_export]
macro_rules! bind_map {
    ($registry:expr, $receiver:ident . $property:ident <- $target:ident . $path:literal, $f:expr) => {
        $registry.bind_mapped($receiver, stringify!($property), $target, $path, $f)
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
