#![forbid(unsafe_code)]

//! Raw key-path observers.
//!
//! An observer is a callback attached to a key path on a target object. It
//! is invoked with the new value whenever that value changes, after the
//! registry has finished propagating the mutation and released its internal
//! borrow, so callbacks may freely call back into the registry.
//!
//! Callbacks are stored as `Weak` function pointers; the strong side lives
//! in the returned [`Subscription`]. Dropping the guard unsubscribes, and
//! dead entries are pruned lazily.

use std::any::Any;
use std::rc::{Rc, Weak};

use kvbind_core::{KeyPath, ObjectId, Value};

use crate::arena::Link;

pub(crate) type Callback = Rc<dyn Fn(&Value)>;
type CallbackWeak = Weak<dyn Fn(&Value)>;

/// RAII guard for an observer. Dropping it unsubscribes the callback.
#[must_use = "dropping a Subscription unsubscribes the observer"]
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl Subscription {
    pub(crate) fn new(callback: Callback) -> Self {
        // `Rc<dyn Fn>` cannot coerce to `dyn Any` directly; boxing the Rc
        // itself erases it.
        Self {
            _guard: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

pub(crate) struct ObserverEntry {
    pub(crate) target: ObjectId,
    pub(crate) key_path: KeyPath,
    pub(crate) links: Vec<Link>,
    /// Last value delivered (or the value at registration).
    pub(crate) last: Value,
    callback: CallbackWeak,
}

impl ObserverEntry {
    pub(crate) fn new(
        target: ObjectId,
        key_path: KeyPath,
        links: Vec<Link>,
        last: Value,
        callback: &Callback,
    ) -> Self {
        Self {
            target,
            key_path,
            links,
            last,
            callback: Rc::downgrade(callback),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.callback.strong_count() > 0
    }

    pub(crate) fn callback(&self) -> Option<Callback> {
        self.callback.upgrade()
    }
}

/// A notification held until the registry borrow is released.
pub(crate) struct Pending {
    pub(crate) callback: Callback,
    pub(crate) value: Value,
}

/// Invoke pending callbacks in order.
pub(crate) fn deliver(pending: Vec<Pending>) {
    for Pending { callback, value } in pending {
        callback(&value);
    }
}
