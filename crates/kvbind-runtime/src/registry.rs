#![forbid(unsafe_code)]

//! The binding registry.
//!
//! [`BindingRegistry`] owns an [`ObjectStore`] and a table of bindings. A
//! binding makes a property on a *receiver* object mirror the value at a
//! key path on a *target* object:
//!
//! ```
//! use kvbind_runtime::{BindingRegistry, RegistryConfig};
//! use kvbind_core::{Record, Value};
//!
//! let registry = BindingRegistry::new(RegistryConfig::default());
//! let user = registry.insert(Record::new("User").with("name", "Alice"));
//! let doc = registry.insert(Record::new("Doc").with("user", user));
//! let label = registry.insert(Record::new("Label").with("title", Value::Null));
//!
//! registry.bind(label, "title", doc, "user.name").unwrap();
//! assert_eq!(registry.value(label, "title"), Some(Value::from("Alice")));
//!
//! registry.set_value(user, "name", "Bob").unwrap();
//! assert_eq!(registry.value(label, "title"), Some(Value::from("Bob")));
//!
//! registry.unbind(label, "title", doc, "user.name").unwrap();
//! registry.set_value(user, "name", "Carol").unwrap();
//! assert_eq!(registry.value(label, "title"), Some(Value::from("Bob")));
//! ```
//!
//! # Propagation
//!
//! Every mutation goes through the registry. A write that changes a value
//! enqueues its (object, key) link; the queue is drained FIFO, and each
//! binding observing a dequeued link re-reads its key path and writes the
//! result into its receiver. Those writes enqueue in turn, so chains of
//! bindings settle within one call.
//!
//! Each binding observes every link its key path currently traverses, so
//! replacing an intermediate object (`doc.user = other`) re-points the
//! binding at the new intermediate.
//!
//! # Invariants
//!
//! 1. At most one binding exists per (receiver, property, target, key path).
//! 2. Writing a value equal to the current one is a no-op: no propagation.
//!    Floats compare by bit pattern ([`Value::same_as`]).
//! 3. Bindings observing the same link are refreshed in registration order.
//! 4. Propagated writes per top-level call never exceed
//!    `max_propagation_steps`.
//! 5. Under [`ReferenceMode::WeakReference`] no binding outlives either of
//!    its endpoints.
//! 6. Under [`ReferenceMode::StrongReference`] a bound target stays
//!    readable until its last binding is removed.
//!
//! # Failure Modes
//!
//! - **Re-entrant access**: calling the registry from inside a
//!   [`KeyValue`] setter or a transform panics (`RefCell` borrow rules).
//!   Observer callbacks run after the borrow is released and may re-enter.
//! - **Setter rejection during propagation**: logged at `warn` and skipped;
//!   the originating mutation still succeeds.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use kvbind_core::{BindError, BindingId, KeyPath, KeyValue, KeyValueError, ObjectId, Value};
use tracing::{debug, trace, warn};

use crate::arena::{Link, ObjectStore, Release, ResolveError};
use crate::binding::{BindingGuard, TwoWayBinding};
use crate::config::{RebindPolicy, ReferenceMode, RegistryConfig};
use crate::observer::{Callback, ObserverEntry, Pending, Subscription, deliver};

/// Value transform applied between the key path and the bound property.
pub(crate) type Transform = Rc<dyn Fn(&Value) -> Value>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct TupleKey {
    receiver: ObjectId,
    property: String,
    target: ObjectId,
    key_path: String,
}

struct BindingEntry {
    id: BindingId,
    receiver: ObjectId,
    property: String,
    target: ObjectId,
    key_path: KeyPath,
    transform: Option<Transform>,
    links: Vec<Link>,
    retains_target: bool,
}

impl BindingEntry {
    fn tuple(&self) -> TupleKey {
        TupleKey {
            receiver: self.receiver,
            property: self.property.clone(),
            target: self.target,
            key_path: self.key_path.as_str().to_owned(),
        }
    }

    fn info(&self) -> BindingInfo {
        BindingInfo {
            id: self.id,
            receiver: self.receiver,
            property: self.property.clone(),
            target: self.target,
            key_path: self.key_path.as_str().to_owned(),
            retains_target: self.retains_target,
            mapped: self.transform.is_some(),
        }
    }
}

/// Snapshot of a registered binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingInfo {
    pub id: BindingId,
    pub receiver: ObjectId,
    pub property: String,
    pub target: ObjectId,
    pub key_path: String,
    /// Whether the binding holds a strong claim on its target.
    pub retains_target: bool,
    /// Whether a transform sits between key path and property.
    pub mapped: bool,
}

/// Something watching a link. Bindings and observers share one id space,
/// so sorting by raw id is sorting by registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Watcher {
    Binding(BindingId),
    Observer(u64),
}

impl Watcher {
    fn seq(self) -> u64 {
        match self {
            Self::Binding(id) => id.get(),
            Self::Observer(seq) => seq,
        }
    }
}

enum WriteOutcome {
    Changed,
    Unchanged,
    Stale,
}

/// Per-call propagation state.
struct Propagation {
    queue: VecDeque<Link>,
    steps: usize,
    limit: usize,
    /// Observer id -> latest value to deliver.
    pending: BTreeMap<u64, Value>,
}

impl Propagation {
    fn new(limit: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            steps: 0,
            limit,
            pending: BTreeMap::new(),
        }
    }
}

pub(crate) struct RegistryInner {
    config: RegistryConfig,
    store: ObjectStore,
    bindings: BTreeMap<BindingId, BindingEntry>,
    tuples: AHashMap<TupleKey, BindingId>,
    observers: BTreeMap<u64, ObserverEntry>,
    watchers: AHashMap<Link, Vec<Watcher>>,
    next_seq: u64,
}

impl RegistryInner {
    fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            store: ObjectStore::new(),
            bindings: BTreeMap::new(),
            tuples: AHashMap::new(),
            observers: BTreeMap::new(),
            watchers: AHashMap::new(),
            next_seq: 1,
        }
    }

    fn alloc_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // -- link index ---------------------------------------------------------

    fn wire(&mut self, watcher: Watcher, links: &[Link]) {
        for link in links {
            let list = self.watchers.entry(link.clone()).or_default();
            if !list.contains(&watcher) {
                list.push(watcher);
            }
        }
    }

    fn unwire(&mut self, watcher: Watcher, links: &[Link]) {
        for link in links {
            if let Some(list) = self.watchers.get_mut(link) {
                list.retain(|w| *w != watcher);
                if list.is_empty() {
                    self.watchers.remove(link);
                }
            }
        }
    }

    fn rewire(&mut self, watcher: Watcher, old: &[Link], new: &[Link]) {
        if old != new {
            self.unwire(watcher, old);
            self.wire(watcher, new);
        }
    }

    // -- writes -------------------------------------------------------------

    fn write_attribute(
        &mut self,
        object: ObjectId,
        key: &str,
        value: Value,
    ) -> Result<WriteOutcome, KeyValueError> {
        let Some(current) = self.store.get(object) else {
            return Ok(WriteOutcome::Stale);
        };
        match current.value_for_key(key) {
            None => {
                return Err(KeyValueError::UnknownKey {
                    key: key.to_owned(),
                });
            }
            Some(existing) if existing.same_as(&value) => return Ok(WriteOutcome::Unchanged),
            Some(_) => {}
        }
        if !current.is_settable(key) {
            return Err(KeyValueError::ReadOnly {
                key: key.to_owned(),
            });
        }
        self.store.write(object, key, value)?;
        Ok(WriteOutcome::Changed)
    }

    /// Whether writing `value` to `object.key` would land as a change.
    fn would_change(&self, object: ObjectId, key: &str, value: &Value) -> bool {
        self.store.get(object).is_some_and(|current| {
            current.is_settable(key)
                && current
                    .value_for_key(key)
                    .is_some_and(|existing| !existing.same_as(value))
        })
    }

    fn set(
        &mut self,
        object: ObjectId,
        key: &str,
        value: Value,
        prop: &mut Propagation,
    ) -> Result<(), BindError> {
        match self.write_attribute(object, key, value) {
            Ok(WriteOutcome::Changed) => {
                trace!(object = %object, key, "attribute changed");
                prop.queue.push_back(Link::new(object, key));
                Ok(())
            }
            Ok(WriteOutcome::Unchanged) => Ok(()),
            Ok(WriteOutcome::Stale) => Err(BindError::StaleObject(object)),
            Err(err) => Err(BindError::from_setter_error(key, &err)),
        }
    }

    fn set_at_path(
        &mut self,
        root: ObjectId,
        raw: &str,
        value: Value,
        prop: &mut Propagation,
    ) -> Result<(), BindError> {
        let path = parse_key_path(raw)?;
        let owner = self
            .store
            .resolve_owner(root, &path)
            .map_err(|err| resolve_error(raw, err))?;
        self.set(owner, path.last(), value, prop)
    }

    // -- propagation --------------------------------------------------------

    fn drain(&mut self, prop: &mut Propagation) -> Result<(), BindError> {
        while let Some(link) = prop.queue.pop_front() {
            let Some(list) = self.watchers.get(&link) else {
                continue;
            };
            let mut watchers = list.clone();
            watchers.sort_by_key(|w| w.seq());
            for watcher in watchers {
                match watcher {
                    Watcher::Binding(id) => self.refresh_binding(id, prop)?,
                    Watcher::Observer(seq) => self.refresh_observer(seq, prop),
                }
            }
        }
        Ok(())
    }

    /// Re-read a binding's key path and push the value into its receiver.
    fn refresh_binding(&mut self, id: BindingId, prop: &mut Propagation) -> Result<(), BindError> {
        let Some(entry) = self.bindings.get(&id) else {
            return Ok(());
        };
        let target = entry.target;
        let receiver = entry.receiver;
        let property = entry.property.clone();
        let key_path = entry.key_path.clone();
        let transform = entry.transform.clone();
        let old_links = entry.links.clone();

        let (resolution, err) = self.store.walk(target, &key_path);
        match err {
            Some(ResolveError::StaleRoot(_)) => return Ok(()),
            Some(err) => {
                warn!(
                    binding = %id,
                    key_path = %key_path,
                    error = %err,
                    "key path no longer resolves; propagating null"
                );
            }
            None => {}
        }

        self.rewire(Watcher::Binding(id), &old_links, &resolution.links);
        if let Some(entry) = self.bindings.get_mut(&id) {
            entry.links = resolution.links;
        }

        let value = match transform {
            Some(f) => f(&resolution.value),
            None => resolution.value,
        };
        self.push_to_receiver(id, receiver, &property, value, prop)
    }

    fn push_to_receiver(
        &mut self,
        id: BindingId,
        receiver: ObjectId,
        property: &str,
        value: Value,
        prop: &mut Propagation,
    ) -> Result<(), BindError> {
        if prop.steps >= prop.limit && self.would_change(receiver, property, &value) {
            warn!(
                binding = %id,
                limit = prop.limit,
                "propagation limit reached; stopping"
            );
            return Err(BindError::PropagationLimit { steps: prop.limit });
        }
        match self.write_attribute(receiver, property, value) {
            Ok(WriteOutcome::Changed) => {
                prop.steps += 1;
                trace!(binding = %id, receiver = %receiver, property, "propagated");
                prop.queue.push_back(Link::new(receiver, property));
            }
            Ok(WriteOutcome::Unchanged) => {}
            Ok(WriteOutcome::Stale) => {
                warn!(
                    binding = %id,
                    receiver = %receiver,
                    "receiver has been destroyed; skipping write"
                );
            }
            Err(err) => {
                warn!(
                    binding = %id,
                    receiver = %receiver,
                    property,
                    error = %err,
                    "receiver rejected propagated value"
                );
            }
        }
        Ok(())
    }

    fn refresh_observer(&mut self, seq: u64, prop: &mut Propagation) {
        let Some(entry) = self.observers.get(&seq) else {
            return;
        };
        if !entry.is_alive() {
            self.remove_observer(seq);
            return;
        }
        let (resolution, _) = self.store.walk(entry.target, &entry.key_path);
        let old_links = entry.links.clone();
        self.rewire(Watcher::Observer(seq), &old_links, &resolution.links);
        if let Some(entry) = self.observers.get_mut(&seq) {
            entry.links = resolution.links;
            if !entry.last.same_as(&resolution.value) {
                entry.last = resolution.value.clone();
                prop.pending.insert(seq, resolution.value);
            }
        }
    }

    fn take_pending(&mut self, prop: &mut Propagation) -> Vec<Pending> {
        let pending = std::mem::take(&mut prop.pending);
        pending
            .into_iter()
            .filter_map(|(seq, value)| {
                let callback = self.observers.get(&seq)?.callback()?;
                Some(Pending { callback, value })
            })
            .collect()
    }

    // -- registration -------------------------------------------------------

    /// Register a binding. The flag is `false` when an identical binding was
    /// kept under [`RebindPolicy::KeepExisting`].
    fn bind(
        &mut self,
        receiver: ObjectId,
        property: &str,
        target: ObjectId,
        raw: &str,
        transform: Option<Transform>,
        prop: &mut Propagation,
    ) -> Result<(BindingId, bool), BindError> {
        let key_path = parse_key_path(raw)?;
        if !self.store.is_live(receiver) {
            return Err(BindError::StaleObject(receiver));
        }
        if !self.store.is_live(target) {
            return Err(BindError::StaleObject(target));
        }
        if let Some(object) = self.store.get(receiver) {
            if !object.has_key(property) {
                let reason = format!("{} has no such key", object.type_name());
                return Err(BindError::unsettable(property, reason));
            }
            if !object.is_settable(property) {
                return Err(BindError::unsettable(property, "property is read-only"));
            }
        }
        let resolution = self
            .store
            .resolve(target, &key_path)
            .map_err(|err| resolve_error(raw, err))?;

        let tuple = TupleKey {
            receiver,
            property: property.to_owned(),
            target,
            key_path: raw.to_owned(),
        };
        if let Some(&existing) = self.tuples.get(&tuple) {
            match self.config.rebind_policy {
                RebindPolicy::KeepExisting => {
                    debug!(binding = %existing, "identical binding already registered; keeping it");
                    if self.config.initial_sync {
                        self.refresh_binding(existing, prop)?;
                    }
                    return Ok((existing, false));
                }
                RebindPolicy::Replace => {
                    self.remove_binding(existing, prop);
                    debug!(binding = %existing, "replacing identical binding");
                }
            }
        }

        let id = BindingId::new(self.alloc_seq());
        let retains_target = self.config.reference_mode == ReferenceMode::StrongReference;
        if retains_target {
            self.store.retain(target);
        }
        self.wire(Watcher::Binding(id), &resolution.links);
        self.tuples.insert(tuple, id);
        self.bindings.insert(
            id,
            BindingEntry {
                id,
                receiver,
                property: property.to_owned(),
                target,
                key_path,
                transform: transform.clone(),
                links: resolution.links,
                retains_target,
            },
        );
        debug!(
            binding = %id,
            receiver = %receiver,
            property,
            target = %target,
            key_path = raw,
            mode = %self.config.reference_mode,
            "bound property to key path"
        );

        if self.config.initial_sync {
            let value = match &transform {
                Some(f) => f(&resolution.value),
                None => resolution.value,
            };
            match self.write_attribute(receiver, property, value) {
                Ok(WriteOutcome::Changed) => {
                    prop.steps += 1;
                    prop.queue.push_back(Link::new(receiver, property));
                }
                Ok(WriteOutcome::Unchanged | WriteOutcome::Stale) => {}
                Err(err) => {
                    self.remove_binding(id, prop);
                    return Err(BindError::from_setter_error(property, &err));
                }
            }
        }
        Ok((id, true))
    }

    fn remove_binding(&mut self, id: BindingId, prop: &mut Propagation) -> Option<BindingEntry> {
        let entry = self.bindings.remove(&id)?;
        self.tuples.remove(&entry.tuple());
        self.unwire(Watcher::Binding(id), &entry.links);
        if entry.retains_target && self.store.drop_retain(entry.target) == Some(Release::Finalized)
        {
            debug!(
                object = %entry.target,
                "released object finalized after its last strong binding was removed"
            );
            self.on_finalized(entry.target, prop);
        }
        Some(entry)
    }

    fn unbind(
        &mut self,
        receiver: ObjectId,
        property: &str,
        target: ObjectId,
        raw: &str,
        prop: &mut Propagation,
    ) -> Result<(), BindError> {
        parse_key_path(raw)?;
        let tuple = TupleKey {
            receiver,
            property: property.to_owned(),
            target,
            key_path: raw.to_owned(),
        };
        match self.tuples.get(&tuple).copied() {
            Some(id) => {
                self.remove_binding(id, prop);
                debug!(binding = %id, property, key_path = raw, "unbound");
                Ok(())
            }
            None if self.config.strict_unbind => Err(BindError::NoSuchBinding {
                property: property.to_owned(),
                key_path: raw.to_owned(),
            }),
            None => {
                trace!(property, key_path = raw, "unbind of unregistered binding ignored");
                Ok(())
            }
        }
    }

    fn unbind_by_id(&mut self, id: BindingId, prop: &mut Propagation) -> Result<(), BindError> {
        match self.remove_binding(id, prop) {
            Some(_) => {
                debug!(binding = %id, "unbound");
                Ok(())
            }
            None if self.config.strict_unbind => Err(BindError::UnknownBinding(id)),
            None => Ok(()),
        }
    }

    fn observe(
        &mut self,
        target: ObjectId,
        raw: &str,
        callback: &Callback,
    ) -> Result<u64, BindError> {
        let key_path = parse_key_path(raw)?;
        if !self.store.is_live(target) {
            return Err(BindError::StaleObject(target));
        }
        let resolution = self
            .store
            .resolve(target, &key_path)
            .map_err(|err| resolve_error(raw, err))?;
        let seq = self.alloc_seq();
        self.wire(Watcher::Observer(seq), &resolution.links);
        self.observers.insert(
            seq,
            ObserverEntry::new(
                target,
                key_path,
                resolution.links,
                resolution.value,
                callback,
            ),
        );
        Ok(seq)
    }

    fn remove_observer(&mut self, seq: u64) {
        if let Some(entry) = self.observers.remove(&seq) {
            self.unwire(Watcher::Observer(seq), &entry.links);
        }
    }

    // -- lifetime -----------------------------------------------------------

    fn destroy(&mut self, id: ObjectId, prop: &mut Propagation) -> Result<(), BindError> {
        if !self.store.is_live(id) {
            return Err(BindError::StaleObject(id));
        }
        if self.config.reference_mode == ReferenceMode::WeakReference {
            let doomed: Vec<BindingId> = self
                .bindings
                .values()
                .filter(|b| b.target == id || b.receiver == id)
                .map(|b| b.id)
                .collect();
            for binding in doomed {
                self.remove_binding(binding, prop);
                debug!(binding = %binding, object = %id, "binding invalidated: endpoint destroyed");
            }
        }
        match self.store.release(id) {
            Some(Release::Finalized) => {
                debug!(object = %id, "object destroyed");
                self.on_finalized(id, prop);
            }
            Some(Release::Deferred { retains }) => {
                warn!(
                    object = %id,
                    retains,
                    "object released while strong bindings retain it; it stays alive until they are unbound"
                );
            }
            None => return Err(BindError::StaleObject(id)),
        }
        Ok(())
    }

    /// The slot behind `id` is gone: drop observers rooted there and
    /// re-evaluate everything that walked through it.
    fn on_finalized(&mut self, id: ObjectId, prop: &mut Propagation) {
        let rooted: Vec<u64> = self
            .observers
            .iter()
            .filter(|(_, o)| o.target == id)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in rooted {
            self.remove_observer(seq);
        }
        let mut through: Vec<Link> = self
            .watchers
            .keys()
            .filter(|link| link.object == id)
            .cloned()
            .collect();
        through.sort_by(|a, b| a.key.cmp(&b.key));
        prop.queue.extend(through);
    }

    fn leaked(&self) -> Vec<BindingInfo> {
        self.bindings
            .values()
            .filter(|b| self.store.is_released(b.target) || !self.store.contains(b.receiver))
            .map(BindingEntry::info)
            .collect()
    }
}

fn parse_key_path(raw: &str) -> Result<KeyPath, BindError> {
    KeyPath::parse(raw).map_err(|err| BindError::from_key_path_error(raw, &err))
}

fn resolve_error(raw: &str, err: ResolveError) -> BindError {
    match err {
        ResolveError::StaleRoot(id) => BindError::StaleObject(id),
        other => BindError::unresolvable(raw, other),
    }
}

// ---------------------------------------------------------------------------
// BindingRegistry: shared handle
// ---------------------------------------------------------------------------

/// Shared handle to a binding registry and the objects it manages.
///
/// Cloning creates another handle to the **same** registry.
#[derive(Clone)]
pub struct BindingRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl Default for BindingRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for BindingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("BindingRegistry")
            .field("reference_mode", &inner.config.reference_mode)
            .field("objects", &inner.store.len())
            .field("bindings", &inner.bindings.len())
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl BindingRegistry {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        debug!(
            mode = %config.reference_mode,
            rebind = ?config.rebind_policy,
            strict_unbind = config.strict_unbind,
            "binding registry created"
        );
        Self {
            inner: Rc::new(RefCell::new(RegistryInner::new(config))),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<RegistryInner>> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<RefCell<RegistryInner>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Run one top-level operation: mutate, drain propagation, then deliver
    /// observer callbacks outside the borrow.
    fn run<T>(
        &self,
        op: impl FnOnce(&mut RegistryInner, &mut Propagation) -> Result<T, BindError>,
    ) -> Result<T, BindError> {
        let (result, pending) = {
            let mut inner = self.inner.borrow_mut();
            let mut prop = Propagation::new(inner.config.max_propagation_steps);
            let result = match op(&mut *inner, &mut prop) {
                Ok(value) => inner.drain(&mut prop).map(|()| value),
                Err(err) => Err(err),
            };
            let pending = inner.take_pending(&mut prop);
            (result, pending)
        };
        deliver(pending);
        result
    }

    /// Configuration this registry was built with.
    #[must_use]
    pub fn config(&self) -> RegistryConfig {
        self.inner.borrow().config.clone()
    }

    // -- objects ------------------------------------------------------------

    /// Move an object into the registry's arena.
    pub fn insert(&self, object: impl KeyValue + 'static) -> ObjectId {
        self.insert_boxed(Box::new(object))
    }

    pub fn insert_boxed(&self, object: Box<dyn KeyValue>) -> ObjectId {
        let id = self.inner.borrow_mut().store.insert(object);
        trace!(object = %id, "object inserted");
        id
    }

    /// Destroy an object.
    ///
    /// Weak mode: every binding with this object as target or receiver is
    /// removed first. Strong mode: if bindings retain the object it is only
    /// marked released and stays readable until they are unbound.
    /// Bindings whose key path walks *through* the object see `Null`.
    pub fn destroy(&self, id: ObjectId) -> Result<(), BindError> {
        self.run(|inner, prop| inner.destroy(id, prop))
    }

    /// Whether the object exists and has not been destroyed by its owner.
    #[must_use]
    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.inner.borrow().store.is_live(id)
    }

    /// Number of strong-binding claims on `id`.
    #[must_use]
    pub fn retain_count(&self, id: ObjectId) -> u32 {
        self.inner.borrow().store.retain_count(id)
    }

    /// Number of objects in the arena, including released-but-retained ones.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.inner.borrow().store.len()
    }

    /// Borrow an object for the duration of `f`.
    ///
    /// `f` must not call back into the registry.
    pub fn with_object<R>(&self, id: ObjectId, f: impl FnOnce(&dyn KeyValue) -> R) -> Option<R> {
        let inner = self.inner.borrow();
        inner.store.get(id).map(f)
    }

    // -- values -------------------------------------------------------------

    /// Read one attribute. `None` for stale handles and unknown keys.
    #[must_use]
    pub fn value(&self, id: ObjectId, key: &str) -> Option<Value> {
        self.inner.borrow().store.value(id, key)
    }

    /// Read the value at a key path.
    pub fn value_at_path(&self, root: ObjectId, key_path: &str) -> Result<Value, BindError> {
        let path = parse_key_path(key_path)?;
        let inner = self.inner.borrow();
        inner
            .store
            .resolve(root, &path)
            .map(|res| res.value)
            .map_err(|err| resolve_error(key_path, err))
    }

    /// Write one attribute and propagate the change.
    pub fn set_value(
        &self,
        id: ObjectId,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), BindError> {
        let value = value.into();
        self.run(|inner, prop| inner.set(id, key, value, prop))
    }

    /// Write the attribute at the end of a key path and propagate.
    pub fn set_value_at_path(
        &self,
        root: ObjectId,
        key_path: &str,
        value: impl Into<Value>,
    ) -> Result<(), BindError> {
        let value = value.into();
        self.run(|inner, prop| inner.set_at_path(root, key_path, value, prop))
    }

    // -- bindings -----------------------------------------------------------

    /// Bind `receiver.property` to `key_path` on `target`.
    ///
    /// The property is set to the current key-path value immediately
    /// (unless `initial_sync` is off), then follows every change.
    ///
    /// # Errors
    ///
    /// - [`BindError::InvalidKeyPath`] if `key_path` does not parse or
    ///   names an attribute `target` (or an object along the path) lacks.
    /// - [`BindError::InvalidProperty`] if `property` is unknown,
    ///   read-only, or rejects the initial value.
    /// - [`BindError::StaleObject`] if either endpoint is destroyed.
    pub fn bind(
        &self,
        receiver: ObjectId,
        property: &str,
        target: ObjectId,
        key_path: &str,
    ) -> Result<BindingId, BindError> {
        self.bind_with(receiver, property, target, key_path, None)
    }

    /// Bind with a transform applied to each value before it is written.
    pub fn bind_mapped(
        &self,
        receiver: ObjectId,
        property: &str,
        target: ObjectId,
        key_path: &str,
        transform: impl Fn(&Value) -> Value + 'static,
    ) -> Result<BindingId, BindError> {
        self.bind_with(receiver, property, target, key_path, Some(Rc::new(transform)))
    }

    fn bind_with(
        &self,
        receiver: ObjectId,
        property: &str,
        target: ObjectId,
        key_path: &str,
        transform: Option<Transform>,
    ) -> Result<BindingId, BindError> {
        self.run(|inner, prop| {
            let (id, created) = inner.bind(receiver, property, target, key_path, transform, prop)?;
            if let Err(err) = inner.drain(prop) {
                if created {
                    inner.remove_binding(id, prop);
                }
                return Err(err);
            }
            Ok(id)
        })
    }

    /// Remove the binding of `receiver.property` to `key_path` on `target`.
    ///
    /// A missing binding is ignored unless `strict_unbind` is set, in which
    /// case [`BindError::NoSuchBinding`] is returned.
    pub fn unbind(
        &self,
        receiver: ObjectId,
        property: &str,
        target: ObjectId,
        key_path: &str,
    ) -> Result<(), BindError> {
        self.run(|inner, prop| inner.unbind(receiver, property, target, key_path, prop))
    }

    /// Remove a binding by id, with the same missing-binding policy.
    pub fn unbind_by_id(&self, id: BindingId) -> Result<(), BindError> {
        self.run(|inner, prop| inner.unbind_by_id(id, prop))
    }

    /// Keep `a.prop_a` and `b.prop_b` in sync. `b` first takes `a`'s value.
    ///
    /// Dropping the returned [`TwoWayBinding`] removes both directions.
    pub fn bind_two_way(
        &self,
        a: ObjectId,
        prop_a: &str,
        b: ObjectId,
        prop_b: &str,
    ) -> Result<TwoWayBinding, BindError> {
        let forward = self.bind(b, prop_b, a, prop_a)?;
        let backward = match self.bind(a, prop_a, b, prop_b) {
            Ok(id) => id,
            Err(err) => {
                if let Err(rollback) = self.unbind_by_id(forward) {
                    warn!(
                        binding = %forward,
                        error = %rollback,
                        "rolling back two-way binding failed"
                    );
                }
                return Err(err);
            }
        };
        Ok(TwoWayBinding::new(self.guard(forward), self.guard(backward)))
    }

    /// Wrap an existing binding in a guard that unbinds it on drop.
    pub fn guard(&self, id: BindingId) -> BindingGuard {
        BindingGuard::new(self, id)
    }

    /// Observe `key_path` on `target`. The callback receives each new value.
    pub fn observe(
        &self,
        target: ObjectId,
        key_path: &str,
        callback: impl Fn(&Value) + 'static,
    ) -> Result<Subscription, BindError> {
        let strong: Callback = Rc::new(callback);
        self.inner
            .borrow_mut()
            .observe(target, key_path, &strong)?;
        Ok(Subscription::new(strong))
    }

    /// Drop observer entries whose subscriptions are gone.
    pub fn prune(&self) -> usize {
        let mut inner = self.inner.borrow_mut();
        let dead: Vec<u64> = inner
            .observers
            .iter()
            .filter(|(_, o)| !o.is_alive())
            .map(|(seq, _)| *seq)
            .collect();
        for seq in &dead {
            inner.remove_observer(*seq);
        }
        dead.len()
    }

    // -- introspection ------------------------------------------------------

    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.inner.borrow().bindings.len()
    }

    /// Number of observer entries, including dead ones not yet pruned.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.borrow().observers.len()
    }

    #[must_use]
    pub fn binding(&self, id: BindingId) -> Option<BindingInfo> {
        self.inner.borrow().bindings.get(&id).map(BindingEntry::info)
    }

    /// Whether the exact tuple is bound.
    #[must_use]
    pub fn is_bound(
        &self,
        receiver: ObjectId,
        property: &str,
        target: ObjectId,
        key_path: &str,
    ) -> bool {
        let tuple = TupleKey {
            receiver,
            property: property.to_owned(),
            target,
            key_path: key_path.to_owned(),
        };
        self.inner.borrow().tuples.contains_key(&tuple)
    }

    /// All bindings, in registration order.
    #[must_use]
    pub fn bindings(&self) -> Vec<BindingInfo> {
        self.inner
            .borrow()
            .bindings
            .values()
            .map(BindingEntry::info)
            .collect()
    }

    /// Bindings whose receiver is `receiver`, in registration order.
    #[must_use]
    pub fn bindings_for(&self, receiver: ObjectId) -> Vec<BindingInfo> {
        self.inner
            .borrow()
            .bindings
            .values()
            .filter(|b| b.receiver == receiver)
            .map(BindingEntry::info)
            .collect()
    }

    /// Bindings that keep a released target alive or point at a destroyed
    /// receiver. Only strong-mode registries can accumulate these.
    #[must_use]
    pub fn leaked_bindings(&self) -> Vec<BindingInfo> {
        self.inner.borrow().leaked()
    }
}
