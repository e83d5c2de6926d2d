#![forbid(unsafe_code)]

//! Generation-checked object arena.
//!
//! Objects live in slots addressed by [`ObjectId`]. Destroying an object
//! advances its slot's generation, so outstanding handles become stale
//! rather than dangling: every lookup through a stale handle returns
//! `None`. Freed slots are reused.
//!
//! # Retains
//!
//! A slot carries a retain count used by strong-reference bindings.
//! [`ObjectStore::release`] on a retained object only marks it released;
//! the slot is finalized when the last retain is dropped. Until then the
//! object keeps answering reads and writes, but [`ObjectStore::is_live`]
//! reports it as gone from its owner's point of view.
//!
//! # Invariants
//!
//! 1. A handle is valid iff its generation equals its slot's generation and
//!    the slot is occupied.
//! 2. A finalized slot's generation is strictly advanced before reuse.
//! 3. `len()` counts occupied slots, including released-but-retained ones.

use kvbind_core::{KeyPath, KeyValue, KeyValueError, ObjectId, Value, ValueKind};
use thiserror::Error;

/// One observed step of a key path: attribute `key` on `object`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Link {
    pub object: ObjectId,
    pub key: String,
}

impl Link {
    #[must_use]
    pub fn new(object: ObjectId, key: impl Into<String>) -> Self {
        Self {
            object,
            key: key.into(),
        }
    }
}

/// Result of walking a key path.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    /// Value at the end of the path, or `Null` if an intermediate link is
    /// `Null` or points at a destroyed object.
    pub value: Value,
    /// The (object, key) pairs visited, root first.
    pub links: Vec<Link>,
}

impl Resolution {
    fn null(links: Vec<Link>) -> Self {
        Self {
            value: Value::Null,
            links,
        }
    }
}

/// Why a key path could not be walked.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("root object {0} has been destroyed")]
    StaleRoot(ObjectId),
    #[error("{type_name} has no key {key:?}")]
    UnknownKey { key: String, type_name: String },
    #[error("key {key:?} holds {found}, not an object")]
    NotAnObject { key: String, found: ValueKind },
}

/// Outcome of [`ObjectStore::release`] and [`ObjectStore::drop_retain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    /// The slot was freed; handles to it are now stale.
    Finalized,
    /// The object is still retained by this many claims.
    Deferred { retains: u32 },
}

struct Entry {
    object: Box<dyn KeyValue>,
    retains: u32,
    released: bool,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Arena of [`KeyValue`] objects.
#[derive(Default)]
pub struct ObjectStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("len", &self.len)
            .field("capacity", &self.slots.len())
            .field("free", &self.free.len())
            .finish()
    }
}

impl ObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store an object and return its handle.
    pub fn insert(&mut self, object: Box<dyn KeyValue>) -> ObjectId {
        let entry = Entry {
            object,
            retains: 0,
            released: false,
        };
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return ObjectId::from_parts(index, slot.generation);
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        ObjectId::from_parts(index, 0)
    }

    fn entry(&self, id: ObjectId) -> Option<&Entry> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: ObjectId) -> Option<&mut Entry> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Whether the handle addresses an occupied slot (released or not).
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entry(id).is_some()
    }

    /// Whether the object exists and has not been released by its owner.
    #[must_use]
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.entry(id).is_some_and(|e| !e.released)
    }

    /// Whether the owner released the object while retains kept it alive.
    #[must_use]
    pub fn is_released(&self, id: ObjectId) -> bool {
        self.entry(id).is_some_and(|e| e.released)
    }

    /// Borrow an object. Released-but-retained objects are still readable.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&dyn KeyValue> {
        self.entry(id).map(|e| &*e.object)
    }

    /// Read one attribute. `None` if the handle is stale or the key unknown.
    #[must_use]
    pub fn value(&self, id: ObjectId, key: &str) -> Option<Value> {
        self.get(id)?.value_for_key(key)
    }

    /// Write one attribute without any change notification.
    ///
    /// Returns `Ok(None)` if the handle is stale, `Ok(Some(old))` on success.
    pub fn write(
        &mut self,
        id: ObjectId,
        key: &str,
        value: Value,
    ) -> Result<Option<Value>, KeyValueError> {
        let Some(entry) = self.entry_mut(id) else {
            return Ok(None);
        };
        let Some(old) = entry.object.value_for_key(key) else {
            return Err(KeyValueError::UnknownKey {
                key: key.to_owned(),
            });
        };
        entry.object.set_value_for_key(key, value)?;
        Ok(Some(old))
    }

    /// Add a retain to a live object. Returns false for stale handles.
    pub fn retain(&mut self, id: ObjectId) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.retains += 1;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn retain_count(&self, id: ObjectId) -> u32 {
        self.entry(id).map_or(0, |e| e.retains)
    }

    /// Drop one retain. Finalizes the object if it was released and this
    /// was the last retain. `None` for stale handles.
    pub fn drop_retain(&mut self, id: ObjectId) -> Option<Release> {
        let entry = self.entry_mut(id)?;
        entry.retains = entry.retains.saturating_sub(1);
        let retains = entry.retains;
        if retains == 0 && entry.released {
            self.finalize(id);
            return Some(Release::Finalized);
        }
        Some(Release::Deferred { retains })
    }

    /// Owner-side release. Finalizes immediately when unretained.
    /// `None` for stale or already-released handles.
    pub fn release(&mut self, id: ObjectId) -> Option<Release> {
        let entry = self.entry_mut(id)?;
        if entry.released {
            return None;
        }
        entry.released = true;
        let retains = entry.retains;
        if retains == 0 {
            self.finalize(id);
            return Some(Release::Finalized);
        }
        Some(Release::Deferred { retains })
    }

    fn finalize(&mut self, id: ObjectId) {
        let slot = &mut self.slots[id.index() as usize];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.len -= 1;
    }

    /// Walk `path` from `root`, recording every (object, key) step.
    ///
    /// A `Null` link or a destroyed intermediate object ends the walk with
    /// a `Null` value; that is not an error, since the path may become
    /// valid later. Unknown keys and non-object intermediates are errors.
    pub fn resolve(&self, root: ObjectId, path: &KeyPath) -> Result<Resolution, ResolveError> {
        match self.walk(root, path) {
            (resolution, None) => Ok(resolution),
            (_, Some(err)) => Err(err),
        }
    }

    /// Like [`resolve`](Self::resolve), but never fails: an unresolvable
    /// path yields `Null` together with the links visited before the
    /// failing segment, so the caller can keep observing them.
    pub fn walk(&self, root: ObjectId, path: &KeyPath) -> (Resolution, Option<ResolveError>) {
        let mut links = Vec::with_capacity(path.len());
        let mut value = Value::Object(root);
        let mut previous_key: Option<&str> = None;

        for key in path.segments() {
            let current = match value {
                Value::Object(id) => id,
                Value::Null => break,
                other => {
                    let err = ResolveError::NotAnObject {
                        key: previous_key.unwrap_or_default().to_owned(),
                        found: other.kind(),
                    };
                    return (Resolution::null(links), Some(err));
                }
            };
            let Some(object) = self.get(current) else {
                let err = previous_key
                    .is_none()
                    .then_some(ResolveError::StaleRoot(root));
                return (Resolution::null(links), err);
            };
            links.push(Link::new(current, key));
            let Some(next) = object.value_for_key(key) else {
                let err = ResolveError::UnknownKey {
                    key: key.to_owned(),
                    type_name: object.type_name().to_owned(),
                };
                return (Resolution::null(links), Some(err));
            };
            value = next;
            previous_key = Some(key);
        }

        (Resolution { value, links }, None)
    }

    /// Resolve every segment but the last to an object handle.
    ///
    /// Used to address the object that owns the final attribute of a path.
    pub fn resolve_owner(&self, root: ObjectId, path: &KeyPath) -> Result<ObjectId, ResolveError> {
        let Some(parent) = path.parent() else {
            if !self.contains(root) {
                return Err(ResolveError::StaleRoot(root));
            }
            return Ok(root);
        };
        let resolution = self.resolve(root, &parent)?;
        match resolution.value {
            Value::Object(id) if self.contains(id) => Ok(id),
            other => Err(ResolveError::NotAnObject {
                key: parent.last().to_owned(),
                found: other.kind(),
            }),
        }
    }
}
