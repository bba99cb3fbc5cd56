//! Reference-counted storage for kernel objects.
//!
//! The arena is the single owner of every [`KernelObject`]. Everything else refers to an object by
//! [`ObjectId`] and keeps it alive by holding an [`ObjectRef`]: cloning a reference increments the
//! entry's count, dropping it decrements the count, and the object is destroyed when the count
//! reaches zero.
//!
//! # Locking
//!
//! Entries are stored behind a [`spin::RwLock`]. Count updates only need the read lock, since the
//! counts are atomics; insertion and destruction take the write lock. An entry whose count reached
//! zero is unreachable (nobody holds a reference that could be cloned), so removing it after
//! upgrading the lock cannot race with a concurrent increment.

use alloc::{collections::BTreeMap, sync::Arc};
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use spin::RwLock;

use crate::object::{KernelObject, ObjectId, ObjectKind};

struct Entry {
    object: KernelObject,
    refs: AtomicU32,
}

/// Kernel-wide object storage.
pub struct ObjectArena {
    entries: RwLock<BTreeMap<ObjectId, Entry>>,
    next_id: AtomicU64,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Stores `object` and returns the first reference to it.
    pub fn insert(self: &Arc<Self>, object: KernelObject) -> ObjectRef {
        let id = ObjectId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        log::debug!("Creating {:?} object {:?} ({})", object.kind(), id, object.name());

        self.entries.write().insert(
            id,
            Entry {
                object,
                refs: AtomicU32::new(1),
            },
        );

        ObjectRef {
            arena: Arc::clone(self),
            id,
        }
    }

    /// Runs `f` against the object, if it is still alive.
    pub fn with<R>(&self, id: ObjectId, f: impl FnOnce(&KernelObject) -> R) -> Option<R> {
        self.entries.read().get(&id).map(|entry| f(&entry.object))
    }

    pub fn kind(&self, id: ObjectId) -> Option<ObjectKind> {
        self.with(id, KernelObject::kind)
    }

    /// Returns the number of live references to the object, `0` once destroyed.
    pub fn ref_count(&self, id: ObjectId) -> u32 {
        self.entries
            .read()
            .get(&id)
            .map_or(0, |entry| entry.refs.load(Ordering::Acquire))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn retain(&self, id: ObjectId) {
        let entries = self.entries.read();
        let entry = entries.get(&id);
        debug_assert!(entry.is_some(), "retain of destroyed object {id:?}");
        if let Some(entry) = entry {
            entry.refs.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn release(&self, id: ObjectId) {
        let last = {
            let entries = self.entries.read();
            match entries.get(&id) {
                Some(entry) => entry.refs.fetch_sub(1, Ordering::AcqRel) == 1,
                None => false,
            }
        };
        if !last {
            return;
        }

        let removed = {
            let mut entries = self.entries.write();
            match entries.get(&id) {
                Some(entry) if entry.refs.load(Ordering::Acquire) == 0 => entries.remove(&id),
                _ => None,
            }
        };

        // Destroy outside the lock
        if let Some(entry) = removed {
            log::debug!(
                "Destroying {:?} object {:?} ({})",
                entry.object.kind(),
                id,
                entry.object.name()
            );
            drop(entry);
        }
    }
}

impl Default for ObjectArena {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ObjectArena {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObjectArena")
            .field("len", &self.len())
            .finish()
    }
}

/// An owned, counted reference to an arena object.
pub struct ObjectRef {
    arena: Arc<ObjectArena>,
    id: ObjectId,
}

impl ObjectRef {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn arena(&self) -> &Arc<ObjectArena> {
        &self.arena
    }

    /// Runs `f` against the referenced object.
    ///
    /// The reference keeps the object alive, so this always finds it.
    pub fn with<R>(&self, f: impl FnOnce(&KernelObject) -> R) -> Option<R> {
        self.arena.with(self.id, f)
    }

    pub fn kind(&self) -> Option<ObjectKind> {
        self.arena.kind(self.id)
    }

    pub fn ref_count(&self) -> u32 {
        self.arena.ref_count(self.id)
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        self.arena.retain(self.id);
        Self {
            arena: Arc::clone(&self.arena),
            id: self.id,
        }
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        self.arena.release(self.id);
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.arena, &other.arena) && self.id == other.id
    }
}

impl Eq for ObjectRef {}

impl core::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Event, ResetType};

    fn event(arena: &Arc<ObjectArena>) -> ObjectRef {
        arena.insert(KernelObject::Event(Event::new("ev", ResetType::OneShot)))
    }

    #[test]
    fn clone_and_drop_track_count() {
        let arena = Arc::new(ObjectArena::new());
        let first = event(&arena);
        let id = first.id();
        assert_eq!(arena.ref_count(id), 1);

        let second = first.clone();
        assert_eq!(arena.ref_count(id), 2);

        drop(first);
        assert_eq!(arena.ref_count(id), 1);
        assert!(arena.contains(id));

        drop(second);
        assert_eq!(arena.ref_count(id), 0);
        assert!(!arena.contains(id));
        assert!(arena.is_empty());
    }

    #[test]
    fn ids_are_not_reused() {
        let arena = Arc::new(ObjectArena::new());
        let first = event(&arena);
        let stale = first.id();
        drop(first);

        let second = event(&arena);
        assert_ne!(second.id(), stale);
        assert_eq!(arena.kind(stale), None);
        assert_eq!(arena.kind(second.id()), Some(ObjectKind::Event));
    }

    #[test]
    fn with_sees_object_state() {
        let arena = Arc::new(ObjectArena::new());
        let ev = event(&arena);

        ev.with(|obj| obj.as_event().unwrap().signal());
        assert_eq!(ev.with(|obj| obj.should_wait()), Some(false));
    }
}
