//! Per-process handle tables.
//!
//! A [`HandleTable`] maps the handles a process knows about to counted references of kernel
//! objects. Each table entry owns one [`ObjectRef`], so closing a handle releases exactly that
//! reference and leaves every other holder untouched.
//!
//! # Handle encoding
//!
//! ```text
//! Bits 0-14:  generation (never 0)
//! Bits 15-26: slot index
//! ```
//!
//! The generation counter advances on every allocation, so a closed handle whose slot is later
//! reused no longer resolves. Pseudo-handles and `0` can never be produced by a table.

use alloc::vec::Vec;

use spin::Mutex;

use crate::{
    arena::ObjectRef,
    handle::Handle,
    object::ObjectId,
    result::{ERR_INVALID_HANDLE, ERR_OUT_OF_HANDLES, ResultCode, ToRawResultCode},
};

const SLOT_SHIFT: u32 = 15;
const GENERATION_MASK: u32 = (1 << SLOT_SHIFT) - 1;

struct Slot {
    generation: u16,
    object: Option<ObjectRef>,
}

struct Slots {
    slots: Vec<Slot>,
    free: Vec<u16>,
    next_generation: u16,
    live: usize,
}

impl Slots {
    fn lookup(&self, handle: Handle) -> Option<usize> {
        let raw = handle.to_raw();
        let index = (raw >> SLOT_SHIFT) as usize;
        let generation = (raw & GENERATION_MASK) as u16;

        let slot = self.slots.get(index)?;
        (slot.object.is_some() && slot.generation == generation).then_some(index)
    }

    fn allocate(&mut self, object: ObjectRef) -> Result<Handle, HandleTableError> {
        let index = match self.free.pop() {
            Some(index) => index as usize,
            None if self.slots.len() < HandleTable::MAX_COUNT => {
                self.slots.push(Slot {
                    generation: 0,
                    object: None,
                });
                self.slots.len() - 1
            }
            None => return Err(HandleTableError::OutOfHandles),
        };

        let generation = self.next_generation;
        self.next_generation = if generation as u32 >= GENERATION_MASK {
            1
        } else {
            generation + 1
        };

        self.slots[index] = Slot {
            generation,
            object: Some(object),
        };
        self.live += 1;

        Ok(Handle::from_raw(
            ((index as u32) << SLOT_SHIFT) | generation as u32,
        ))
    }

    fn remove(&mut self, index: usize) -> Option<ObjectRef> {
        let object = self.slots[index].object.take()?;
        self.free.push(index as u16);
        self.live -= 1;
        Some(object)
    }
}

/// A process's namespace of kernel-object handles.
pub struct HandleTable {
    inner: Mutex<Slots>,
}

impl HandleTable {
    /// Maximum number of live handles in one table.
    pub const MAX_COUNT: usize = 4096;

    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Slots {
                slots: Vec::new(),
                free: Vec::new(),
                next_generation: 1,
                live: 0,
            }),
        }
    }

    /// Creates a handle owning `object`.
    ///
    /// On failure the reference is dropped.
    pub fn create(&self, object: ObjectRef) -> Result<Handle, HandleTableError> {
        let id = object.id();
        let result = self.inner.lock().allocate(object);
        match result {
            Ok(handle) => log::debug!("Created handle {handle} for object {id:?}"),
            Err(_) => log::warn!("Handle table full, cannot create handle for object {id:?}"),
        }
        result
    }

    /// Creates a second handle to the object named by `handle`.
    pub fn duplicate(&self, handle: Handle) -> Result<Handle, HandleTableError> {
        let mut inner = self.inner.lock();
        let index = inner
            .lookup(handle)
            .ok_or(HandleTableError::NotFound(handle))?;
        let object = inner.slots[index]
            .object
            .clone()
            .ok_or(HandleTableError::NotFound(handle))?;
        inner.allocate(object)
    }

    /// Closes `handle`, releasing the table's reference to its object.
    pub fn close(&self, handle: Handle) -> Result<(), HandleTableError> {
        match self.take(handle) {
            Some(object) => {
                log::debug!("Closed handle {handle} (object {:?})", object.id());
                drop(object);
                Ok(())
            }
            None => {
                log::debug!("Close of invalid handle {handle}");
                Err(HandleTableError::NotFound(handle))
            }
        }
    }

    /// Closes `handle` and hands its reference to the caller instead of releasing it.
    ///
    /// The object's reference count is unchanged.
    pub fn take(&self, handle: Handle) -> Option<ObjectRef> {
        let mut inner = self.inner.lock();
        let index = inner.lookup(handle)?;
        inner.remove(index)
    }

    /// Returns the object named by `handle`. Does not change any reference count.
    ///
    /// Pseudo-handles are not resolved here, see [`PseudoHandle`](crate::handle::PseudoHandle).
    pub fn get(&self, handle: Handle) -> Option<ObjectId> {
        let inner = self.inner.lock();
        let index = inner.lookup(handle)?;
        inner.slots[index].object.as_ref().map(ObjectRef::id)
    }

    /// Returns a new counted reference to the object named by `handle`.
    pub fn acquire(&self, handle: Handle) -> Option<ObjectRef> {
        let inner = self.inner.lock();
        let index = inner.lookup(handle)?;
        inner.slots[index].object.clone()
    }

    pub fn is_valid(&self, handle: Handle) -> bool {
        self.inner.lock().lookup(handle).is_some()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.inner.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every handle in the table.
    pub fn clear(&self) {
        let released: Vec<ObjectRef> = {
            let mut inner = self.inner.lock();
            let count = inner.slots.len();
            (0..count).filter_map(|index| inner.remove(index)).collect()
        };
        log::debug!("Cleared handle table ({} handles)", released.len());
        drop(released);
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandleTable")
            .field("len", &self.len())
            .finish()
    }
}

/// Error returned by [`HandleTable`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandleTableError {
    /// The handle does not name a live entry.
    #[error("Handle {0} not found")]
    NotFound(Handle),
    /// The table has no free slot.
    #[error("Out of handles")]
    OutOfHandles,
}

impl ToRawResultCode for HandleTableError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::NotFound(_) => ERR_INVALID_HANDLE,
            Self::OutOfHandles => ERR_OUT_OF_HANDLES,
        }
    }
}
