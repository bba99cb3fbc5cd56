//! Kernel objects.
//!
//! Every capability a handle can name is one variant of [`KernelObject`]. Objects live in the
//! [`ObjectArena`](crate::arena::ObjectArena) and are addressed by [`ObjectId`]; handle tables and
//! the rest of the kernel only ever hold identifiers plus a reference count, never the object.

use alloc::{string::String, vec, vec::Vec};
use core::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use spin::Mutex;

use crate::{
    memory::MemoryError,
    result::{ERR_OUT_OF_RANGE_KERNEL, ResultCode, ToRawResultCode},
};

/// Stable identifier of an object in the arena.
///
/// Identifiers are never reused, so a stale id resolves to nothing rather than to a newer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier value.
    #[inline]
    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

/// Kind tag of a [`KernelObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Event,
    Semaphore,
    SharedMemory,
    Thread,
    Process,
    ClientSession,
    ServerSession,
}

/// A capability-bearing kernel entity.
#[derive(Debug)]
pub enum KernelObject {
    Event(Event),
    Semaphore(Semaphore),
    SharedMemory(SharedMemory),
    Thread(ThreadInfo),
    Process(ProcessInfo),
    Session(Session),
}

impl KernelObject {
    /// Returns the kind tag of this object.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Event(_) => ObjectKind::Event,
            Self::Semaphore(_) => ObjectKind::Semaphore,
            Self::SharedMemory(_) => ObjectKind::SharedMemory,
            Self::Thread(_) => ObjectKind::Thread,
            Self::Process(_) => ObjectKind::Process,
            Self::Session(session) => match session.endpoint {
                SessionEndpoint::Client => ObjectKind::ClientSession,
                SessionEndpoint::Server => ObjectKind::ServerSession,
            },
        }
    }

    /// Returns the human-readable debug name.
    pub fn name(&self) -> &str {
        match self {
            Self::Event(event) => &event.name,
            Self::Semaphore(semaphore) => &semaphore.name,
            Self::SharedMemory(shmem) => &shmem.name,
            Self::Thread(thread) => &thread.name,
            Self::Process(process) => &process.name,
            Self::Session(session) => &session.name,
        }
    }

    /// Returns `true` if threads can wait on this object.
    pub fn is_waitable(&self) -> bool {
        matches!(
            self,
            Self::Event(_) | Self::Semaphore(_) | Self::Thread(_) | Self::Process(_)
        )
    }

    /// Returns `true` if a waiter would block on this object right now.
    ///
    /// Objects that cannot be waited on always report `true`.
    pub fn should_wait(&self) -> bool {
        match self {
            Self::Event(event) => !event.is_signaled(),
            Self::Semaphore(semaphore) => semaphore.available() == 0,
            _ => true,
        }
    }

    /// Consumes one signal from a waitable object. Returns `false` if the object is not signaled.
    pub fn acquire(&self) -> bool {
        match self {
            Self::Event(event) => event.try_acquire(),
            Self::Semaphore(semaphore) => semaphore.try_acquire(),
            _ => false,
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_semaphore(&self) -> Option<&Semaphore> {
        match self {
            Self::Semaphore(semaphore) => Some(semaphore),
            _ => None,
        }
    }

    pub fn as_shared_memory(&self) -> Option<&SharedMemory> {
        match self {
            Self::SharedMemory(shmem) => Some(shmem),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&ThreadInfo> {
        match self {
            Self::Thread(thread) => Some(thread),
            _ => None,
        }
    }

    pub fn as_process(&self) -> Option<&ProcessInfo> {
        match self {
            Self::Process(process) => Some(process),
            _ => None,
        }
    }

    pub fn as_session(&self) -> Option<&Session> {
        match self {
            Self::Session(session) => Some(session),
            _ => None,
        }
    }
}

/// How an [`Event`] behaves after it has been signaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    /// Cleared when a waiter acquires it.
    OneShot,
    /// Stays signaled until cleared explicitly.
    Sticky,
    /// Wakes current waiters and clears immediately.
    Pulse,
}

/// A signalable event.
#[derive(Debug)]
pub struct Event {
    name: String,
    reset_type: ResetType,
    signaled: AtomicBool,
}

impl Event {
    pub fn new(name: impl Into<String>, reset_type: ResetType) -> Self {
        Self {
            name: name.into(),
            reset_type,
            signaled: AtomicBool::new(false),
        }
    }

    pub fn reset_type(&self) -> ResetType {
        self.reset_type
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Signals the event.
    ///
    /// Pulse events have no waiters at this layer, so they never remain signaled.
    pub fn signal(&self) {
        if self.reset_type != ResetType::Pulse {
            self.signaled.store(true, Ordering::Release);
        }
    }

    pub fn clear(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    /// Consumes the signal. One-shot events are cleared by a successful acquire.
    pub fn try_acquire(&self) -> bool {
        match self.reset_type {
            ResetType::OneShot => self
                .signaled
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
            _ => self.is_signaled(),
        }
    }
}

/// A counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    name: String,
    max_count: u32,
    available: Mutex<u32>,
}

impl Semaphore {
    pub fn new(
        name: impl Into<String>,
        initial_count: u32,
        max_count: u32,
    ) -> Result<Self, SemaphoreError> {
        if initial_count > max_count {
            return Err(SemaphoreError::ExceedsMaximum {
                count: initial_count,
                max_count,
            });
        }

        Ok(Self {
            name: name.into(),
            max_count,
            available: Mutex::new(initial_count),
        })
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    pub fn available(&self) -> u32 {
        *self.available.lock()
    }

    /// Releases `count` slots and returns the previous count.
    pub fn release(&self, count: u32) -> Result<u32, SemaphoreError> {
        let mut available = self.available.lock();
        let previous = *available;
        let next = previous.saturating_add(count);
        if next > self.max_count {
            return Err(SemaphoreError::ExceedsMaximum {
                count: next,
                max_count: self.max_count,
            });
        }

        *available = next;
        Ok(previous)
    }

    pub fn try_acquire(&self) -> bool {
        let mut available = self.available.lock();
        if *available == 0 {
            return false;
        }

        *available -= 1;
        true
    }
}

/// Error returned by [`Semaphore::new`] and [`Semaphore::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SemaphoreError {
    /// The resulting count would exceed the maximum.
    #[error("Semaphore count {count} exceeds maximum {max_count}")]
    ExceedsMaximum { count: u32, max_count: u32 },
}

impl ToRawResultCode for SemaphoreError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::ExceedsMaximum { .. } => ERR_OUT_OF_RANGE_KERNEL,
        }
    }
}

bitflags! {
    /// Memory permissions of a shared memory block
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[repr(transparent)]
    pub struct MemoryPermission: u32 {
        /// Readable
        const READ = 1 << 0;
        /// Writable
        const WRITE = 1 << 1;
        /// Executable
        const EXECUTE = 1 << 2;
        /// The mapping side chooses the permission
        const DONT_CARE = 1 << 28;

        /// Readable and writable
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// A block of memory that can be mapped into several processes.
///
/// The block owns its backing bytes; mapping into guest address spaces is out of scope here.
#[derive(Debug)]
pub struct SharedMemory {
    name: String,
    owner_permissions: MemoryPermission,
    other_permissions: MemoryPermission,
    backing: Mutex<Vec<u8>>,
}

impl SharedMemory {
    pub fn new(
        name: impl Into<String>,
        size: usize,
        owner_permissions: MemoryPermission,
        other_permissions: MemoryPermission,
    ) -> Self {
        Self {
            name: name.into(),
            owner_permissions,
            other_permissions,
            backing: Mutex::new(vec![0; size]),
        }
    }

    pub fn size(&self) -> usize {
        self.backing.lock().len()
    }

    pub fn owner_permissions(&self) -> MemoryPermission {
        self.owner_permissions
    }

    pub fn other_permissions(&self) -> MemoryPermission {
        self.other_permissions
    }

    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), MemoryError> {
        let backing = self.backing.lock();
        let range = checked_range(offset, out.len(), backing.len())?;
        out.copy_from_slice(&backing[range]);
        Ok(())
    }

    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        let mut backing = self.backing.lock();
        let range = checked_range(offset, data.len(), backing.len())?;
        backing[range].copy_from_slice(data);
        Ok(())
    }
}

fn checked_range(
    offset: usize,
    len: usize,
    size: usize,
) -> Result<core::ops::Range<usize>, MemoryError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset..end),
        _ => Err(MemoryError::OutOfRange { offset, len }),
    }
}

/// Kernel record of an emulated thread.
#[derive(Debug)]
pub struct ThreadInfo {
    pub name: String,
    pub thread_id: u32,
    pub process_id: u32,
}

/// Kernel record of an emulated process.
#[derive(Debug)]
pub struct ProcessInfo {
    pub name: String,
    pub process_id: u32,
}

/// Which side of a session an object represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndpoint {
    Client,
    Server,
}

/// One end of an IPC session.
///
/// Both ends of a pair share the same `session_id`.
#[derive(Debug)]
pub struct Session {
    pub name: String,
    pub session_id: u32,
    pub endpoint: SessionEndpoint,
}
