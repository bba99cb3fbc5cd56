//! Emulated processes.

use alloc::string::String;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::{Mutex, MutexGuard};

use crate::{
    arena::ObjectRef,
    handle_table::HandleTable,
    memory::{AddressSpace, PAGE_SIZE, VAddr},
    object::ObjectId,
};

/// Base address of the thread-local storage region.
pub const TLS_AREA_VADDR: VAddr = 0x1FF8_2000;

/// Size of one thread's TLS slot.
pub const TLS_ENTRY_SIZE: VAddr = 0x200;

/// An emulated process.
///
/// The process aggregate owns the process's handle table and address space. The kernel object
/// record in the arena only carries its identity, so handles to a process never keep the table
/// itself alive.
pub struct Process {
    process_id: u32,
    name: String,
    object: ObjectRef,
    handle_table: HandleTable,
    memory: Mutex<AddressSpace>,
    next_tls_slot: AtomicU32,
}

impl Process {
    pub(crate) fn new(process_id: u32, name: String, object: ObjectRef) -> Self {
        Self {
            process_id,
            name,
            object,
            handle_table: HandleTable::new(),
            memory: Mutex::new(AddressSpace::new()),
            next_tls_slot: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The kernel's own reference to this process's object record.
    #[inline]
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    #[inline]
    pub fn object_id(&self) -> ObjectId {
        self.object.id()
    }

    #[inline]
    pub fn handle_table(&self) -> &HandleTable {
        &self.handle_table
    }

    /// Locks and returns the process address space.
    pub fn memory(&self) -> MutexGuard<'_, AddressSpace> {
        self.memory.lock()
    }

    /// Reserves the next TLS slot and maps its page. Returns the slot's base address.
    pub(crate) fn allocate_tls_slot(&self) -> VAddr {
        let slot = self.next_tls_slot.fetch_add(1, Ordering::Relaxed);
        let address = TLS_AREA_VADDR + slot * TLS_ENTRY_SIZE;
        self.memory().map(address, PAGE_SIZE);
        address
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("process_id", &self.process_id)
            .field("name", &self.name)
            .field("object", &self.object)
            .field("handles", &self.handle_table.len())
            .finish()
    }
}
