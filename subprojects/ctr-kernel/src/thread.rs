//! Emulated threads.

use alloc::{string::String, sync::Arc};

use crate::{arena::ObjectRef, memory::VAddr, object::ObjectId, process::Process};

/// Offset of the IPC command buffer within a thread's TLS slot.
pub const COMMAND_BUFFER_OFFSET: VAddr = 0x80;

/// An emulated thread.
pub struct Thread {
    thread_id: u32,
    name: String,
    object: ObjectRef,
    owner: Arc<Process>,
    tls_address: VAddr,
}

impl Thread {
    pub(crate) fn new(
        thread_id: u32,
        name: String,
        object: ObjectRef,
        owner: Arc<Process>,
        tls_address: VAddr,
    ) -> Self {
        Self {
            thread_id,
            name,
            object,
            owner,
            tls_address,
        }
    }

    #[inline]
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The kernel's own reference to this thread's object record.
    #[inline]
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    #[inline]
    pub fn object_id(&self) -> ObjectId {
        self.object.id()
    }

    #[inline]
    pub fn owner_process(&self) -> &Arc<Process> {
        &self.owner
    }

    /// Base address of this thread's TLS slot.
    #[inline]
    pub fn tls_address(&self) -> VAddr {
        self.tls_address
    }

    /// Guest address of this thread's IPC command buffer.
    #[inline]
    pub fn command_buffer_address(&self) -> VAddr {
        self.tls_address + COMMAND_BUFFER_OFFSET
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("thread_id", &self.thread_id)
            .field("name", &self.name)
            .field("process_id", &self.owner.process_id())
            .field("tls_address", &format_args!("{:#010X}", self.tls_address))
            .finish()
    }
}
