//! The kernel context.
//!
//! [`Kernel`] owns the object arena and the id counters. It is passed explicitly to whatever
//! creates processes, threads and objects; there is no global kernel instance.

use alloc::{string::String, sync::Arc};
use core::sync::atomic::{AtomicU32, Ordering};

use crate::{
    arena::{ObjectArena, ObjectRef},
    object::{
        Event, KernelObject, MemoryPermission, ProcessInfo, ResetType, Semaphore, SemaphoreError,
        Session, SessionEndpoint, SharedMemory, ThreadInfo,
    },
    process::Process,
    thread::Thread,
};

/// The emulated kernel.
pub struct Kernel {
    objects: Arc<ObjectArena>,
    next_process_id: AtomicU32,
    next_thread_id: AtomicU32,
    next_session_id: AtomicU32,
}

impl Kernel {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(ObjectArena::new()),
            next_process_id: AtomicU32::new(0),
            next_thread_id: AtomicU32::new(1),
            next_session_id: AtomicU32::new(1),
        }
    }

    #[inline]
    pub fn objects(&self) -> &Arc<ObjectArena> {
        &self.objects
    }

    pub fn create_process(&self, name: impl Into<String>) -> Arc<Process> {
        let name = name.into();
        let process_id = self.next_process_id.fetch_add(1, Ordering::Relaxed);
        let object = self.objects.insert(KernelObject::Process(ProcessInfo {
            name: name.clone(),
            process_id,
        }));

        log::debug!("Created process {process_id} ({name})");
        Arc::new(Process::new(process_id, name, object))
    }

    /// Creates a thread in `process` and maps its TLS slot.
    pub fn create_thread(&self, process: &Arc<Process>, name: impl Into<String>) -> Arc<Thread> {
        let name = name.into();
        let thread_id = self.next_thread_id.fetch_add(1, Ordering::Relaxed);
        let object = self.objects.insert(KernelObject::Thread(ThreadInfo {
            name: name.clone(),
            thread_id,
            process_id: process.process_id(),
        }));
        let tls_address = process.allocate_tls_slot();

        log::debug!(
            "Created thread {thread_id} ({name}) in process {} with TLS at {tls_address:#010X}",
            process.process_id()
        );
        Arc::new(Thread::new(
            thread_id,
            name,
            object,
            Arc::clone(process),
            tls_address,
        ))
    }

    pub fn create_event(&self, name: impl Into<String>, reset_type: ResetType) -> ObjectRef {
        self.objects
            .insert(KernelObject::Event(Event::new(name, reset_type)))
    }

    pub fn create_semaphore(
        &self,
        name: impl Into<String>,
        initial_count: u32,
        max_count: u32,
    ) -> Result<ObjectRef, SemaphoreError> {
        let semaphore = Semaphore::new(name, initial_count, max_count)?;
        Ok(self.objects.insert(KernelObject::Semaphore(semaphore)))
    }

    pub fn create_shared_memory(
        &self,
        name: impl Into<String>,
        size: usize,
        owner_permissions: MemoryPermission,
        other_permissions: MemoryPermission,
    ) -> ObjectRef {
        self.objects
            .insert(KernelObject::SharedMemory(SharedMemory::new(
                name,
                size,
                owner_permissions,
                other_permissions,
            )))
    }

    /// Creates both ends of a session. Returns `(server, client)`.
    pub fn create_session_pair(&self, name: impl Into<String>) -> (ObjectRef, ObjectRef) {
        let name = name.into();
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        let server = self.objects.insert(KernelObject::Session(Session {
            name: name.clone(),
            session_id,
            endpoint: SessionEndpoint::Server,
        }));
        let client = self.objects.insert(KernelObject::Session(Session {
            name,
            session_id,
            endpoint: SessionEndpoint::Client,
        }));
        (server, client)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
