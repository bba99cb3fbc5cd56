//! The per-thread IPC command buffer.
//!
//! Each thread owns a 0x100-byte command buffer at offset `0x80` of its TLS slot. Requests are
//! written there by the client, translated into the server thread's buffer by the kernel, and
//! replies travel back the same way.

use ctr_kernel::{memory::MemoryError, thread::Thread};

use crate::header::Header;

/// Size of the command buffer in words.
pub const COMMAND_BUFFER_LENGTH: usize = 64;

/// A host-side copy of a thread's command buffer.
#[derive(Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct CommandBuffer([u32; COMMAND_BUFFER_LENGTH]);

impl CommandBuffer {
    /// Creates a zero-filled command buffer.
    pub const fn new() -> Self {
        Self([0; COMMAND_BUFFER_LENGTH])
    }

    pub const fn from_words(words: [u32; COMMAND_BUFFER_LENGTH]) -> Self {
        Self(words)
    }

    /// Decodes word 0.
    #[inline]
    pub fn header(&self) -> Header {
        Header::from_raw(self.0[0])
    }

    /// Loads the command buffer of `thread` from its process's memory.
    pub fn read_from(thread: &Thread) -> Result<Self, MemoryError> {
        let mut buf = Self::new();
        thread
            .owner_process()
            .memory()
            .read_words(thread.command_buffer_address(), &mut buf.0)?;
        Ok(buf)
    }

    /// Stores this buffer into the command buffer of `thread`.
    pub fn write_to(&self, thread: &Thread) -> Result<(), MemoryError> {
        thread
            .owner_process()
            .memory()
            .write_words(thread.command_buffer_address(), &self.0)
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl core::ops::Deref for CommandBuffer {
    type Target = [u32; COMMAND_BUFFER_LENGTH];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for CommandBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl core::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let header = self.header();
        let len = header.total_size().min(COMMAND_BUFFER_LENGTH);
        f.debug_struct("CommandBuffer")
            .field("header", &header)
            .field("words", &&self.0[..len])
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ctr_kernel::Kernel;

    use super::*;

    #[test]
    fn thread_buffer_round_trips_through_memory() {
        let kernel = Kernel::new();
        let process = kernel.create_process("app");
        let thread = kernel.create_thread(&process, "main");

        let mut buf = CommandBuffer::new();
        buf[0] = Header::for_command(0x12, 2, 0).to_raw();
        buf[1] = 0xDEAD_BEEF;
        buf[63] = 7;
        buf.write_to(&thread).unwrap();

        let loaded = CommandBuffer::read_from(&thread).unwrap();
        assert_eq!(loaded, buf);
        assert_eq!(loaded.header().command_id(), 0x12);
        assert_eq!(
            process
                .memory()
                .read_u32(thread.command_buffer_address() + 4)
                .unwrap(),
            0xDEAD_BEEF
        );
    }

    #[test]
    fn threads_do_not_share_buffers() {
        let kernel = Kernel::new();
        let process = kernel.create_process("app");
        let first = kernel.create_thread(&process, "first");
        let second = kernel.create_thread(&process, "second");

        let mut buf = CommandBuffer::new();
        buf[1] = 1;
        buf.write_to(&first).unwrap();

        assert_eq!(CommandBuffer::read_from(&second).unwrap()[1], 0);
    }
}
