//! Writing requests and replies into a command buffer.
//!
//! A [`RequestBuilder`] writes the header on construction and then appends parameters and
//! descriptors. Writing more words than the header declares panics.

use ctr_kernel::{handle::Handle, memory::VAddr, result::ResultCode};

use crate::{
    command_buffer::{COMMAND_BUFFER_LENGTH, CommandBuffer},
    descriptor::{Descriptor, MappedBufferPermission},
    header::Header,
    param::CommandParam,
};

/// Sequential writer of an outgoing request or reply.
pub struct RequestBuilder<'a> {
    buf: &'a mut CommandBuffer,
    header: Header,
    index: usize,
}

impl<'a> RequestBuilder<'a> {
    /// Writes the header and positions the builder after it.
    ///
    /// # Panics
    ///
    /// Panics if the declared sizes do not fit in the command buffer.
    pub fn new(
        buf: &'a mut CommandBuffer,
        command_id: u16,
        normal_params_size: u8,
        translate_params_size: u8,
    ) -> Self {
        let header = Header::for_command(command_id, normal_params_size, translate_params_size);
        assert!(
            header.total_size() <= COMMAND_BUFFER_LENGTH,
            "command of {} words does not fit in the command buffer",
            header.total_size()
        );

        buf[0] = header.to_raw();
        Self {
            buf,
            header,
            index: 1,
        }
    }

    #[inline]
    pub fn header(&self) -> Header {
        self.header
    }

    /// Index of the next word to be written.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Appends a plain parameter.
    pub fn push<T: CommandParam>(&mut self, value: T) {
        let start = self.advance(T::WORDS);
        value.write_words(&mut self.buf[start..start + T::WORDS]);
    }

    pub fn push_result(&mut self, result: ResultCode) {
        self.push(result);
    }

    /// Appends a copy-handle descriptor followed by `handles`.
    pub fn push_copy_handles(&mut self, handles: &[Handle]) {
        self.push_handles(Descriptor::copy_handles(handles.len() as u32), handles);
    }

    /// Appends a move-handle descriptor followed by `handles`.
    pub fn push_move_handles(&mut self, handles: &[Handle]) {
        self.push_handles(Descriptor::move_handles(handles.len() as u32), handles);
    }

    /// Appends a `CallingPid` descriptor. The kernel fills in the process id.
    pub fn push_calling_pid(&mut self) {
        self.push_descriptor(Descriptor::CallingPid);
        self.push(0u32);
    }

    pub fn push_static_buffer(&mut self, address: VAddr, size: u32, buffer_id: u8) {
        self.push_descriptor(Descriptor::StaticBuffer { buffer_id, size });
        self.push(address);
    }

    pub fn push_mapped_buffer(
        &mut self,
        address: VAddr,
        size: u32,
        permission: MappedBufferPermission,
    ) {
        self.push_descriptor(Descriptor::MappedBuffer { size, permission });
        self.push(address);
    }

    fn push_handles(&mut self, descriptor: Descriptor, handles: &[Handle]) {
        self.push_descriptor(descriptor);
        for handle in handles {
            self.push(handle.to_raw());
        }
    }

    fn push_descriptor(&mut self, descriptor: Descriptor) {
        self.push(descriptor.encode());
    }

    /// Reserves `count` words and returns the index of the first one.
    fn advance(&mut self, count: usize) -> usize {
        let start = self.index;
        let end = start + count;
        assert!(
            end <= self.header.total_size(),
            "writing words {start}..{end} past the end of a {}-word command",
            self.header.total_size()
        );
        self.index = end;
        start
    }
}

#[cfg(test)]
mod tests {
    use ctr_kernel::result::ERR_INVALID_HANDLE;

    use super::*;

    #[test]
    fn writes_header_and_parameters() {
        let mut buf = CommandBuffer::new();
        let mut rb = RequestBuilder::new(&mut buf, 0x0E, 3, 0);
        rb.push_result(ERR_INVALID_HANDLE);
        rb.push(true);
        rb.push(-1i8);

        assert_eq!(buf[0], 0x000E_00C0);
        assert_eq!(buf[1], 0xD8E0_07F7);
        assert_eq!(buf[2], 1);
        assert_eq!(buf[3], 0xFFFF_FFFF);
    }

    #[test]
    fn writes_descriptors() {
        let mut buf = CommandBuffer::new();
        let mut rb = RequestBuilder::new(&mut buf, 0x03, 0, 6);
        rb.push_calling_pid();
        rb.push_static_buffer(0x0800_0000, 0x10, 1);
        rb.push_mapped_buffer(0x0810_0000, 0x20, MappedBufferPermission::Read);

        assert_eq!(buf[1], 0x0000_0020);
        assert_eq!(buf[2], 0);
        assert_eq!(buf[3], (0x10 << 14) | (1 << 10) | 0x2);
        assert_eq!(buf[4], 0x0800_0000);
        assert_eq!(buf[5], 0x0000_020A);
        assert_eq!(buf[6], 0x0810_0000);
    }

    #[test]
    #[should_panic(expected = "past the end")]
    fn writing_past_the_command_panics() {
        let mut buf = CommandBuffer::new();
        let mut rb = RequestBuilder::new(&mut buf, 0x01, 1, 0);
        rb.push(1u32);
        rb.push(2u32);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn oversized_header_panics() {
        let mut buf = CommandBuffer::new();
        RequestBuilder::new(&mut buf, 0x01, 63, 1);
    }
}
