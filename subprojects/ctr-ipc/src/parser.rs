//! Reading requests out of a command buffer.
//!
//! Service handlers construct a [`RequestParser`] with the layout they expect and pop parameters
//! in order. A buffer that does not match the declared layout is a bug in the handler, so every
//! layout violation panics.

use alloc::vec::Vec;

use ctr_kernel::{handle::Handle, memory::VAddr};

use crate::{
    builder::RequestBuilder,
    command_buffer::CommandBuffer,
    descriptor::{Descriptor, MappedBuffer, MappedBufferPermission, StaticBuffer},
    header::Header,
    param::CommandParam,
};

/// Sequential reader over an incoming request.
pub struct RequestParser<'a> {
    buf: &'a mut CommandBuffer,
    header: Header,
    index: usize,
}

impl<'a> RequestParser<'a> {
    /// Creates a parser for a request with the given layout.
    ///
    /// # Panics
    ///
    /// Panics if the buffer's header does not match `command_id`, `normal_params_size` and
    /// `translate_params_size`.
    pub fn new(
        buf: &'a mut CommandBuffer,
        command_id: u16,
        normal_params_size: u8,
        translate_params_size: u8,
    ) -> Self {
        let expected = Header::for_command(command_id, normal_params_size, translate_params_size);
        let header = buf.header();
        assert_eq!(
            header, expected,
            "request header {:#010X} does not match expected {:#010X}",
            header.to_raw(),
            expected.to_raw()
        );

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

    /// Index of the next word to be read.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Pops a plain parameter.
    pub fn pop<T: CommandParam>(&mut self) -> T {
        let start = self.advance(T::WORDS);
        T::read_words(&self.buf[start..start + T::WORDS])
    }

    /// Pops a `CallingPid` descriptor and returns the process id the kernel wrote after it.
    pub fn pop_pid(&mut self) -> u32 {
        let descriptor = self.pop_descriptor();
        assert_eq!(
            descriptor,
            Descriptor::CallingPid,
            "expected a calling pid descriptor"
        );
        self.pop::<u32>()
    }

    /// Pops a copy or move handle descriptor and its handles.
    pub fn pop_handles(&mut self) -> Vec<Handle> {
        let descriptor = self.pop_descriptor();
        assert!(
            descriptor.is_handle(),
            "expected a handle descriptor, found {descriptor:?}"
        );

        let count = descriptor.payload_words();
        let start = self.advance(count);
        self.buf[start..start + count]
            .iter()
            .copied()
            .map(Handle::from_raw)
            .collect()
    }

    /// Pops a handle descriptor carrying exactly one handle.
    pub fn pop_handle(&mut self) -> Handle {
        let handles = self.pop_handles();
        assert_eq!(handles.len(), 1, "expected a single handle");
        handles[0]
    }

    pub fn pop_static_buffer(&mut self) -> StaticBuffer {
        match self.pop_descriptor() {
            Descriptor::StaticBuffer { buffer_id, size } => StaticBuffer {
                address: self.pop::<u32>(),
                size,
                buffer_id,
            },
            other => panic!("expected a static buffer descriptor, found {other:?}"),
        }
    }

    pub fn pop_mapped_buffer(&mut self) -> MappedBuffer {
        match self.pop_descriptor() {
            Descriptor::MappedBuffer { size, permission } => MappedBuffer {
                address: self.pop::<u32>(),
                size,
                permission,
            },
            other => panic!("expected a mapped buffer descriptor, found {other:?}"),
        }
    }

    /// Pops a mapped buffer that must have the given size and permission. Returns its address.
    pub fn expect_mapped_buffer(&mut self, size: u32, permission: MappedBufferPermission) -> VAddr {
        let buffer = self.pop_mapped_buffer();
        assert!(
            buffer.size == size && buffer.permission == permission,
            "mapped buffer {buffer:?} does not match size {size:#X} with {permission:?}"
        );
        buffer.address
    }

    /// Skips `count` words, zeroing them when `set_to_null` is set.
    pub fn skip(&mut self, count: usize, set_to_null: bool) {
        let start = self.advance(count);
        if set_to_null {
            self.buf[start..start + count].fill(0);
        }
    }

    /// Turns the parser into a builder for the reply, reusing the same buffer and command id.
    pub fn make_builder(
        self,
        normal_params_size: u8,
        translate_params_size: u8,
    ) -> RequestBuilder<'a> {
        RequestBuilder::new(
            self.buf,
            self.header.command_id(),
            normal_params_size,
            translate_params_size,
        )
    }

    fn pop_descriptor(&mut self) -> Descriptor {
        let index = self.advance(1);
        let word = self.buf[index];
        match Descriptor::decode(word) {
            Ok(descriptor) => descriptor,
            Err(err) => panic!("{err} at word {index}"),
        }
    }

    /// Reserves `count` words and returns the index of the first one.
    fn advance(&mut self, count: usize) -> usize {
        let start = self.index;
        let end = start + count;
        assert!(
            end <= self.header.total_size(),
            "reading words {start}..{end} past the end of a {}-word request",
            self.header.total_size()
        );
        self.index = end;
        start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RequestBuilder;

    #[test]
    fn pops_plain_parameters_in_order() {
        let mut buf = CommandBuffer::new();
        buf[0] = 0x0001_00C0;
        buf[1] = 0x1234;
        buf[2] = 0x5566_7788;
        buf[3] = 0x1122_3344;

        let mut rp = RequestParser::new(&mut buf, 0x01, 3, 0);
        assert_eq!(rp.pop::<u32>(), 0x1234);
        assert_eq!(rp.pop::<u64>(), 0x1122_3344_5566_7788);
        assert_eq!(rp.index(), 4);
    }

    #[test]
    fn pops_pid_after_descriptor() {
        let mut buf = CommandBuffer::new();
        buf[0] = Header::for_command(0x0F, 1, 2).to_raw();
        buf[1] = 7;
        buf[2] = Descriptor::CallingPid.encode();
        buf[3] = 0x25;

        let mut rp = RequestParser::new(&mut buf, 0x0F, 1, 2);
        assert_eq!(rp.pop::<u32>(), 7);
        assert_eq!(rp.pop_pid(), 0x25);
    }

    #[test]
    fn pops_handles() {
        let mut buf = CommandBuffer::new();
        {
            let mut rb = RequestBuilder::new(&mut buf, 0x10, 0, 5);
            rb.push_copy_handles(&[Handle::from_raw(0x8001), Handle::from_raw(0x10002)]);
            rb.push_move_handles(&[Handle::from_raw(0x18003)]);
        }

        let mut rp = RequestParser::new(&mut buf, 0x10, 0, 5);
        assert_eq!(
            rp.pop_handles(),
            [Handle::from_raw(0x8001), Handle::from_raw(0x10002)]
        );
        assert_eq!(rp.pop_handle(), Handle::from_raw(0x18003));
    }

    #[test]
    fn skip_can_clear_words() {
        let mut buf = CommandBuffer::new();
        buf[0] = Header::for_command(0x02, 3, 0).to_raw();
        buf[1] = 1;
        buf[2] = 2;
        buf[3] = 3;

        let mut rp = RequestParser::new(&mut buf, 0x02, 3, 0);
        rp.skip(1, false);
        rp.skip(1, true);
        assert_eq!(rp.pop::<u32>(), 3);
        assert_eq!(buf[1], 1);
        assert_eq!(buf[2], 0);
    }

    #[test]
    fn builder_reuses_command_id() {
        let mut buf = CommandBuffer::new();
        buf[0] = Header::for_command(0x05, 1, 0).to_raw();
        buf[1] = 9;

        let mut rp = RequestParser::new(&mut buf, 0x05, 1, 0);
        let value = rp.pop::<u32>();
        let mut rb = rp.make_builder(2, 0);
        rb.push(ctr_kernel::result::RESULT_SUCCESS);
        rb.push(value + 1);

        assert_eq!(buf[0], 0x0005_0080);
        assert_eq!(buf[1], 0);
        assert_eq!(buf[2], 10);
    }

    #[test]
    #[should_panic(expected = "does not match expected")]
    fn wrong_header_panics() {
        let mut buf = CommandBuffer::new();
        buf[0] = Header::for_command(0x01, 1, 0).to_raw();
        RequestParser::new(&mut buf, 0x01, 2, 0);
    }

    #[test]
    #[should_panic(expected = "past the end")]
    fn reading_past_the_request_panics() {
        let mut buf = CommandBuffer::new();
        buf[0] = Header::for_command(0x01, 1, 0).to_raw();
        let mut rp = RequestParser::new(&mut buf, 0x01, 1, 0);
        rp.pop::<u64>();
    }

    #[test]
    #[should_panic(expected = "expected a mapped buffer descriptor")]
    fn wrong_descriptor_panics() {
        let mut buf = CommandBuffer::new();
        buf[0] = Header::for_command(0x01, 0, 2).to_raw();
        buf[1] = Descriptor::CallingPid.encode();
        let mut rp = RequestParser::new(&mut buf, 0x01, 0, 2);
        rp.pop_mapped_buffer();
    }
}
