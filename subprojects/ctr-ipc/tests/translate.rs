//! End-to-end translation between two processes.

use std::sync::Arc;

use ctr_ipc::{
    COMMAND_BUFFER_LENGTH, CommandBuffer, Descriptor, Header, TranslateError,
    UnsupportedDescriptor, translate,
};
use ctr_kernel::{
    Handle, HandleTable, Kernel, MemoryError, Thread, ToRawResultCode,
    object::{ObjectKind, ResetType},
};
use proptest::prelude::*;

struct Pair {
    kernel: Kernel,
    client: Arc<Thread>,
    server: Arc<Thread>,
}

impl Pair {
    fn new() -> Self {
        let kernel = Kernel::new();
        let app = kernel.create_process("app");
        let service = kernel.create_process("service");
        let client = kernel.create_thread(&app, "main");
        let server = kernel.create_thread(&service, "server");
        Self {
            kernel,
            client,
            server,
        }
    }

    fn src_table(&self) -> &HandleTable {
        self.client.owner_process().handle_table()
    }

    fn dst_table(&self) -> &HandleTable {
        self.server.owner_process().handle_table()
    }

    fn send(&self, buf: &CommandBuffer) -> Result<CommandBuffer, TranslateError> {
        buf.write_to(&self.client).unwrap();
        translate(
            &self.client,
            &self.server,
            self.client.command_buffer_address(),
            self.server.command_buffer_address(),
        )?;
        Ok(CommandBuffer::read_from(&self.server).unwrap())
    }

    fn fill_server_buffer(&self, value: u32) {
        CommandBuffer::from_words([value; COMMAND_BUFFER_LENGTH])
            .write_to(&self.server)
            .unwrap();
    }
}

fn handle_command(descriptor: Descriptor, handle: Handle) -> CommandBuffer {
    let mut buf = CommandBuffer::new();
    buf[0] = Header::for_command(0x01, 1, 2).to_raw();
    buf[1] = 42;
    buf[2] = descriptor.encode();
    buf[3] = handle.to_raw();
    buf
}

#[test]
fn move_handle_transfers_the_object() {
    let pair = Pair::new();
    let event = pair.kernel.create_event("ev", ResetType::OneShot);
    let handle = pair.src_table().create(event.clone()).unwrap();

    let dst = pair
        .send(&handle_command(Descriptor::move_handles(1), handle))
        .unwrap();

    assert_eq!(dst[1], 42);
    let moved = Handle::from_raw(dst[3]);
    assert!(moved.is_valid());
    assert_eq!(pair.dst_table().get(moved), Some(event.id()));
    assert_eq!(pair.src_table().get(handle), None);
    // The local reference plus the destination entry.
    assert_eq!(event.ref_count(), 2);
}

#[test]
fn copy_handle_survives_closing_the_source() {
    let pair = Pair::new();
    let event = pair.kernel.create_event("ev", ResetType::Sticky);
    let id = event.id();
    let handle = pair.src_table().create(event).unwrap();

    let dst = pair
        .send(&handle_command(Descriptor::copy_handles(1), handle))
        .unwrap();
    let copied = Handle::from_raw(dst[3]);
    assert_eq!(pair.src_table().get(handle), Some(id));

    pair.src_table().close(handle).unwrap();

    assert_eq!(pair.dst_table().get(copied), Some(id));
    assert!(pair.kernel.objects().contains(id));
    assert_eq!(pair.kernel.objects().ref_count(id), 1);
}

#[test]
fn zero_handle_translates_to_zero() {
    for descriptor in [Descriptor::copy_handles(1), Descriptor::move_handles(1)] {
        let pair = Pair::new();
        let event = pair.kernel.create_event("ev", ResetType::OneShot);
        pair.src_table().create(event).unwrap();

        let dst = pair
            .send(&handle_command(descriptor, Handle::INVALID))
            .unwrap();

        assert_eq!(dst[1], 42);
        assert_eq!(dst[3], 0);
        assert_eq!(pair.src_table().len(), 1);
        assert!(pair.dst_table().is_empty());
    }
}

#[test]
fn stale_handle_translates_to_zero() {
    let pair = Pair::new();
    let event = pair.kernel.create_event("ev", ResetType::OneShot);
    let handle = pair.src_table().create(event).unwrap();
    pair.src_table().close(handle).unwrap();

    let dst = pair
        .send(&handle_command(Descriptor::copy_handles(1), handle))
        .unwrap();

    assert_eq!(dst[3], 0);
    assert!(pair.dst_table().is_empty());
}

#[test]
fn calling_pid_is_the_source_process() {
    let pair = Pair::new();
    let mut buf = CommandBuffer::new();
    buf[0] = Header::for_command(0x02, 0, 2).to_raw();
    buf[1] = Descriptor::CallingPid.encode();
    buf[2] = 0xFFFF_FFFF;

    let dst = pair.send(&buf).unwrap();

    assert_eq!(dst[1], Descriptor::CallingPid.encode());
    assert_eq!(dst[2], pair.client.owner_process().process_id());
    assert_ne!(dst[2], pair.server.owner_process().process_id());
}

#[test]
fn pseudo_handles_resolve_to_the_caller() {
    let pair = Pair::new();
    let mut buf = CommandBuffer::new();
    buf[0] = Header::for_command(0x03, 0, 3).to_raw();
    buf[1] = Descriptor::copy_handles(2).encode();
    buf[2] = Handle::CURRENT_THREAD.to_raw();
    buf[3] = Handle::CURRENT_PROCESS.to_raw();

    let dst = pair.send(&buf).unwrap();

    let thread = pair.dst_table().get(Handle::from_raw(dst[2]));
    let process = pair.dst_table().get(Handle::from_raw(dst[3]));
    assert_eq!(thread, Some(pair.client.object_id()));
    assert_eq!(process, Some(pair.client.owner_process().object_id()));
    assert_eq!(
        pair.kernel.objects().kind(pair.client.object_id()),
        Some(ObjectKind::Thread)
    );
    assert!(pair.src_table().is_empty());
}

#[test]
fn buffers_are_carried_through() {
    let pair = Pair::new();
    let mut buf = CommandBuffer::new();
    buf[0] = Header::for_command(0x04, 1, 4).to_raw();
    buf[1] = 0x20;
    buf[2] = 0x0000_020A;
    buf[3] = 0x0800_0000;
    buf[4] = (0x10 << 14) | 0x2;
    buf[5] = 0x0810_0000;

    let dst = pair.send(&buf).unwrap();

    assert_eq!(dst[..6], buf[..6]);
}

#[test]
fn handle_count_past_the_region_is_too_large() {
    let pair = Pair::new();
    let event = pair.kernel.create_event("ev", ResetType::OneShot);
    let handle = pair.src_table().create(event).unwrap();
    pair.fill_server_buffer(0xAAAA_AAAA);

    let mut buf = CommandBuffer::new();
    buf[0] = Header::for_command(0x01, 0, 1).to_raw();
    buf[1] = Descriptor::copy_handles(5).encode();
    buf[2] = handle.to_raw();

    assert_eq!(pair.send(&buf), Err(TranslateError::CommandTooLarge));
    assert_eq!(
        CommandBuffer::read_from(&pair.server).unwrap()[..],
        [0xAAAA_AAAA; COMMAND_BUFFER_LENGTH]
    );
    assert!(pair.dst_table().is_empty());
}

#[test]
fn oversized_header_is_too_large() {
    let pair = Pair::new();
    let mut buf = CommandBuffer::new();
    buf[0] = Header::for_command(0x01, 63, 1).to_raw();

    let err = pair.send(&buf).unwrap_err();
    assert_eq!(err, TranslateError::CommandTooLarge);
    assert_eq!(err.to_rc().to_raw(), 0xC8A0_1836);
}

#[test]
fn unsupported_descriptor_leaves_tables_untouched() {
    let pair = Pair::new();
    let event = pair.kernel.create_event("ev", ResetType::OneShot);
    let handle = pair.src_table().create(event).unwrap();

    let mut buf = CommandBuffer::new();
    buf[0] = Header::for_command(0x01, 0, 4).to_raw();
    buf[1] = Descriptor::move_handles(1).encode();
    buf[2] = handle.to_raw();
    buf[3] = 0x0000_0104;
    buf[4] = 0x0800_0000;

    assert_eq!(
        pair.send(&buf),
        Err(TranslateError::UnsupportedDescriptor(UnsupportedDescriptor(
            0x104
        )))
    );
    assert!(pair.src_table().is_valid(handle));
    assert!(pair.dst_table().is_empty());
}

#[test]
fn full_destination_table_rolls_back() {
    let pair = Pair::new();
    let filler = pair.kernel.create_event("filler", ResetType::OneShot);
    for _ in 0..HandleTable::MAX_COUNT - 1 {
        pair.dst_table().create(filler.clone()).unwrap();
    }

    let first = pair.kernel.create_event("first", ResetType::OneShot);
    let second = pair.kernel.create_event("second", ResetType::OneShot);
    let first_handle = pair.src_table().create(first.clone()).unwrap();
    let second_handle = pair.src_table().create(second.clone()).unwrap();

    let mut buf = CommandBuffer::new();
    buf[0] = Header::for_command(0x01, 0, 3).to_raw();
    buf[1] = Descriptor::move_handles(2).encode();
    buf[2] = first_handle.to_raw();
    buf[3] = second_handle.to_raw();

    let err = pair.send(&buf).unwrap_err();
    assert_eq!(err, TranslateError::OutOfHandles);
    assert_eq!(err.to_rc().to_raw(), 0xD860_0413);

    assert_eq!(pair.dst_table().len(), HandleTable::MAX_COUNT - 1);
    assert_eq!(pair.src_table().get(first_handle), Some(first.id()));
    assert_eq!(pair.src_table().get(second_handle), Some(second.id()));
    assert_eq!(first.ref_count(), 2);
    assert_eq!(second.ref_count(), 2);
}

#[test]
fn unmapped_source_is_a_memory_error() {
    let pair = Pair::new();

    let err = translate(
        &pair.client,
        &pair.server,
        0x0010_0000,
        pair.server.command_buffer_address(),
    )
    .unwrap_err();

    assert_eq!(
        err,
        TranslateError::Memory(MemoryError::Unmapped {
            address: 0x0010_0000
        })
    );
}

#[test]
fn unmapped_destination_rolls_back() {
    let pair = Pair::new();
    let event = pair.kernel.create_event("ev", ResetType::OneShot);
    let handle = pair.src_table().create(event).unwrap();
    handle_command(Descriptor::move_handles(1), handle)
        .write_to(&pair.client)
        .unwrap();

    let result = translate(
        &pair.client,
        &pair.server,
        pair.client.command_buffer_address(),
        0x0010_0000,
    );

    assert!(matches!(result, Err(TranslateError::Memory(_))));
    assert!(pair.src_table().is_valid(handle));
    assert!(pair.dst_table().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Plain parameters arrive unchanged for every header that fits.
    #[test]
    fn plain_parameters_are_preserved(
        command_id in any::<u16>(),
        words in prop::collection::vec(any::<u32>(), 0..COMMAND_BUFFER_LENGTH),
    ) {
        let pair = Pair::new();
        let mut buf = CommandBuffer::new();
        buf[0] = Header::for_command(command_id, words.len() as u8, 0).to_raw();
        buf[1..=words.len()].copy_from_slice(&words);

        let dst = pair.send(&buf).unwrap();

        prop_assert_eq!(dst.header(), buf.header());
        prop_assert_eq!(&dst[1..=words.len()], &words[..]);
    }
}
