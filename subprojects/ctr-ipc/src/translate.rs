//! Command buffer translation between two threads.
//!
//! [`translate`] copies a command from one thread's command buffer into another's, rewriting the
//! translate region on the way: handles are re-issued in the receiving process's handle table,
//! `CallingPid` slots receive the sender's process id, and buffer descriptors are carried through.
//!
//! Translation is all-or-nothing. The whole translate region is decoded and bounds-checked before
//! any handle table is touched, handles created in the receiver are closed again when a later
//! step fails, and moved handles are only closed in the sender once the receiver's buffer has
//! been written.

use alloc::vec::Vec;

use ctr_kernel::{
    arena::ObjectRef,
    handle::{Handle, PseudoHandle},
    handle_table::HandleTable,
    memory::{MemoryError, VAddr},
    result::{ERR_COMMAND_TOO_LARGE, ERR_OUT_OF_HANDLES, ResultCode, ToRawResultCode},
    thread::Thread,
};

use crate::{
    command_buffer::COMMAND_BUFFER_LENGTH,
    descriptor::{Descriptor, UnsupportedDescriptor},
    header::Header,
};

/// Translates the command at `src_address` in `src_thread`'s process into `dst_address` in
/// `dst_thread`'s process.
///
/// Handles that resolve to no object (the value `0`, closed or unknown handles) are written as
/// `0` in the destination; this is not an error.
///
/// # Errors
///
/// - [`TranslateError::CommandTooLarge`] if the header declares more words than the command
///   buffer holds, or a descriptor's payload runs past the declared region.
/// - [`TranslateError::UnsupportedDescriptor`] for an unknown descriptor encoding.
/// - [`TranslateError::OutOfHandles`] if the destination handle table is full.
/// - [`TranslateError::Memory`] if either buffer address is not mapped.
///
/// On error no handle table is left modified.
pub fn translate(
    src_thread: &Thread,
    dst_thread: &Thread,
    src_address: VAddr,
    dst_address: VAddr,
) -> Result<(), TranslateError> {
    let src_process = src_thread.owner_process();
    let dst_process = dst_thread.owner_process();

    let header = Header::from_raw(src_process.memory().read_u32(src_address)?);
    let untranslated = header.untranslated_size();
    let total = header.total_size();
    if total > COMMAND_BUFFER_LENGTH {
        log::warn!(
            "Command {:#06X} from thread {} declares {total} words",
            header.command_id(),
            src_thread.thread_id()
        );
        return Err(TranslateError::CommandTooLarge);
    }

    let mut cmd = [0u32; COMMAND_BUFFER_LENGTH];
    src_process
        .memory()
        .read_words(src_address, &mut cmd[..total])?;

    let descriptors = decode_translate_region(&cmd, untranslated, total)?;

    let src_table = src_process.handle_table();
    let dst_table = dst_process.handle_table();
    let mut transfer = Transfer::new(dst_table);

    for (index, descriptor) in descriptors {
        log::trace!(
            "Translating {descriptor:?} at word {index} ({} -> {})",
            src_thread.thread_id(),
            dst_thread.thread_id()
        );

        match descriptor {
            Descriptor::CopyHandle { count } | Descriptor::MoveHandle { count } => {
                let is_move = matches!(descriptor, Descriptor::MoveHandle { .. });
                let payload = index + 1..index + 1 + count as usize;
                for word in &mut cmd[payload] {
                    let handle = Handle::from_raw(*word);
                    *word = transfer.transfer(src_thread, src_table, handle, is_move)?;
                }
            }
            Descriptor::CallingPid => {
                cmd[index + 1] = src_process.process_id();
            }
            Descriptor::StaticBuffer { .. } | Descriptor::MappedBuffer { .. } => {}
        }
    }

    if let Err(err) = dst_process.memory().write_words(dst_address, &cmd[..total]) {
        transfer.rollback();
        return Err(err.into());
    }

    transfer.commit(src_table);
    Ok(())
}

/// Decodes every descriptor of the translate region `cmd[untranslated..total]`.
///
/// Returns the word index of each descriptor along with it.
fn decode_translate_region(
    cmd: &[u32],
    untranslated: usize,
    total: usize,
) -> Result<Vec<(usize, Descriptor)>, TranslateError> {
    let mut descriptors = Vec::new();
    let mut index = untranslated;

    while index < total {
        let descriptor = Descriptor::decode(cmd[index]).map_err(|err| {
            log::error!("Unsupported descriptor {:#010X} at word {index}", err.0);
            TranslateError::UnsupportedDescriptor(err)
        })?;

        let next = index + 1 + descriptor.payload_words();
        if next > total {
            log::warn!(
                "{descriptor:?} at word {index} needs {} words, command has {total}",
                next
            );
            return Err(TranslateError::CommandTooLarge);
        }

        descriptors.push((index, descriptor));
        index = next;
    }

    Ok(descriptors)
}

/// Resolves a sender handle to an owned reference, pseudo-handles included.
fn resolve(thread: &Thread, table: &HandleTable, handle: Handle) -> Option<ObjectRef> {
    match PseudoHandle::from_handle(handle) {
        Some(PseudoHandle::CurrentThread) => Some(thread.object().clone()),
        Some(PseudoHandle::CurrentProcess) => Some(thread.owner_process().object().clone()),
        None if !handle.is_valid() => None,
        None => table.acquire(handle),
    }
}

/// Handle bookkeeping of one translation.
struct Transfer<'a> {
    dst_table: &'a HandleTable,
    created: Vec<Handle>,
    moved: Vec<Handle>,
}

impl<'a> Transfer<'a> {
    fn new(dst_table: &'a HandleTable) -> Self {
        Self {
            dst_table,
            created: Vec::new(),
            moved: Vec::new(),
        }
    }

    /// Issues a destination handle for `handle`. Returns the destination word.
    fn transfer(
        &mut self,
        thread: &Thread,
        src_table: &HandleTable,
        handle: Handle,
        is_move: bool,
    ) -> Result<u32, TranslateError> {
        // A handle moved earlier in the same command is already gone from the sender.
        let object = if self.moved.contains(&handle) {
            None
        } else {
            resolve(thread, src_table, handle)
        };

        let Some(object) = object else {
            log::trace!("Handle {handle} resolves to no object");
            return Ok(Handle::INVALID.to_raw());
        };

        match self.dst_table.create(object) {
            Ok(new_handle) => {
                self.created.push(new_handle);
                if is_move && !handle.is_pseudo() {
                    self.moved.push(handle);
                }
                Ok(new_handle.to_raw())
            }
            Err(_) => {
                log::warn!("Destination table full while translating handle {handle}");
                self.rollback();
                Err(TranslateError::OutOfHandles)
            }
        }
    }

    /// Closes every destination handle created so far.
    fn rollback(&mut self) {
        for handle in self.created.drain(..) {
            let _ = self.dst_table.close(handle);
        }
        self.moved.clear();
    }

    /// Closes the moved handles in the sender.
    fn commit(self, src_table: &HandleTable) {
        for handle in self.moved {
            if src_table.close(handle).is_err() {
                log::warn!("Moved handle {handle} was closed during translation");
            }
        }
    }
}

/// Error returned by [`translate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    /// The command does not fit in the command buffer.
    #[error("Command too large")]
    CommandTooLarge,
    /// The receiving handle table is full.
    #[error("Out of handles")]
    OutOfHandles,
    /// A descriptor with an unknown encoding.
    #[error(transparent)]
    UnsupportedDescriptor(#[from] UnsupportedDescriptor),
    /// A command buffer address is not mapped.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl ToRawResultCode for TranslateError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::CommandTooLarge => ERR_COMMAND_TOO_LARGE,
            Self::OutOfHandles => ERR_OUT_OF_HANDLES,
            Self::UnsupportedDescriptor(err) => err.to_rc(),
            Self::Memory(err) => err.to_rc(),
        }
    }
}
