//! Translate-region descriptors.
//!
//! Every entry of the translate region starts with a descriptor word that says how the payload
//! words following it must be treated when the message crosses a process boundary.
//!
//! # Encoding
//!
//! The low nibble selects the descriptor class.
//!
//! | Class          | Low nibble | Fields                                               |
//! |----------------|------------|------------------------------------------------------|
//! | Handle         | `0x0`      | bits 4-5 type (copy/move/pid), bits 26-31 count - 1  |
//! | Static buffer  | `0x2`      | bits 10-13 buffer id, bits 14-31 size                |
//! | Mapped buffer  | `0x8` set  | bits 1-2 permission, bits 4-31 size                  |
//!
//! Every descriptor is followed by its payload: one word per handle for handle descriptors, the
//! process id slot for `CallingPid`, and the buffer address for buffer descriptors.
//!
//! # References
//!
//! - [3dbrew: IPC](https://www.3dbrew.org/wiki/IPC)

use core::mem::size_of;

use ctr_kernel::{
    memory::VAddr,
    result::{ERR_INVALID_BUFFER_DESCRIPTOR, ResultCode, ToRawResultCode},
};
use modular_bitfield::prelude::*;
use static_assertions::const_assert_eq;

/// Maximum number of handles one handle descriptor can carry.
pub const MAX_HANDLES_PER_DESCRIPTOR: u32 = 64;

const PXI_BUFFER_FLAG: u32 = 0x4;
const STATIC_BUFFER_TAG: u8 = 0x2;

const HANDLE_TYPE_COPY: u8 = 0;
const HANDLE_TYPE_MOVE: u8 = 1;
const HANDLE_TYPE_CALLING_PID: u8 = 2;

/// Permission a mapped buffer grants the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MappedBufferPermission {
    Read = 1,
    Write = 2,
    ReadWrite = 3,
}

impl TryFrom<u8> for MappedBufferPermission {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Read),
            2 => Ok(Self::Write),
            3 => Ok(Self::ReadWrite),
            other => Err(other),
        }
    }
}

/// Handle-class descriptor word.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
struct HandleDescriptor {
    /// Class nibble, zero for handle descriptors.
    class: B4,
    /// Copy, move or calling pid.
    handle_type: B2,
    #[skip]
    __padding: B20,
    /// Number of handles minus one.
    count_minus_one: B6,
}

const_assert_eq!(size_of::<HandleDescriptor>(), 4);

/// Static buffer descriptor word.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
struct StaticBufferDescriptor {
    /// Class nibble, `0x2`.
    class: B4,
    #[skip]
    __padding: B6,
    /// Receiver static buffer slot.
    buffer_id: B4,
    /// Size of the buffer in bytes.
    size: B18,
}

const_assert_eq!(size_of::<StaticBufferDescriptor>(), 4);

/// Mapped buffer descriptor word.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
struct MappedBufferDescriptor {
    #[skip]
    __padding: B1,
    /// Raw [`MappedBufferPermission`].
    permission: B2,
    /// Always set for mapped buffers.
    mapped: bool,
    /// Size of the buffer in bytes.
    size: B28,
}

const_assert_eq!(size_of::<MappedBufferDescriptor>(), 4);

/// A decoded translate-region descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    /// Duplicate `count` handles into the receiver.
    CopyHandle { count: u32 },
    /// Transfer `count` handles to the receiver, closing them in the sender.
    MoveHandle { count: u32 },
    /// Replace the payload word with the sender's process id.
    CallingPid,
    /// A sender buffer copied into the receiver's static buffer `buffer_id`.
    StaticBuffer { buffer_id: u8, size: u32 },
    /// A sender buffer exposed to the receiver with `permission`.
    MappedBuffer {
        size: u32,
        permission: MappedBufferPermission,
    },
}

impl Descriptor {
    /// Descriptor for `count` copied handles.
    ///
    /// # Panics
    ///
    /// Panics unless `1 <= count <= 64`.
    pub fn copy_handles(count: u32) -> Self {
        assert_handle_count(count);
        Self::CopyHandle { count }
    }

    /// Descriptor for `count` moved handles.
    ///
    /// # Panics
    ///
    /// Panics unless `1 <= count <= 64`.
    pub fn move_handles(count: u32) -> Self {
        assert_handle_count(count);
        Self::MoveHandle { count }
    }

    /// Decodes a descriptor word.
    pub fn decode(word: u32) -> Result<Self, UnsupportedDescriptor> {
        let bytes = word.to_le_bytes();

        let desc = HandleDescriptor::from_bytes(bytes);
        if desc.class() == 0 {
            let count = desc.count_minus_one() as u32 + 1;
            return match desc.handle_type() {
                HANDLE_TYPE_COPY => Ok(Self::CopyHandle { count }),
                HANDLE_TYPE_MOVE => Ok(Self::MoveHandle { count }),
                HANDLE_TYPE_CALLING_PID => Ok(Self::CallingPid),
                _ => Err(UnsupportedDescriptor(word)),
            };
        }

        let desc = MappedBufferDescriptor::from_bytes(bytes);
        if desc.mapped() {
            let permission = MappedBufferPermission::try_from(desc.permission())
                .map_err(|_| UnsupportedDescriptor(word))?;
            return Ok(Self::MappedBuffer {
                size: desc.size(),
                permission,
            });
        }

        if word & PXI_BUFFER_FLAG != 0 {
            return Err(UnsupportedDescriptor(word));
        }

        let desc = StaticBufferDescriptor::from_bytes(bytes);
        if desc.class() != STATIC_BUFFER_TAG {
            return Err(UnsupportedDescriptor(word));
        }
        Ok(Self::StaticBuffer {
            buffer_id: desc.buffer_id(),
            size: desc.size(),
        })
    }

    /// Encodes the descriptor word.
    ///
    /// # Panics
    ///
    /// Panics if a field does not fit its encoding (handle count outside `1..=64`, static buffer
    /// id above 15 or size above 18 bits, mapped buffer size above 28 bits).
    pub fn encode(self) -> u32 {
        let bytes = match self {
            Self::CopyHandle { count } => handle_descriptor(HANDLE_TYPE_COPY, count),
            Self::MoveHandle { count } => handle_descriptor(HANDLE_TYPE_MOVE, count),
            Self::CallingPid => HandleDescriptor::new()
                .with_handle_type(HANDLE_TYPE_CALLING_PID)
                .into_bytes(),
            Self::StaticBuffer { buffer_id, size } => StaticBufferDescriptor::new()
                .with_class(STATIC_BUFFER_TAG)
                .with_buffer_id(buffer_id)
                .with_size(size)
                .into_bytes(),
            Self::MappedBuffer { size, permission } => MappedBufferDescriptor::new()
                .with_permission(permission as u8)
                .with_mapped(true)
                .with_size(size)
                .into_bytes(),
        };
        u32::from_le_bytes(bytes)
    }

    /// Number of payload words that follow the descriptor word.
    pub fn payload_words(&self) -> usize {
        match self {
            Self::CopyHandle { count } | Self::MoveHandle { count } => *count as usize,
            Self::CallingPid | Self::StaticBuffer { .. } | Self::MappedBuffer { .. } => 1,
        }
    }

    /// Returns `true` for copy and move handle descriptors.
    pub fn is_handle(&self) -> bool {
        matches!(self, Self::CopyHandle { .. } | Self::MoveHandle { .. })
    }
}

fn assert_handle_count(count: u32) {
    assert!(
        (1..=MAX_HANDLES_PER_DESCRIPTOR).contains(&count),
        "handle descriptor count {count} outside 1..={MAX_HANDLES_PER_DESCRIPTOR}"
    );
}

fn handle_descriptor(handle_type: u8, count: u32) -> [u8; 4] {
    assert_handle_count(count);
    HandleDescriptor::new()
        .with_handle_type(handle_type)
        .with_count_minus_one((count - 1) as u8)
        .into_bytes()
}

/// A descriptor word with an unknown or unimplemented encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported descriptor {0:#010X}")]
pub struct UnsupportedDescriptor(pub u32);

impl ToRawResultCode for UnsupportedDescriptor {
    fn to_rc(self) -> ResultCode {
        ERR_INVALID_BUFFER_DESCRIPTOR
    }
}

/// A static buffer popped from a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticBuffer {
    pub address: VAddr,
    pub size: u32,
    pub buffer_id: u8,
}

/// A mapped buffer popped from a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedBuffer {
    pub address: VAddr,
    pub size: u32,
    pub permission: MappedBufferPermission,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_descriptors_match_wire_values() {
        assert_eq!(Descriptor::copy_handles(1).encode(), 0x0000_0000);
        assert_eq!(Descriptor::move_handles(1).encode(), 0x0000_0010);
        assert_eq!(Descriptor::copy_handles(2).encode(), 0x0400_0000);
        assert_eq!(Descriptor::move_handles(5).encode(), 0x1000_0010);
        assert_eq!(Descriptor::CallingPid.encode(), 0x0000_0020);
    }

    #[test]
    fn buffer_descriptors_match_wire_values() {
        let read = Descriptor::MappedBuffer {
            size: 0x20,
            permission: MappedBufferPermission::Read,
        };
        assert_eq!(read.encode(), 0x0000_020A);

        let read_write = Descriptor::MappedBuffer {
            size: 0x100,
            permission: MappedBufferPermission::ReadWrite,
        };
        assert_eq!(read_write.encode(), 0x0000_100E);

        let stat = Descriptor::StaticBuffer {
            buffer_id: 1,
            size: 0x10,
        };
        assert_eq!(stat.encode(), (0x10 << 14) | (1 << 10) | 0x2);
    }

    #[test]
    fn decode_reverses_encode() {
        let descriptors = [
            Descriptor::copy_handles(64),
            Descriptor::move_handles(3),
            Descriptor::CallingPid,
            Descriptor::StaticBuffer {
                buffer_id: 15,
                size: 0x3FFFF,
            },
            Descriptor::MappedBuffer {
                size: 0x0FFF_FFFF,
                permission: MappedBufferPermission::Write,
            },
        ];

        for descriptor in descriptors {
            assert_eq!(Descriptor::decode(descriptor.encode()), Ok(descriptor));
        }
    }

    #[test]
    fn payload_sizes() {
        assert_eq!(Descriptor::copy_handles(5).payload_words(), 5);
        assert_eq!(Descriptor::CallingPid.payload_words(), 1);
        assert_eq!(Descriptor::decode(0x0000_020A).unwrap().payload_words(), 1);
    }

    #[test]
    fn unknown_encodings_are_rejected() {
        // Handle class with type 3
        assert_eq!(
            Descriptor::decode(0x0000_0030),
            Err(UnsupportedDescriptor(0x30))
        );
        // PXI buffer
        assert_eq!(
            Descriptor::decode(0x0000_0104),
            Err(UnsupportedDescriptor(0x104))
        );
        // Mapped buffer without permission
        assert_eq!(
            Descriptor::decode(0x0000_0208),
            Err(UnsupportedDescriptor(0x208))
        );
        // Unknown low nibble
        assert_eq!(
            Descriptor::decode(0x0000_0001),
            Err(UnsupportedDescriptor(0x1))
        );
    }

    #[test]
    #[should_panic]
    fn zero_handle_count_is_rejected() {
        Descriptor::copy_handles(0);
    }
}
