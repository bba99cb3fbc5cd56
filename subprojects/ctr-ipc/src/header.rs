//! Command header word.
//!
//! ```text
//! Bits 0-5:   translate_params_size
//! Bits 6-11:  normal_params_size
//! Bits 12-15: reserved
//! Bits 16-31: command_id
//! ```
//!
//! `0x0001_0082` is command `1` carrying 2 normal words and 2 translate words.

use core::mem::size_of;

use modular_bitfield::prelude::*;
use static_assertions::const_assert_eq;

/// Bits 12-15 of the header word.
const RESERVED_MASK: u32 = 0x0000_F000;

/// The first word of every command buffer.
#[bitfield]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Header {
    /// Number of words in the translate region.
    pub translate_params_size: B6,
    /// Number of plain parameter words.
    pub normal_params_size: B6,
    /// Padding bits.
    #[skip]
    __padding: B4,
    /// Command (or reply) identifier.
    pub command_id: B16,
}

const_assert_eq!(size_of::<Header>(), 4);

impl Header {
    /// Builds a header word.
    ///
    /// # Panics
    ///
    /// Panics if either size does not fit in 6 bits.
    pub fn for_command(command_id: u16, normal_params_size: u8, translate_params_size: u8) -> Self {
        Self::new()
            .with_command_id(command_id)
            .with_normal_params_size(normal_params_size)
            .with_translate_params_size(translate_params_size)
    }

    /// Decodes a raw header word. Reserved bits are ignored.
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        Self::from_bytes((raw & !RESERVED_MASK).to_le_bytes())
    }

    /// Encodes the header into its raw word.
    #[inline]
    pub fn to_raw(self) -> u32 {
        u32::from_le_bytes(self.into_bytes())
    }

    /// Words that are copied verbatim: the header plus the normal parameters.
    #[inline]
    pub fn untranslated_size(&self) -> usize {
        1 + self.normal_params_size() as usize
    }

    /// Total words of the command, header included.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.untranslated_size() + self.translate_params_size() as usize
    }
}
