//! Emulated process address spaces.
//!
//! Guest memory is modelled as a sparse set of zero-filled 4 KiB pages. Accesses are checked for
//! the whole range before any byte is copied, so a failing write leaves memory untouched.

use alloc::{boxed::Box, collections::BTreeMap};

use crate::result::{ERR_INVALID_ADDRESS, ResultCode, ToRawResultCode};

/// A guest virtual address.
pub type VAddr = u32;

/// Size of a guest page in bytes.
pub const PAGE_SIZE: usize = 0x1000;

const PAGE_BITS: u32 = 12;
const PAGE_MASK: u64 = PAGE_SIZE as u64 - 1;

type Page = Box<[u8; PAGE_SIZE]>;

/// Error returned by address space and shared memory accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// Part of the accessed range is not mapped.
    #[error("Unmapped guest address {address:#010X}")]
    Unmapped { address: u64 },
    /// The access falls outside a fixed-size block.
    #[error("Access at offset {offset:#X} of {len:#X} bytes is out of range")]
    OutOfRange { offset: usize, len: usize },
}

impl ToRawResultCode for MemoryError {
    fn to_rc(self) -> ResultCode {
        ERR_INVALID_ADDRESS
    }
}

/// The address space of one emulated process.
#[derive(Default)]
pub struct AddressSpace {
    pages: BTreeMap<u32, Page>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps every page overlapping `[address, address + size)`.
    ///
    /// Already mapped pages keep their contents.
    pub fn map(&mut self, address: VAddr, size: usize) {
        for page in page_range(address, size) {
            self.pages
                .entry(page)
                .or_insert_with(|| Box::new([0; PAGE_SIZE]));
        }
    }

    /// Unmaps every page overlapping `[address, address + size)`.
    pub fn unmap(&mut self, address: VAddr, size: usize) {
        for page in page_range(address, size) {
            self.pages.remove(&page);
        }
    }

    /// Returns `true` if the whole range is mapped and inside the 32-bit address space.
    pub fn is_mapped(&self, address: VAddr, size: usize) -> bool {
        self.check_mapped(address, size).is_ok()
    }

    pub fn read_block(&self, address: VAddr, out: &mut [u8]) -> Result<(), MemoryError> {
        self.check_mapped(address, out.len())?;

        let mut cursor = address as u64;
        let mut done = 0;
        while done < out.len() {
            let offset = (cursor & PAGE_MASK) as usize;
            let chunk = (PAGE_SIZE - offset).min(out.len() - done);
            let page = &self.pages[&((cursor >> PAGE_BITS) as u32)];
            out[done..done + chunk].copy_from_slice(&page[offset..offset + chunk]);

            done += chunk;
            cursor += chunk as u64;
        }

        Ok(())
    }

    pub fn write_block(&mut self, address: VAddr, data: &[u8]) -> Result<(), MemoryError> {
        self.check_mapped(address, data.len())?;

        let mut cursor = address as u64;
        let mut done = 0;
        while done < data.len() {
            let offset = (cursor & PAGE_MASK) as usize;
            let chunk = (PAGE_SIZE - offset).min(data.len() - done);
            let Some(page) = self.pages.get_mut(&((cursor >> PAGE_BITS) as u32)) else {
                return Err(MemoryError::Unmapped { address: cursor });
            };
            page[offset..offset + chunk].copy_from_slice(&data[done..done + chunk]);

            done += chunk;
            cursor += chunk as u64;
        }

        Ok(())
    }

    pub fn read_u32(&self, address: VAddr) -> Result<u32, MemoryError> {
        let mut bytes = [0u8; 4];
        self.read_block(address, &mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn write_u32(&mut self, address: VAddr, value: u32) -> Result<(), MemoryError> {
        self.write_block(address, &value.to_le_bytes())
    }

    /// Reads consecutive little-endian words.
    pub fn read_words(&self, address: VAddr, out: &mut [u32]) -> Result<(), MemoryError> {
        self.check_mapped(address, out.len() * 4)?;
        for (i, word) in out.iter_mut().enumerate() {
            *word = self.read_u32(address + (i as u32) * 4)?;
        }
        Ok(())
    }

    /// Writes consecutive little-endian words. Nothing is written if any word would fault.
    pub fn write_words(&mut self, address: VAddr, words: &[u32]) -> Result<(), MemoryError> {
        self.check_mapped(address, words.len() * 4)?;
        for (i, word) in words.iter().enumerate() {
            self.write_u32(address + (i as u32) * 4, *word)?;
        }
        Ok(())
    }

    fn check_mapped(&self, address: VAddr, size: usize) -> Result<(), MemoryError> {
        let end = address as u64 + size as u64;
        if end > 1 << 32 {
            return Err(MemoryError::Unmapped { address: 1 << 32 });
        }

        match page_range(address, size).find(|page| !self.pages.contains_key(page)) {
            Some(page) => Err(MemoryError::Unmapped {
                address: (page as u64) << PAGE_BITS,
            }),
            None => Ok(()),
        }
    }
}

impl core::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("mapped_pages", &self.pages.len())
            .finish()
    }
}

/// Page numbers overlapping `[address, address + size)`, clamped to the 32-bit space.
fn page_range(address: VAddr, size: usize) -> impl Iterator<Item = u32> {
    let start = address as u64 >> PAGE_BITS;
    let end = if size == 0 {
        start
    } else {
        ((address as u64 + size as u64 - 1) >> PAGE_BITS).min(u32::MAX as u64 >> PAGE_BITS) + 1
    };
    (start..end).map(|page| page as u32)
}
