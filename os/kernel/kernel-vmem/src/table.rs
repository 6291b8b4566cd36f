use crate::PageEntryBits;
use kernel_memory_addresses::VirtualAddress;

/// Number of entries in every paging structure.
pub const ENTRIES: usize = 512;

/// One 4 KiB paging structure (PML4, PDPT, PD or PT).
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntryBits; ENTRIES],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl PageTable {
    /// Set all entries to zero (not present).
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageEntryBits::EMPTY);
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: u16) -> PageEntryBits {
        self.entries[i as usize]
    }

    #[inline]
    pub const fn set(&mut self, i: u16, e: PageEntryBits) {
        self.entries[i as usize] = e;
    }

    /// `true` if every entry is zero.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(PageEntryBits::is_empty)
    }
}

/// The four table indices a virtual address selects.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TableIndices {
    pub pml4: u16,
    pub pdpt: u16,
    pub pd: u16,
    pub pt: u16,
}

impl From<VirtualAddress> for TableIndices {
    #[allow(clippy::cast_possible_truncation)]
    fn from(va: VirtualAddress) -> Self {
        let v = va.as_u64();
        Self {
            pml4: ((v >> 39) & 0x1ff) as u16,
            pdpt: ((v >> 30) & 0x1ff) as u16,
            pd: ((v >> 21) & 0x1ff) as u16,
            pt: ((v >> 12) & 0x1ff) as u16,
        }
    }
}
