use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// A single 64-bit x86-64 page table entry in its raw bitfield form.
///
/// This is the common superset of the fields found in all four paging levels
/// (PML4E, PDPTE, PDE, PTE). An all-zero entry is *empty*: not present and
/// carrying no frame.
///
/// ### Bit layout
///
/// | Bits      | Name            | Meaning |
/// |-----------|-----------------|----------|
/// | 0         | `P`             | Present |
/// | 1         | `RW`            | Writable |
/// | 2         | `US`            | User-mode accessible |
/// | 3         | `PWT`           | Write-through / PAT index bit 0 |
/// | 4         | `PCD`           | Cache disable / PAT index bit 1 |
/// | 5         | `A`             | Accessed |
/// | 6         | `D`             | Dirty (leaf only) |
/// | 7         | `PS` / `PAT`    | Large page in PDE/PDPTE, PAT index bit 2 in a PTE |
/// | 8         | `G`             | Global (leaf only) |
/// | 9–11      | OS avail low    | Ignored by hardware |
/// | 12–51     | `addr`          | Physical frame bits [51:12] |
/// | 52–58     | OS avail high   | Ignored by hardware |
/// | 59–62     | `PKU`           | Protection key |
/// | 63        | `NX`            | Execute disable |
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PhysicalAddress;
/// # use kernel_vmem::PageEntryBits;
/// let mut e = PageEntryBits::new();
/// e.set_present(true);
/// e.set_writable(true);
/// e.set_physical_address(PhysicalAddress::new(0x12345000));
/// assert!(e.present());
/// assert_eq!(e.physical_address().as_u64(), 0x12345000);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    ///
    /// Together with `cache_disabled` and, in a PTE, bit 7 this selects one
    /// of the eight PAT entries.
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU on first access.
    pub accessed: bool,

    /// Dirty (D, bit 6), **leaf only**. Set by the CPU on first write.
    pub dirty: bool,

    /// Large Page / Page Size (PS, bit 7).
    ///
    /// In a PDE or PDPTE a set bit makes the entry a 2 MiB / 1 GiB leaf.
    /// In a PTE the same position is the PAT index bit 2; this crate always
    /// leaves it clear there.
    pub large_page: bool,

    /// Global (G, bit 8), **leaf only**.
    pub global_translation: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available_low: u8,

    /// Physical address bits [51:12] (bits 12..=51).
    #[bits(40)]
    phys_addr_bits_51_12: u64,

    /// OS-available (bits 52..=58).
    #[bits(7)]
    pub os_available_high: u8,

    /// Protection Key (PKU, bits 59..=62) if supported; otherwise OS use.
    #[bits(4)]
    pub protection_key: u8,

    /// No-Execute (NX, bit 63).
    pub no_execute: bool,
}

impl PageEntryBits {
    /// The all-zero entry.
    pub const EMPTY: Self = Self::new();

    #[inline]
    pub const fn set_physical_address(&mut self, phys: PhysicalAddress) {
        // store bits [51:12]
        self.set_phys_addr_bits_51_12(phys.as_u64() >> 12);
    }

    #[inline]
    #[must_use]
    pub const fn with_physical_address(mut self, phys: PhysicalAddress) -> Self {
        self.set_physical_address(phys);
        self
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.phys_addr_bits_51_12() << 12)
    }

    /// The 4 KiB frame this entry refers to.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(self.physical_address())
    }

    /// `true` if no bit at all is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.into_bits() == 0
    }

    /// Flags for a supervisor non-leaf entry pointing at the next table.
    #[inline]
    #[must_use]
    pub const fn new_table_link() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Leaf entry for a device-coherent kernel page.
    ///
    /// Present, writable, supervisor-only, non-executable, with `accessed`
    /// and `dirty` preset so the CPU never has to write the entry back, and
    /// the memory type selected by `cache`.
    #[inline]
    #[must_use]
    pub const fn new_coherent(frame: PhysicalPage<Size4K>, cache: CacheAttributes) -> Self {
        cache.apply(
            Self::new()
                .with_present(true)
                .with_writable(true)
                .with_accessed(true)
                .with_dirty(true)
                .with_no_execute(true)
                .with_physical_address(frame.base()),
        )
    }

    /// Decode the memory type of a 4 KiB leaf, if it is one of ours.
    #[inline]
    #[must_use]
    pub const fn cache_attributes(&self) -> Option<CacheAttributes> {
        if self.large_page() {
            return None;
        }
        match (self.cache_disabled(), self.write_through()) {
            (true, true) => Some(CacheAttributes::Uncached),
            (true, false) => Some(CacheAttributes::UncachedMinus),
            (false, true) => Some(CacheAttributes::WriteCombining),
            (false, false) => None,
        }
    }
}

/// Memory type of a device-coherent leaf mapping.
///
/// Encoded through the PAT index bits (`PAT:PCD:PWT`) of a 4 KiB PTE. The
/// encodings assume the Linux-compatible PAT layout:
///
/// | Index | Type |
/// |-------|------|
/// | 0     | WB   |
/// | 1     | WC   |
/// | 2     | UC-  |
/// | 3     | UC   |
///
/// With the power-on PAT, index 1 is write-through instead of WC, which is
/// still coherent for device reads.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum CacheAttributes {
    /// Strong uncacheable (UC), PAT index 3.
    #[default]
    Uncached,
    /// Uncacheable, MTRR may override to WC (UC-), PAT index 2.
    UncachedMinus,
    /// Write-combining (WC), PAT index 1.
    WriteCombining,
}

impl CacheAttributes {
    /// Set the PAT index bits of `entry` for this memory type.
    #[inline]
    #[must_use]
    pub const fn apply(self, entry: PageEntryBits) -> PageEntryBits {
        let (pcd, pwt) = match self {
            Self::Uncached => (true, true),
            Self::UncachedMinus => (true, false),
            Self::WriteCombining => (false, true),
        };
        entry
            .with_large_page(false)
            .with_cache_disabled(pcd)
            .with_write_through(pwt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn coherent_entry_bits() {
        let frame = PhysicalAddress::new(0x0030_5000).page();
        let e = PageEntryBits::new_coherent(frame, CacheAttributes::Uncached);
        assert!(e.present());
        assert!(e.writable());
        assert!(e.accessed());
        assert!(e.dirty());
        assert!(e.no_execute());
        assert!(!e.user_access());
        assert!(!e.global_translation());
        assert_eq!(e.frame(), frame);
        // P | RW | PWT | PCD | A | D  and NX
        assert_eq!(e.into_bits(), 0x8000_0000_0030_507B);
    }

    #[test]
    fn cache_attributes_roundtrip_through_pat_bits() {
        let frame = PhysicalAddress::new(0x1000).page();
        for attrs in [
            CacheAttributes::Uncached,
            CacheAttributes::UncachedMinus,
            CacheAttributes::WriteCombining,
        ] {
            let e = PageEntryBits::new_coherent(frame, attrs);
            assert_eq!(e.cache_attributes(), Some(attrs));
        }
        assert_eq!(PageEntryBits::new_table_link().cache_attributes(), None);
    }

    #[test]
    fn empty_entry() {
        assert!(PageEntryBits::EMPTY.is_empty());
        assert!(!PageEntryBits::new_table_link().is_empty());
        assert_eq!(PageEntryBits::EMPTY.physical_address().as_u64(), 0);
    }
}
