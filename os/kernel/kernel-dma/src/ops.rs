//! Platform hooks the coherent allocator depends on.

use kernel_memory_addresses::{BusAddress, PhysicalAddress, VirtualAddress};

/// Data-cache and TLB maintenance by virtual address range.
///
/// Ranges need not be cache-line aligned; implementations widen them to
/// whole lines.
pub trait CacheMaintenance {
    /// Discard cached copies of `[start, start + len)` so the next CPU read
    /// comes from memory.
    fn invalidate_range(&self, start: VirtualAddress, len: u64);

    /// Write dirty lines of `[start, start + len)` back to memory.
    fn clean_range(&self, start: VirtualAddress, len: u64);

    /// Write back, then discard.
    fn clean_and_invalidate_range(&self, start: VirtualAddress, len: u64);

    /// Drop stale translations for every page in `[start, start + len)`.
    fn invalidate_tlb_range(&self, start: VirtualAddress, len: u64);
}

/// Translates a CPU physical address into the address a device must use.
pub trait BusTranslator {
    fn physical_to_bus(&self, pa: PhysicalAddress) -> BusAddress;
}

impl<T: CacheMaintenance + ?Sized> CacheMaintenance for &T {
    #[inline]
    fn invalidate_range(&self, start: VirtualAddress, len: u64) {
        (**self).invalidate_range(start, len);
    }

    #[inline]
    fn clean_range(&self, start: VirtualAddress, len: u64) {
        (**self).clean_range(start, len);
    }

    #[inline]
    fn clean_and_invalidate_range(&self, start: VirtualAddress, len: u64) {
        (**self).clean_and_invalidate_range(start, len);
    }

    #[inline]
    fn invalidate_tlb_range(&self, start: VirtualAddress, len: u64) {
        (**self).invalidate_tlb_range(start, len);
    }
}

impl<T: BusTranslator + ?Sized> BusTranslator for &T {
    #[inline]
    fn physical_to_bus(&self, pa: PhysicalAddress) -> BusAddress {
        (**self).physical_to_bus(pa)
    }
}
