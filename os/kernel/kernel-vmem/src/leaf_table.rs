use crate::table::ENTRIES;
use crate::{PageEntryBits, PhysMapper};
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_memory_addresses::{PageSize, PhysicalPage, Size2M, Size4K, VirtualAddress};

/// Handle on one page table (PT) covering a 2 MiB-aligned span of virtual
/// space.
///
/// Entries are accessed one at a time with atomic loads and stores, so
/// several CPUs may edit *different* entries of the same table without a
/// shared lock. Whoever owns a virtual page owns its entry.
///
/// The handle does not own the frame; the table stays linked in its address
/// space for as long as the handle is used.
pub struct LeafTable {
    page: PhysicalPage<Size4K>,
    span_base: VirtualAddress,
    entries: *mut u64,
}

// SAFETY: every access goes through a per-entry atomic.
unsafe impl Send for LeafTable {}
unsafe impl Sync for LeafTable {}

impl LeafTable {
    /// Bytes of virtual space one leaf table maps.
    pub const SPAN: u64 = Size2M::SIZE;

    /// # Safety
    /// - `page` must be a page table frame linked into the active address
    ///   space as the PT for `[span_base, span_base + SPAN)`.
    /// - `mapper` must map `page` writable for as long as the handle lives.
    pub unsafe fn new<M: PhysMapper>(
        mapper: &M,
        page: PhysicalPage<Size4K>,
        span_base: VirtualAddress,
    ) -> Self {
        debug_assert!(span_base.is_aligned::<Size2M>());
        Self {
            page,
            span_base,
            entries: mapper.phys_to_virt(page.base()).as_mut_ptr::<u64>(),
        }
    }

    /// Frame holding the table.
    #[inline]
    #[must_use]
    pub const fn page(&self) -> PhysicalPage<Size4K> {
        self.page
    }

    /// First virtual address mapped by this table.
    #[inline]
    #[must_use]
    pub const fn span_base(&self) -> VirtualAddress {
        self.span_base
    }

    /// Whether `va` is mapped through this table.
    #[inline]
    #[must_use]
    pub fn covers(&self, va: VirtualAddress) -> bool {
        va.as_u64()
            .checked_sub(self.span_base.as_u64())
            .is_some_and(|off| off < Self::SPAN)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn slot(&self, va: VirtualAddress) -> &AtomicU64 {
        assert!(self.covers(va), "{va} outside leaf table at {}", self.span_base);
        let index = ((va - self.span_base) >> Size4K::SHIFT) as usize;
        self.slot_at(index)
    }

    fn slot_at(&self, index: usize) -> &AtomicU64 {
        debug_assert!(index < ENTRIES);
        // SAFETY: index < 512 and the frame is a live, 8-byte aligned table.
        unsafe { AtomicU64::from_ptr(self.entries.add(index)) }
    }

    /// Current entry for the page containing `va`.
    ///
    /// # Panics
    /// If `va` is outside the span.
    #[inline]
    #[must_use]
    pub fn read(&self, va: VirtualAddress) -> PageEntryBits {
        PageEntryBits::from_bits(self.slot(va).load(Ordering::Acquire))
    }

    /// Write the entry for the page containing `va`.
    ///
    /// Does not flush the TLB; installing over an empty entry needs no flush.
    ///
    /// # Panics
    /// If `va` is outside the span.
    #[inline]
    pub fn install(&self, va: VirtualAddress, entry: PageEntryBits) {
        self.slot(va).store(entry.into_bits(), Ordering::Release);
    }

    /// Read and clear the entry for the page containing `va` in one step.
    ///
    /// The caller must invalidate the TLB for `va` afterwards.
    ///
    /// # Panics
    /// If `va` is outside the span.
    #[inline]
    pub fn take(&self, va: VirtualAddress) -> PageEntryBits {
        PageEntryBits::from_bits(self.slot(va).swap(0, Ordering::AcqRel))
    }

    /// Number of non-empty entries.
    #[must_use]
    pub fn used_entries(&self) -> usize {
        (0..ENTRIES)
            .filter(|&i| self.slot_at(i).load(Ordering::Relaxed) != 0)
            .count()
    }

    /// `true` if every entry is zero.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used_entries() == 0
    }
}

impl core::fmt::Debug for LeafTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LeafTable")
            .field("page", &self.page)
            .field("span_base", &self.span_base)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheAttributes;
    use crate::test_support::TestPhys;
    use kernel_memory_addresses::PhysicalAddress;

    fn table(phys: &TestPhys) -> LeafTable {
        unsafe {
            LeafTable::new(
                phys,
                PhysicalAddress::new(0).page(),
                VirtualAddress::new(0xffff_ffff_7fe0_0000),
            )
        }
    }

    #[test]
    fn covers_exactly_two_mib() {
        let phys = TestPhys::with_frames(1);
        let t = table(&phys);
        assert!(t.covers(VirtualAddress::new(0xffff_ffff_7fe0_0000)));
        assert!(t.covers(VirtualAddress::new(0xffff_ffff_7fff_ffff)));
        assert!(!t.covers(VirtualAddress::new(0xffff_ffff_8000_0000)));
        assert!(!t.covers(VirtualAddress::new(0xffff_ffff_7fdf_f000)));
    }

    #[test]
    fn install_read_take() {
        let phys = TestPhys::with_frames(1);
        let t = table(&phys);
        assert!(t.is_empty());

        let va = VirtualAddress::new(0xffff_ffff_7fe0_5000);
        let e = PageEntryBits::new_coherent(
            PhysicalAddress::new(0x0012_3000).page(),
            CacheAttributes::WriteCombining,
        );
        t.install(va, e);
        assert_eq!(t.read(va + 0x123), e);
        assert_eq!(t.used_entries(), 1);

        assert_eq!(t.take(va), e);
        assert!(t.read(va).is_empty());
        assert!(t.is_empty());
    }

    #[test]
    #[should_panic(expected = "outside leaf table")]
    fn access_outside_span_panics() {
        let phys = TestPhys::with_frames(1);
        let t = table(&phys);
        let _ = t.read(VirtualAddress::new(0x1000));
    }
}
