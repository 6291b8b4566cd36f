//! # Address Space (x86-64, PML4-rooted)
//!
//! Helpers to walk and extend a **single** virtual address space.
//!
//! - [`AddressSpace::ensure_leaf_table`] allocates and links missing PDPT,
//!   PD and PT frames down to the page table that holds the 4 KiB leaf for a
//!   virtual address.
//! - [`AddressSpace::leaf_table`] finds that page table without creating
//!   anything.
//! - [`AddressSpace::query`] translates a VA to a PA (handles huge pages).
//!
//! Non-leaf entries are created with caller-provided flags. The address space
//! never splits an existing huge page: a 2 MiB or 1 GiB leaf in the way is
//! reported as [`EnsureTableError::HugeLeafInTheWay`].
//!
//! Mutating an address space needs outside serialization; callers usually
//! keep the `AddressSpace` behind the kernel's page-table lock.

use crate::table::TableIndices;
use crate::{FrameAlloc, PageEntryBits, PageTable, PhysMapper};
use kernel_memory_addresses::{
    PageSize, PhysicalAddress, PhysicalPage, Size2M, Size4K, VirtualAddress,
};

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>, // PML4 frame
    mapper: &'m M,
}

/// Error returned by [`AddressSpace::ensure_leaf_table`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum EnsureTableError {
    #[error("out of memory (PDPT)")]
    OomPdpt,
    #[error("out of memory (PD)")]
    OomPd,
    #[error("out of memory (PT)")]
    OomPt,
    #[error("a huge page already maps {0}")]
    HugeLeafInTheWay(VirtualAddress),
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    #[inline]
    pub const fn from_root(mapper: &'m M, root: PhysicalPage<Size4K>) -> Self {
        Self { root, mapper }
    }

    /// Physical page of the PML4.
    #[inline]
    pub const fn root_page(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    #[inline]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    /// Borrow the table stored in `page`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn table_mut(&self, page: PhysicalPage<Size4K>) -> &mut PageTable {
        // SAFETY: page-table frames are only reachable through this address
        // space, which the caller serializes.
        unsafe { self.mapper.phys_to_mut::<PageTable>(page.base()) }
    }

    /// Follow `table[index]` to the next table, or allocate, zero and link a
    /// new one.
    fn next_or_create<A: FrameAlloc>(
        &self,
        table: &mut PageTable,
        index: u16,
        alloc: &mut A,
        nonleaf: PageEntryBits,
        oom: EnsureTableError,
        va: VirtualAddress,
    ) -> Result<PhysicalPage<Size4K>, EnsureTableError> {
        let e = table.get(index);
        if e.present() {
            if e.large_page() {
                return Err(EnsureTableError::HugeLeafInTheWay(va));
            }
            return Ok(e.frame());
        }

        let page = alloc.alloc_4k().ok_or(oom)?;
        self.table_mut(page).zero();
        table.set(index, nonleaf.with_physical_address(page.base()));
        log::trace!("linked new table {page} for {va}");
        Ok(page)
    }

    /// Ensure the PDPT → PD → PT chain for `va` exists and return the PT
    /// frame that holds the 4 KiB leaf for `va`.
    ///
    /// Newly created tables are zeroed and linked with `nonleaf` flags.
    ///
    /// # Errors
    /// - [`EnsureTableError::OomPdpt`] / [`OomPd`](EnsureTableError::OomPd) /
    ///   [`OomPt`](EnsureTableError::OomPt) if a table frame can't be allocated.
    ///   Tables linked before the failure stay in place.
    /// - [`EnsureTableError::HugeLeafInTheWay`] if `va` is covered by a
    ///   1 GiB or 2 MiB mapping.
    pub fn ensure_leaf_table<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        nonleaf: PageEntryBits,
    ) -> Result<PhysicalPage<Size4K>, EnsureTableError> {
        let i = TableIndices::from(va);

        let pml4 = self.table_mut(self.root);
        let pdpt_page =
            self.next_or_create(pml4, i.pml4, alloc, nonleaf, EnsureTableError::OomPdpt, va)?;

        let pdpt = self.table_mut(pdpt_page);
        let pd_page =
            self.next_or_create(pdpt, i.pdpt, alloc, nonleaf, EnsureTableError::OomPd, va)?;

        let pd = self.table_mut(pd_page);
        self.next_or_create(pd, i.pd, alloc, nonleaf, EnsureTableError::OomPt, va)
    }

    /// The PT frame holding the 4 KiB leaf for `va`, if the chain exists and
    /// no huge page covers `va`.
    #[must_use]
    pub fn leaf_table(&self, va: VirtualAddress) -> Option<PhysicalPage<Size4K>> {
        let i = TableIndices::from(va);
        let mut page = self.root;
        for index in [i.pml4, i.pdpt, i.pd] {
            let e = self.table_mut(page).get(index);
            if !e.present() || e.large_page() {
                return None;
            }
            page = e.frame();
        }
        Some(page)
    }

    /// Translate a **single** virtual address to physical.
    ///
    /// Handles 1 GiB and 2 MiB leaves. Returns `None` if unmapped.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        const SIZE_1G: u64 = 1 << 30;
        let i = TableIndices::from(va);

        let e4 = self.table_mut(self.root).get(i.pml4);
        if !e4.present() {
            return None;
        }

        let e3 = self.table_mut(e4.frame()).get(i.pdpt);
        if !e3.present() {
            return None;
        }
        if e3.large_page() {
            let base = e3.physical_address().as_u64() & !(SIZE_1G - 1);
            return Some(PhysicalAddress::new(base + (va.as_u64() & (SIZE_1G - 1))));
        }

        let e2 = self.table_mut(e3.frame()).get(i.pd);
        if !e2.present() {
            return None;
        }
        if e2.large_page() {
            let mask = Size2M::SIZE - 1;
            let base = e2.physical_address().as_u64() & !mask;
            return Some(PhysicalAddress::new(base + (va.as_u64() & mask)));
        }

        let e1 = self.table_mut(e2.frame()).get(i.pt);
        if !e1.present() {
            return None;
        }
        Some(e1.physical_address() + va.offset_in::<Size4K>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{BumpAlloc, TestPhys};
    use crate::{CacheAttributes, LeafTable};

    fn fresh_space<'a>(phys: &'a TestPhys, alloc: &mut BumpAlloc) -> AddressSpace<'a, TestPhys> {
        // frames come from zeroed memory
        let root = alloc.alloc_4k().unwrap();
        AddressSpace::from_root(phys, root)
    }

    #[test]
    fn ensure_creates_three_tables_once() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc { next: 0, end: 16 << 12 };
        let aspace = fresh_space(&phys, &mut alloc);

        let va = VirtualAddress::new(0xffff_ffff_7fe0_0000);
        let pt = aspace
            .ensure_leaf_table(&mut alloc, va, PageEntryBits::new_table_link())
            .expect("ensure");
        assert_eq!(alloc.next, 4 << 12, "PDPT, PD and PT allocated");
        assert_eq!(aspace.leaf_table(va), Some(pt));

        // Same 2 MiB granule: nothing new allocated.
        let again = aspace
            .ensure_leaf_table(&mut alloc, va + 0x1f_f000, PageEntryBits::new_table_link())
            .unwrap();
        assert_eq!(again, pt);
        assert_eq!(alloc.next, 4 << 12);
    }

    #[test]
    fn ensure_reports_which_level_ran_out() {
        let phys = TestPhys::with_frames(4);
        let mut alloc = BumpAlloc { next: 0, end: 3 << 12 };
        let aspace = fresh_space(&phys, &mut alloc);

        let err = aspace
            .ensure_leaf_table(&mut alloc, VirtualAddress::new(0x1000), PageEntryBits::new_table_link())
            .unwrap_err();
        assert_eq!(err, EnsureTableError::OomPt);
    }

    #[test]
    fn huge_page_is_not_split() {
        let phys = TestPhys::with_frames(8);
        let mut alloc = BumpAlloc { next: 0, end: 8 << 12 };
        let aspace = fresh_space(&phys, &mut alloc);

        aspace
            .ensure_leaf_table(&mut alloc, VirtualAddress::new(0), PageEntryBits::new_table_link())
            .unwrap();

        // 1 GiB leaf at PDPT[1]
        let pdpt = aspace.table_mut(aspace.root_page()).get(0).frame();
        aspace.table_mut(pdpt).set(
            1,
            PageEntryBits::new()
                .with_present(true)
                .with_large_page(true)
                .with_physical_address(PhysicalAddress::new(0x4000_0000)),
        );

        let va = VirtualAddress::new(0x4000_0000);
        let before = alloc.next;
        let err = aspace
            .ensure_leaf_table(&mut alloc, va, PageEntryBits::new_table_link())
            .unwrap_err();
        assert_eq!(err, EnsureTableError::HugeLeafInTheWay(va));
        assert_eq!(alloc.next, before);
        assert_eq!(aspace.leaf_table(va), None);
        assert_eq!(
            aspace.query(va + 0x1234),
            Some(PhysicalAddress::new(0x4000_1234))
        );
    }

    #[test]
    fn query_follows_installed_leaf() {
        let phys = TestPhys::with_frames(8);
        let mut alloc = BumpAlloc { next: 0, end: 8 << 12 };
        let aspace = fresh_space(&phys, &mut alloc);

        let va = VirtualAddress::new(0xffff_ffff_7fe0_3000);
        let pt = aspace
            .ensure_leaf_table(&mut alloc, va, PageEntryBits::new_table_link())
            .unwrap();
        let leaf = unsafe { LeafTable::new(aspace.mapper(), pt, va.page::<Size2M>().base()) };
        let frame = PhysicalAddress::new(0x0030_0000).page();
        leaf.install(va, PageEntryBits::new_coherent(frame, CacheAttributes::Uncached));

        assert_eq!(aspace.query(va + 0x10), Some(PhysicalAddress::new(0x0030_0010)));
        assert_eq!(aspace.query(va + 0x1000), None);
    }
}
