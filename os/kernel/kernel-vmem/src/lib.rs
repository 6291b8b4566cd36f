//! # Virtual Memory Support
//!
//! x86-64 four-level paging helpers for kernel subsystems that own a fixed
//! piece of virtual address space and edit its leaf entries directly.
//!
//! ## What you get
//! - [`PageEntryBits`]: one 64-bit page table entry as a bitfield, plus
//!   [`CacheAttributes`] for the memory type of a leaf mapping.
//! - [`PageTable`]: a 4 KiB-aligned table of 512 entries and index helpers.
//! - [`AddressSpace`]: walks a PML4-rooted tree, creates missing intermediate
//!   tables ([`AddressSpace::ensure_leaf_table`]) and translates addresses
//!   ([`AddressSpace::query`]).
//! - [`LeafTable`]: a handle on one page table (PT) that reads, installs and
//!   clears individual PTEs without borrowing the whole table.
//! - The allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! Each level holds 512 entries of 8 bytes. A PDE with `PS=1` maps a 2 MiB
//! page, a PDPTE with `PS=1` maps a 1 GiB page; everything else points at
//! the next table. One PT therefore covers exactly 2 MiB of virtual space,
//! which is what a [`LeafTable`] represents.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod address_space;
mod entry;
mod leaf_table;
mod table;

pub use crate::address_space::{AddressSpace, EnsureTableError};
pub use crate::entry::{CacheAttributes, PageEntryBits};
pub use crate::leaf_table::LeafTable;
pub use crate::table::{PageTable, TableIndices};

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// Minimal frame allocator used to obtain **physical** 4 KiB frames
/// for page tables.
///
/// The implementation decides where frames come from (bootloader pool,
/// bitmap, etc.). Returned frames **must** be 4 KiB aligned.
///
/// Returns `None` on out-of-memory.
pub trait FrameAlloc {
    /// Allocate one 4 KiB *physical* frame for page tables.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;
}

/// Converts physical addresses to usable virtual addresses in the current
/// address space (e.g., via identity map or a higher-half direct map, HHDM).
///
/// Typical patterns:
/// - **Loader**: often identity-maps low memory.
/// - **Kernel**: uses HHDM; adds a constant offset.
/// - **Tests**: translate into a heap buffer that stands in for RAM.
pub trait PhysMapper {
    /// Virtual address at which the byte at `pa` is visible.
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress;

    /// Convert a *physical* address to a mutable reference in the current
    /// address space.
    ///
    /// # Safety
    /// - `pa` must be mapped writable through this mapper for `'a`.
    /// - Type `T` must match the bytes at `pa` and nothing else may alias
    ///   them while the reference lives.
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.phys_to_virt(pa).as_mut_ptr::<T>() }
    }
}
