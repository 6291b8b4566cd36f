//! Physical page-frame allocation.
//!
//! [`PageFrameAlloc`] is the interface the coherent DMA allocator consumes:
//! power-of-two runs of contiguous 4 KiB frames, freed either as a whole run
//! or page by page. [`BitmapFrameAlloc`] implements it over one contiguous
//! physical range with one bit per frame.

use alloc::vec;
use alloc::vec::Vec;
use kernel_info::memory::DMA_ZONE_LIMIT;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::FrameAlloc;
use log::{error, trace};

/// Largest supported run order: `2^MAX_ORDER` pages (4 MiB).
pub const MAX_ORDER: u32 = 10;

bitflags::bitflags! {
    /// Allocation modifiers for [`PageFrameAlloc::alloc_pages`].
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct AllocFlags: u32 {
        /// The memory must read as zero when handed to the final user.
        ///
        /// Frame allocators without a view of the memory pass the flag
        /// through; the coherent allocator clears runs itself.
        const ZERO = 1 << 0;

        /// The run must lie entirely below
        /// [`DMA_ZONE_LIMIT`](kernel_info::memory::DMA_ZONE_LIMIT).
        const DMA = 1 << 1;
    }
}

/// Smallest order whose run holds `pages` pages, i.e. `ceil(log2(pages))`.
///
/// Returns `None` if the run would exceed [`MAX_ORDER`].
///
/// ```
/// # use kernel_alloc::frame_alloc::order_for_pages;
/// assert_eq!(order_for_pages(1), Some(0));
/// assert_eq!(order_for_pages(3), Some(2));
/// assert_eq!(order_for_pages(4), Some(2));
/// assert_eq!(order_for_pages(1025), None);
/// ```
#[must_use]
pub const fn order_for_pages(pages: u64) -> Option<u32> {
    let order = pages.next_power_of_two().trailing_zeros();
    if order > MAX_ORDER { None } else { Some(order) }
}

/// `2^order` physically contiguous 4 KiB frames, aligned to their size.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PhysicalRun {
    first: PhysicalPage<Size4K>,
    order: u32,
}

impl PhysicalRun {
    #[inline]
    #[must_use]
    pub const fn new(first: PhysicalPage<Size4K>, order: u32) -> Self {
        Self { first, order }
    }

    #[inline]
    #[must_use]
    pub const fn first(&self) -> PhysicalPage<Size4K> {
        self.first
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.first.base()
    }

    #[inline]
    #[must_use]
    pub const fn order(&self) -> u32 {
        self.order
    }

    /// Number of frames (`2^order`).
    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u64 {
        1 << self.order
    }

    #[inline]
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.pages() * Size4K::SIZE
    }

    /// Frame `i` of the run.
    ///
    /// # Panics
    /// If `i` is not below [`pages`](Self::pages).
    #[inline]
    #[must_use]
    pub const fn page(&self, i: u64) -> PhysicalPage<Size4K> {
        assert!(i < self.pages());
        self.first.nth(i)
    }

    /// Frames of the run, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PhysicalPage<Size4K>> + use<> {
        let first = self.first;
        (0..self.pages()).map(move |i| first.nth(i))
    }
}

/// Allocator of contiguous physical page runs.
pub trait PageFrameAlloc {
    /// Allocate `2^order` contiguous frames honoring `flags`.
    ///
    /// Returns `None` when no suitable run is free.
    fn alloc_pages(&mut self, flags: AllocFlags, order: u32) -> Option<PhysicalRun>;

    /// Return a whole run obtained from [`alloc_pages`](Self::alloc_pages).
    fn free_pages(&mut self, run: PhysicalRun);

    /// Return a single frame. The frame may be part of a larger run whose
    /// other frames stay allocated.
    fn free_page(&mut self, page: PhysicalPage<Size4K>);

    /// Whether `page` is a frame this allocator manages.
    fn is_valid(&self, page: PhysicalPage<Size4K>) -> bool;
}

/// Bitmap allocator over `[base, base + frames * 4 KiB)`.
///
/// One bit per frame (set = used). Runs of order `n` start at a frame number
/// that is a multiple of `2^n`, so run bases are naturally aligned. Single
/// frames can be freed out of any run.
pub struct BitmapFrameAlloc {
    first_pfn: u64,
    frames: u64,
    used: Vec<u64>,
    free: u64,
    dma_limit_pfn: u64,
}

impl BitmapFrameAlloc {
    /// Manage `frames` frames starting at `base` (rounded down to 4 KiB).
    /// All frames start out free.
    #[must_use]
    pub fn new(base: PhysicalAddress, frames: u64) -> Self {
        let words = usize::try_from(frames.div_ceil(64)).unwrap_or(usize::MAX);
        Self {
            first_pfn: base.page::<Size4K>().frame_number(),
            frames,
            used: vec![0; words],
            free: frames,
            dma_limit_pfn: DMA_ZONE_LIMIT >> Size4K::SHIFT,
        }
    }

    /// Override the DMA zone boundary (exclusive physical address).
    #[must_use]
    pub const fn with_dma_limit(mut self, limit: PhysicalAddress) -> Self {
        self.dma_limit_pfn = limit.as_u64() >> Size4K::SHIFT;
        self
    }

    /// Number of frames currently free.
    #[inline]
    #[must_use]
    pub const fn free_frames(&self) -> u64 {
        self.free
    }

    /// Whether `page` is managed and currently allocated.
    #[must_use]
    pub fn is_allocated(&self, page: PhysicalPage<Size4K>) -> bool {
        self.index_of(page).is_some_and(|i| self.test(i))
    }

    /// Take `page` out of circulation (firmware, kernel image, ...).
    pub fn mark_used(&mut self, page: PhysicalPage<Size4K>) {
        if let Some(i) = self.index_of(page)
            && !self.test(i)
        {
            self.set(i);
            self.free -= 1;
        }
    }

    fn index_of(&self, page: PhysicalPage<Size4K>) -> Option<u64> {
        let i = page.frame_number().checked_sub(self.first_pfn)?;
        (i < self.frames).then_some(i)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn test(&self, i: u64) -> bool {
        self.used[(i / 64) as usize] & (1 << (i % 64)) != 0
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set(&mut self, i: u64) {
        self.used[(i / 64) as usize] |= 1 << (i % 64);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn clear(&mut self, i: u64) {
        self.used[(i / 64) as usize] &= !(1 << (i % 64));
    }

    fn range_free(&self, start: u64, n: u64) -> bool {
        (start..start + n).all(|i| !self.test(i))
    }

    fn release(&mut self, page: PhysicalPage<Size4K>) {
        match self.index_of(page) {
            Some(i) if self.test(i) => {
                self.clear(i);
                self.free += 1;
            }
            Some(_) => error!("double free of frame {page}"),
            None => error!("freeing unmanaged frame {page}"),
        }
    }
}

impl PageFrameAlloc for BitmapFrameAlloc {
    fn alloc_pages(&mut self, flags: AllocFlags, order: u32) -> Option<PhysicalRun> {
        if order > MAX_ORDER {
            return None;
        }
        let n = 1u64 << order;
        if self.free < n {
            return None;
        }

        let mut end_pfn = self.first_pfn + self.frames;
        if flags.contains(AllocFlags::DMA) {
            end_pfn = end_pfn.min(self.dma_limit_pfn);
        }

        let mut pfn = self.first_pfn.next_multiple_of(n);
        while pfn + n <= end_pfn {
            let start = pfn - self.first_pfn;
            if self.range_free(start, n) {
                for i in start..start + n {
                    self.set(i);
                }
                self.free -= n;
                let run = PhysicalRun::new(PhysicalPage::from_frame_number(pfn), order);
                trace!("alloc_pages({flags:?}, {order}) = {}", run.first());
                return Some(run);
            }
            pfn += n;
        }
        None
    }

    fn free_pages(&mut self, run: PhysicalRun) {
        trace!("free_pages({}, {})", run.first(), run.order());
        for page in run.iter() {
            self.release(page);
        }
    }

    fn free_page(&mut self, page: PhysicalPage<Size4K>) {
        trace!("free_page({page})");
        self.release(page);
    }

    fn is_valid(&self, page: PhysicalPage<Size4K>) -> bool {
        self.index_of(page).is_some()
    }
}

impl FrameAlloc for BitmapFrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.alloc_pages(AllocFlags::empty(), 0).map(|run| run.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(pa: u64) -> PhysicalPage<Size4K> {
        PhysicalAddress::new(pa).page()
    }

    #[test]
    fn orders() {
        assert_eq!(order_for_pages(0), Some(0));
        assert_eq!(order_for_pages(2), Some(1));
        assert_eq!(order_for_pages(5), Some(3));
        assert_eq!(order_for_pages(1024), Some(MAX_ORDER));
        assert_eq!(order_for_pages(1025), None);
    }

    #[test]
    fn runs_are_aligned_to_their_size() {
        // base deliberately not 16 KiB aligned
        let mut a = BitmapFrameAlloc::new(PhysicalAddress::new(0x10_1000), 64);
        let single = a.alloc_pages(AllocFlags::empty(), 0).unwrap();
        assert_eq!(single.base().as_u64(), 0x10_1000);

        let run = a.alloc_pages(AllocFlags::empty(), 2).unwrap();
        assert_eq!(run.base().as_u64() % (4 * 4096), 0);
        assert_eq!(run.base().as_u64(), 0x10_4000);
        assert_eq!(a.free_frames(), 64 - 1 - 4);
    }

    #[test]
    fn exhaustion_returns_none_and_changes_nothing() {
        let mut a = BitmapFrameAlloc::new(PhysicalAddress::new(0x20_0000), 4);
        assert!(a.alloc_pages(AllocFlags::empty(), 3).is_none());
        assert_eq!(a.free_frames(), 4);

        let run = a.alloc_pages(AllocFlags::empty(), 2).unwrap();
        assert!(a.alloc_pages(AllocFlags::empty(), 0).is_none());
        a.free_pages(run);
        assert_eq!(a.free_frames(), 4);
    }

    #[test]
    fn surplus_pages_freed_individually() {
        let mut a = BitmapFrameAlloc::new(PhysicalAddress::new(0x40_0000), 8);
        let run = a.alloc_pages(AllocFlags::empty(), 2).unwrap();
        a.free_page(run.page(3));
        assert_eq!(a.free_frames(), 5);
        assert!(a.is_allocated(run.page(2)));
        assert!(!a.is_allocated(run.page(3)));

        // the hole can be handed out again as a single frame
        for p in 0..3 {
            a.free_page(run.page(p));
        }
        assert_eq!(a.free_frames(), 8);
    }

    #[test]
    fn dma_flag_stays_below_zone_limit() {
        let mut a = BitmapFrameAlloc::new(PhysicalAddress::new(0x1_0000), 32)
            .with_dma_limit(PhysicalAddress::new(0x1_4000));
        let low = a.alloc_pages(AllocFlags::DMA, 2).unwrap();
        assert_eq!(low.base().as_u64(), 0x1_0000);
        assert!(a.alloc_pages(AllocFlags::DMA, 0).is_none());
        assert!(a.alloc_pages(AllocFlags::empty(), 0).is_some());
    }

    #[test]
    fn double_free_is_ignored() {
        let mut a = BitmapFrameAlloc::new(PhysicalAddress::new(0), 2);
        let p = a.alloc_4k().unwrap();
        a.free_page(p);
        a.free_page(p);
        assert_eq!(a.free_frames(), 2);
        assert!(!a.is_valid(page(0x2000)));
        assert!(a.is_valid(page(0x1000)));
    }

    #[test]
    fn mark_used_reserves_frames() {
        let mut a = BitmapFrameAlloc::new(PhysicalAddress::new(0), 2);
        a.mark_used(page(0));
        assert_eq!(a.alloc_4k(), Some(page(0x1000)));
        assert_eq!(a.alloc_4k(), None);
    }
}
