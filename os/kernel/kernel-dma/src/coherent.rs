//! # Coherent allocator
//!
//! Hands out buffers that the CPU and a device can both access without
//! explicit ownership transfers. Each buffer is a power-of-two physical run,
//! mapped page by page into the coherent window with a non-cacheable memory
//! type.
//!
//! ## Allocate
//!
//! ```text
//! size ─► round to pages ─► order ─► frames.alloc_pages
//!      ─► flush direct-map alias ─► RegionSlot ─► tracker.reserve (irq-off lock)
//!      ─► install PTEs ─► free surplus frames ─► (virt, bus)
//! ```
//!
//! Every step up to the PTE installation can fail; what was taken so far is
//! returned by drop guards. A non-empty PTE in a freshly reserved range means
//! the tracker and the page table disagree, which is fatal.
//!
//! ## Free
//!
//! ```text
//! tracker.begin_release ─► take PTEs, free frames ─► TLB flush
//!                       ─► tracker.finish_release ─► drop RegionSlot
//! ```
//!
//! The tracker lock is held only for list operations. Frame allocation,
//! page-table access and heap allocation happen outside of it. Both the
//! tracker lock and the frame allocator lock are taken with local interrupts
//! disabled, so an interrupt handler may allocate or free on the same CPU.

use crate::region::{RegionSlot, RegionTracker, Reservation};
use crate::sync::sync_range;
use crate::{
    AddressWindow, BusTranslator, CacheMaintenance, CoherentAllocError, CoherentDma,
    CoherentFreeError, DeviceConstraints, DmaDirection, WindowInitError,
};
use alloc::vec::Vec;
use kernel_alloc::frame_alloc::{AllocFlags, PageFrameAlloc, PhysicalRun, order_for_pages};
use kernel_memory_addresses::{BusAddress, PageSize, PhysicalPage, Size4K, VirtualAddress};
use kernel_sync::SpinLock;
use kernel_vmem::{
    AddressSpace, CacheAttributes, FrameAlloc, LeafTable, PageEntryBits, PhysMapper,
};
use log::{debug, error, info, trace, warn};

/// The coherent DMA allocator for one [`AddressWindow`].
///
/// - `F`: page-frame allocator, shared with the rest of the kernel.
/// - `M`: direct-map translation for flushing and zeroing runs.
/// - `C`: cache and TLB maintenance.
/// - `B`: physical to bus address translation.
pub struct CoherentAllocator<'a, F, M, C, B> {
    frames: &'a SpinLock<F>,
    mapper: &'a M,
    cache: C,
    bus: B,
    window: AddressWindow,
    leaf: LeafTable,
    tracker: SpinLock<RegionTracker>,
}

/// Returns a run to the frame allocator unless disarmed.
struct RunGuard<'l, F: PageFrameAlloc> {
    frames: &'l SpinLock<F>,
    run: PhysicalRun,
    armed: bool,
}

impl<F: PageFrameAlloc> RunGuard<'_, F> {
    fn disarm(mut self) -> PhysicalRun {
        self.armed = false;
        self.run
    }
}

impl<F: PageFrameAlloc> Drop for RunGuard<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            trace!("rolling back run {}", self.run.first());
            self.frames.with_lock_irqsave(|f| f.free_pages(self.run));
        }
    }
}

impl<'a, F, M, C, B> CoherentAllocator<'a, F, M, C, B>
where
    F: PageFrameAlloc + FrameAlloc,
    M: PhysMapper,
    C: CacheMaintenance,
    B: BusTranslator,
{
    /// Create the page-table storage for `window` and build the allocator.
    ///
    /// Runs under the page-table lock `space`. Missing PDPT, PD and PT frames
    /// are taken from `frames`. The window's leaf entries must all be empty.
    ///
    /// # Errors
    /// - [`WindowInitError::PageTables`] if a table can't be created.
    /// - [`WindowInitError::WindowInUse`] if anything is already mapped in
    ///   the window.
    pub fn try_init(
        window: AddressWindow,
        space: &SpinLock<AddressSpace<'a, M>>,
        frames: &'a SpinLock<F>,
        cache: C,
        bus: B,
    ) -> Result<Self, WindowInitError> {
        let aspace = space.lock();
        let mapper = aspace.mapper();

        let table = {
            let mut frames = frames.lock_irqsave();
            aspace.ensure_leaf_table(&mut *frames, window.base(), PageEntryBits::new_table_link())?
        };

        // SAFETY: `table` is the PT linked for the window's 2 MiB span and is
        // never unlinked.
        let leaf = unsafe { LeafTable::new(mapper, table, window.table_span_base()) };
        if let Some(va) = window.pages().find(|&va| !leaf.read(va).is_empty()) {
            error!("coherent window page {va} is already mapped");
            return Err(WindowInitError::WindowInUse);
        }
        drop(aspace);

        info!(
            "coherent DMA window {}..{} ({} pages) in leaf table {}",
            window.base(),
            window.limit(),
            window.size() / Size4K::SIZE,
            table
        );

        Ok(Self {
            frames,
            mapper,
            cache,
            bus,
            window,
            leaf,
            tracker: SpinLock::new(RegionTracker::new(window)),
        })
    }

    /// Like [`try_init`](Self::try_init), but a failure is fatal.
    ///
    /// # Panics
    /// If the window cannot be set up.
    pub fn init(
        window: AddressWindow,
        space: &SpinLock<AddressSpace<'a, M>>,
        frames: &'a SpinLock<F>,
        cache: C,
        bus: B,
    ) -> Self {
        match Self::try_init(window, space, frames, cache, bus) {
            Ok(dma) => dma,
            Err(e) => {
                error!("coherent DMA init failed: {e}");
                panic!("coherent DMA init failed: {e}");
            }
        }
    }

    /// Allocate `size` bytes (rounded up to pages) of coherent memory.
    ///
    /// Returns the window address of the mapping and the bus address of its
    /// first byte.
    ///
    /// # Errors
    /// See [`CoherentAllocError`]; every failure is rolled back completely.
    ///
    /// # Panics
    /// If a page table entry in the freshly reserved range is not empty.
    pub fn allocate(
        &self,
        size: u64,
        flags: AllocFlags,
        cache: CacheAttributes,
    ) -> Result<(VirtualAddress, BusAddress), CoherentAllocError> {
        self.allocate_within(size, flags, cache, u64::MAX)
    }

    /// [`allocate`](Self::allocate) for a device that can only reach bus
    /// addresses within `mask`.
    ///
    /// # Errors
    /// See [`CoherentAllocError`].
    pub fn allocate_within(
        &self,
        size: u64,
        flags: AllocFlags,
        cache: CacheAttributes,
        mask: u64,
    ) -> Result<(VirtualAddress, BusAddress), CoherentAllocError> {
        if size == 0 {
            return Err(CoherentAllocError::ZeroSize);
        }
        let bytes = Size4K::align_up(size).ok_or(CoherentAllocError::TooLarge { size })?;
        let pages = bytes / Size4K::SIZE;
        let order = order_for_pages(pages).ok_or(CoherentAllocError::TooLarge { size })?;

        let Some(run) = self.frames.with_lock_irqsave(|f| f.alloc_pages(flags, order)) else {
            warn!("coherent alloc of {size:#x} bytes: no free run of order {order}");
            return Err(CoherentAllocError::OutOfFrames { order });
        };
        let run = RunGuard {
            frames: self.frames,
            run,
            armed: true,
        };

        let bus = self.bus.physical_to_bus(run.run.base());
        let last = BusAddress::new(bus.as_u64().saturating_add(bytes - 1));
        if !last.fits_mask(mask) {
            warn!("coherent alloc at {bus} is out of reach for mask {mask:#x}");
            return Err(CoherentAllocError::MaskUnreachable { bus, mask });
        }

        self.prepare_alias(&run.run, flags);

        let Some(slot) = RegionSlot::try_new() else {
            warn!("coherent alloc of {size:#x} bytes: no memory for bookkeeping");
            return Err(CoherentAllocError::OutOfBookkeeping);
        };

        let reservation = match self.tracker.with_lock_irqsave(|t| t.reserve(slot, bytes)) {
            Ok(r) => r,
            Err(slot) => {
                drop(slot);
                warn!("coherent window has no {bytes:#x}-byte gap left");
                return Err(CoherentAllocError::WindowExhausted { size: bytes });
            }
        };

        for (i, va) in (0..).zip(reservation.pages()) {
            let old = self.leaf.read(va);
            if !old.is_empty() {
                error!("coherent page {va} already has entry {:#018x}", old.into_bits());
                panic!("coherent window entry for {va} is not empty");
            }
            let frame = run.run.page(i);
            self.leaf.install(va, PageEntryBits::new_coherent(frame, cache));
            trace!("map {va} -> {frame}");
        }

        let run = run.disarm();
        if pages < run.pages() {
            let mut frames = self.frames.lock_irqsave();
            for i in pages..run.pages() {
                frames.free_page(run.page(i));
            }
        }

        debug!(
            "coherent alloc {bytes:#x} bytes at {} / {bus} (order {order})",
            reservation.start()
        );
        Ok((reservation.start(), bus))
    }

    /// Get the cacheable direct-map view of `run` out of the way of the
    /// uncached mapping, zeroing it first if asked to.
    #[allow(clippy::cast_possible_truncation)]
    fn prepare_alias(&self, run: &PhysicalRun, flags: AllocFlags) {
        let alias = self.mapper.phys_to_virt(run.base());
        if flags.contains(AllocFlags::ZERO) {
            // SAFETY: the run belongs to us and the direct map covers it.
            unsafe { core::ptr::write_bytes(alias.as_mut_ptr::<u8>(), 0, run.bytes() as usize) };
            self.cache.clean_and_invalidate_range(alias, run.bytes());
        } else {
            self.cache.invalidate_range(alias, run.bytes());
        }
    }

    /// Release the allocation starting at `virt`.
    ///
    /// `size` and `bus` are what the caller believes it allocated. A size
    /// that doesn't match the recorded one is logged and the recorded size
    /// wins.
    ///
    /// # Errors
    /// [`CoherentFreeError::NotAllocated`] if `virt` does not start a live
    /// allocation. Nothing is changed in that case.
    pub fn free(
        &self,
        virt: VirtualAddress,
        size: u64,
        bus: BusAddress,
    ) -> Result<(), CoherentFreeError> {
        let Some(reservation) = self.tracker.with_lock_irqsave(|t| t.begin_release(virt)) else {
            error!("invalid coherent free of {virt} ({size:#x} bytes, {bus})");
            return Err(CoherentFreeError::NotAllocated(virt));
        };

        let requested = Size4K::align_up(size).unwrap_or(u64::MAX);
        if requested != reservation.size() {
            warn!(
                "coherent free of {virt}: size {requested:#x} does not match allocated {:#x}",
                reservation.size()
            );
        }

        {
            let mut frames = self.frames.lock_irqsave();
            for va in reservation.pages() {
                let entry = self.leaf.take(va);
                if entry.present() && frames.is_valid(entry.frame()) {
                    trace!("unmap {va} -> {}", entry.frame());
                    frames.free_page(entry.frame());
                } else {
                    error!("corrupted coherent entry at {va}: {:#018x}", entry.into_bits());
                }
            }
        }

        self.cache
            .invalidate_tlb_range(reservation.start(), reservation.size());

        let slot = self.tracker.with_lock_irqsave(|t| t.finish_release(virt));
        if slot.is_none() {
            error!("reservation at {virt} vanished while being freed");
        }
        drop(slot);

        debug!("coherent free {virt} ({:#x} bytes, {bus})", reservation.size());
        Ok(())
    }

    /// Cache maintenance for a transfer in `dir` over `[virt, virt + size)`.
    ///
    /// # Panics
    /// On [`DmaDirection::None`].
    pub fn sync(&self, virt: VirtualAddress, size: u64, dir: DmaDirection) {
        sync_range(&self.cache, virt, size, dir);
    }

    /// [`sync`](Self::sync) for a range given by physical page and offset,
    /// maintained through its direct-map alias.
    ///
    /// # Panics
    /// On [`DmaDirection::None`].
    pub fn sync_page(
        &self,
        page: PhysicalPage<Size4K>,
        offset: u64,
        size: u64,
        dir: DmaDirection,
    ) {
        let alias = self.mapper.phys_to_virt(page.base()) + offset;
        sync_range(&self.cache, alias, size, dir);
    }
}

impl<F, M, C, B> CoherentAllocator<'_, F, M, C, B> {
    #[inline]
    #[must_use]
    pub const fn window(&self) -> AddressWindow {
        self.window
    }

    /// The page table holding every mapping of the window.
    #[inline]
    #[must_use]
    pub const fn leaf_table(&self) -> &LeafTable {
        &self.leaf
    }

    #[must_use]
    pub fn reservation_count(&self) -> usize {
        self.tracker.with_lock_irqsave(|t| t.len())
    }

    #[must_use]
    pub fn bytes_reserved(&self) -> u64 {
        self.tracker.with_lock_irqsave(|t| t.bytes_reserved())
    }

    /// The live reservation starting at `virt`.
    #[must_use]
    pub fn find(&self, virt: VirtualAddress) -> Option<Reservation> {
        self.tracker.with_lock_irqsave(|t| t.find(virt))
    }

    /// Snapshot of the occupied ranges, sorted by start address.
    ///
    /// A range whose free is in progress is still listed: it stays occupied
    /// until its page table entries are gone.
    #[must_use]
    pub fn reservations(&self) -> Vec<Reservation> {
        loop {
            // size the buffer outside the lock, retry if it grew meanwhile
            let mut out = Vec::with_capacity(self.reservation_count());
            let complete = self.tracker.with_lock_irqsave(|t| {
                if t.len() > out.capacity() {
                    return false;
                }
                out.extend(t.iter());
                true
            });
            if complete {
                return out;
            }
        }
    }
}

impl<F, M, C, B> CoherentDma for CoherentAllocator<'_, F, M, C, B>
where
    F: PageFrameAlloc + FrameAlloc,
    M: PhysMapper,
    C: CacheMaintenance,
    B: BusTranslator,
{
    fn allocate_coherent(
        &self,
        size: u64,
        device: &DeviceConstraints,
    ) -> Result<(VirtualAddress, BusAddress), CoherentAllocError> {
        self.allocate_within(size, device.alloc_flags(), device.cache, device.coherent_mask)
    }

    fn free_coherent(
        &self,
        virt: VirtualAddress,
        size: u64,
        bus: BusAddress,
    ) -> Result<(), CoherentFreeError> {
        self.free(virt, size, bus)
    }

    fn sync_coherent(&self, virt: VirtualAddress, size: u64, dir: DmaDirection) {
        self.sync(virt, size, dir);
    }
}
