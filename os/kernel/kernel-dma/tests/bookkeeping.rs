mod common;

use common::{Machine, va};
use kernel_dma::{
    AddressWindow, AllocFlags, CacheAttributes, CacheMaintenance, CoherentAllocError,
    CoherentAllocator, IdentityBus,
};
use kernel_memory_addresses::VirtualAddress;
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

/// System allocator that returns null on the current thread while
/// [`HEAP_EXHAUSTED`] is set.
struct FailingHeap;

std::thread_local! {
    static HEAP_EXHAUSTED: Cell<bool> = const { Cell::new(false) };
}

unsafe impl GlobalAlloc for FailingHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if HEAP_EXHAUSTED.with(Cell::get) {
            return std::ptr::null_mut();
        }
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static HEAP: FailingHeap = FailingHeap;

/// Maintenance that neither executes nor records, so nothing allocates.
struct NoMaintenance;

impl CacheMaintenance for NoMaintenance {
    fn invalidate_range(&self, _: VirtualAddress, _: u64) {}
    fn clean_range(&self, _: VirtualAddress, _: u64) {}
    fn clean_and_invalidate_range(&self, _: VirtualAddress, _: u64) {}
    fn invalidate_tlb_range(&self, _: VirtualAddress, _: u64) {}
}

#[test]
fn exhausted_heap_rolls_back_the_physical_run() {
    let m = Machine::new(64);
    let window = AddressWindow::new(va(0x20_0000), va(0x40_0000)).unwrap();
    let dma = CoherentAllocator::init(window, m.space, m.frames, NoMaintenance, IdentityBus);
    dma.allocate(0x1000, AllocFlags::ZERO, CacheAttributes::Uncached).unwrap();

    let frames = m.free_frames();
    let count = dma.reservation_count();

    HEAP_EXHAUSTED.with(|f| f.set(true));
    let result = dma.allocate(0x3000, AllocFlags::ZERO, CacheAttributes::Uncached);
    HEAP_EXHAUSTED.with(|f| f.set(false));

    assert_eq!(result, Err(CoherentAllocError::OutOfBookkeeping));
    assert_eq!(m.free_frames(), frames);
    assert_eq!(dma.reservation_count(), count);

    // the heap is back: the same request now succeeds
    let (virt, _) = dma.allocate(0x3000, AllocFlags::ZERO, CacheAttributes::Uncached).unwrap();
    assert_eq!(virt, va(0x20_1000));
}
