#![allow(dead_code)]

use kernel_alloc::frame_alloc::BitmapFrameAlloc;
use kernel_dma::{AddressWindow, BusTranslator, CacheMaintenance, CoherentAllocator, IdentityBus};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_sync::SpinLock;
use kernel_vmem::{AddressSpace, FrameAlloc, PhysMapper};
use std::alloc::{Layout, alloc_zeroed};
use std::sync::Mutex;

/// Heap buffer standing in for RAM; physical address = byte offset.
pub struct TestRam {
    base: *mut u8,
    size: u64,
}

// SAFETY: the buffer is leaked and only ever accessed through raw pointers.
unsafe impl Send for TestRam {}
unsafe impl Sync for TestRam {}

impl TestRam {
    pub fn leak(frames: u64) -> &'static Self {
        let size = frames * 4096;
        let layout = Layout::from_size_align(usize::try_from(size).unwrap(), 4096).unwrap();
        let base = unsafe { alloc_zeroed(layout) };
        assert!(!base.is_null());
        Box::leak(Box::new(Self { base, size }))
    }

    pub fn bytes(&self, pa: PhysicalAddress, len: usize) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.phys_to_virt(pa).as_mut_ptr::<u8>(), len) }
    }

    pub fn fill(&self, pa: PhysicalAddress, len: usize, value: u8) {
        unsafe { std::ptr::write_bytes(self.phys_to_virt(pa).as_mut_ptr::<u8>(), value, len) }
    }
}

impl PhysMapper for TestRam {
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress {
        assert!(pa.as_u64() < self.size, "pa {pa} outside test RAM");
        VirtualAddress::from_ptr(self.base.wrapping_add(usize::try_from(pa.as_u64()).unwrap()))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheOp {
    Invalidate(VirtualAddress, u64),
    Clean(VirtualAddress, u64),
    CleanInvalidate(VirtualAddress, u64),
    Tlb(VirtualAddress, u64),
}

/// Records maintenance requests instead of executing them.
#[derive(Default)]
pub struct RecordingCache {
    ops: Mutex<Vec<CacheOp>>,
}

impl RecordingCache {
    pub fn take(&self) -> Vec<CacheOp> {
        std::mem::take(&mut *self.ops.lock().unwrap())
    }

    fn push(&self, op: CacheOp) {
        self.ops.lock().unwrap().push(op);
    }
}

impl CacheMaintenance for RecordingCache {
    fn invalidate_range(&self, start: VirtualAddress, len: u64) {
        self.push(CacheOp::Invalidate(start, len));
    }

    fn clean_range(&self, start: VirtualAddress, len: u64) {
        self.push(CacheOp::Clean(start, len));
    }

    fn clean_and_invalidate_range(&self, start: VirtualAddress, len: u64) {
        self.push(CacheOp::CleanInvalidate(start, len));
    }

    fn invalidate_tlb_range(&self, start: VirtualAddress, len: u64) {
        self.push(CacheOp::Tlb(start, len));
    }
}

pub type TestAllocator<B = IdentityBus> =
    CoherentAllocator<'static, BitmapFrameAlloc, TestRam, &'static RecordingCache, B>;

/// Simulated machine: RAM, a frame pool over all of it and an empty
/// address space whose PML4 came from that pool.
pub struct Machine {
    pub ram: &'static TestRam,
    pub frames: &'static SpinLock<BitmapFrameAlloc>,
    pub space: &'static SpinLock<AddressSpace<'static, TestRam>>,
    pub cache: &'static RecordingCache,
}

impl Machine {
    pub fn new(frames: u64) -> Self {
        let ram = TestRam::leak(frames);
        let mut pool = BitmapFrameAlloc::new(PhysicalAddress::new(0), frames);
        let root = pool.alloc_4k().unwrap();
        Self {
            ram,
            frames: Box::leak(Box::new(SpinLock::new(pool))),
            space: Box::leak(Box::new(SpinLock::new(AddressSpace::from_root(ram, root)))),
            cache: Box::leak(Box::default()),
        }
    }

    pub fn free_frames(&self) -> u64 {
        self.frames.lock().free_frames()
    }

    pub fn allocator(&self, base: u64, limit: u64) -> TestAllocator {
        self.allocator_with_bus(base, limit, IdentityBus)
    }

    pub fn allocator_with_bus<B: BusTranslator>(
        &self,
        base: u64,
        limit: u64,
        bus: B,
    ) -> TestAllocator<B> {
        let window =
            AddressWindow::new(VirtualAddress::new(base), VirtualAddress::new(limit)).unwrap();
        CoherentAllocator::init(window, self.space, self.frames, self.cache, bus)
    }
}

pub fn va(v: u64) -> VirtualAddress {
    VirtualAddress::new(v)
}

pub fn pa(p: u64) -> PhysicalAddress {
    PhysicalAddress::new(p)
}
