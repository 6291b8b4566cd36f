mod common;

use common::{RecordingCache, TestRam, pa, va};
use kernel_alloc::frame_alloc::{AllocFlags, BitmapFrameAlloc, PageFrameAlloc, PhysicalRun};
use kernel_dma::{AddressWindow, CacheAttributes, CoherentAllocator, IdentityBus};
use kernel_memory_addresses::{PhysicalPage, Size4K};
use kernel_sync::SpinLock;
use kernel_sync::irq::interrupts_enabled;
use kernel_vmem::{AddressSpace, FrameAlloc};

/// Frame allocator that notes every call made while interrupts were on.
struct IrqCheckingFrames {
    inner: BitmapFrameAlloc,
    calls: usize,
    with_irqs_on: Vec<&'static str>,
}

impl IrqCheckingFrames {
    fn note(&mut self, op: &'static str) {
        self.calls += 1;
        if interrupts_enabled() {
            self.with_irqs_on.push(op);
        }
    }
}

impl PageFrameAlloc for IrqCheckingFrames {
    fn alloc_pages(&mut self, flags: AllocFlags, order: u32) -> Option<PhysicalRun> {
        self.note("alloc_pages");
        self.inner.alloc_pages(flags, order)
    }

    fn free_pages(&mut self, run: PhysicalRun) {
        self.note("free_pages");
        self.inner.free_pages(run);
    }

    fn free_page(&mut self, page: PhysicalPage<Size4K>) {
        self.note("free_page");
        self.inner.free_page(page);
    }

    fn is_valid(&self, page: PhysicalPage<Size4K>) -> bool {
        self.inner.is_valid(page)
    }
}

impl FrameAlloc for IrqCheckingFrames {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.note("alloc_4k");
        self.inner.alloc_4k()
    }
}

#[test]
fn frame_allocator_is_only_entered_with_interrupts_off() {
    let ram = TestRam::leak(64);
    let mut pool = BitmapFrameAlloc::new(pa(0), 64);
    let root = pool.alloc_4k().unwrap();
    let frames: &'static SpinLock<IrqCheckingFrames> =
        Box::leak(Box::new(SpinLock::new(IrqCheckingFrames {
            inner: pool,
            calls: 0,
            with_irqs_on: Vec::new(),
        })));
    let space: &'static SpinLock<AddressSpace<'static, TestRam>> =
        Box::leak(Box::new(SpinLock::new(AddressSpace::from_root(ram, root))));
    let cache: &'static RecordingCache = Box::leak(Box::default());

    let window = AddressWindow::new(va(0x20_0000), va(0x40_0000)).unwrap();
    let dma = CoherentAllocator::init(window, space, frames, cache, IdentityBus);

    // surplus page, then a full free
    let (virt, bus) = dma.allocate(0x3000, AllocFlags::ZERO, CacheAttributes::Uncached).unwrap();
    dma.free(virt, 0x3000, bus).unwrap();

    // mask rollback returns the whole run
    assert!(
        dma.allocate_within(0x1000, AllocFlags::ZERO, CacheAttributes::Uncached, 0)
            .is_err()
    );

    assert!(interrupts_enabled());
    let frames = frames.lock();
    // three tables, alloc + surplus, three frees, alloc + rollback
    assert_eq!(frames.calls, 3 + 2 + 3 + 2);
    assert!(
        frames.with_irqs_on.is_empty(),
        "frame allocator entered with interrupts enabled: {:?}",
        frames.with_irqs_on
    );
}
