mod common;

use common::{Machine, TestAllocator};
use kernel_dma::global::{
    dma_alloc_coherent, dma_free_coherent, dma_sync_coherent, install, installed,
};
use kernel_dma::{DeviceConstraints, DmaDirection, GlobalInstallError};

// The global slot is per process, so everything runs in one test.
#[test]
fn install_once_then_allocate_through_wrappers() {
    let device = DeviceConstraints::default();
    assert!(installed().is_none());
    assert_eq!(dma_alloc_coherent(0x1000, &device), None);

    let m = Machine::new(64);
    let dma: &'static TestAllocator = Box::leak(Box::new(m.allocator(0x20_0000, 0x40_0000)));
    let other: &'static TestAllocator = Box::leak(Box::new(m.allocator(0x20_0000, 0x40_0000)));

    assert_eq!(install(dma), Ok(()));
    assert_eq!(install(other), Err(GlobalInstallError::AlreadyInstalled));
    assert!(installed().is_some());

    let frames = m.free_frames();
    let (virt, bus) = dma_alloc_coherent(0x2000, &device).unwrap();
    assert_eq!(dma.reservation_count(), 1);
    assert_eq!(other.reservation_count(), 0);

    dma_sync_coherent(virt, 0x2000, DmaDirection::Bidirectional);
    dma_free_coherent(virt, 0x2000, bus);
    assert_eq!(dma.reservation_count(), 0);
    assert_eq!(m.free_frames(), frames);

    // logged and ignored
    dma_free_coherent(virt, 0x2000, bus);
    assert_eq!(dma_alloc_coherent(0, &device), None);
}
