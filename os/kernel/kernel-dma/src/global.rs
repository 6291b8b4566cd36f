//! The kernel-wide coherent allocator.
//!
//! Boot code builds a [`CoherentAllocator`](crate::CoherentAllocator) once,
//! leaks it and calls [`install`]. Drivers then use the free functions
//! without having to thread a handle through.

use crate::{CoherentDma, DeviceConstraints, DmaDirection, GlobalInstallError};
use kernel_memory_addresses::{BusAddress, VirtualAddress};
use kernel_sync::SyncOnceCell;
use log::{error, info};

static DMA: SyncOnceCell<&'static (dyn CoherentDma + Sync)> = SyncOnceCell::new();

/// Make `dma` the kernel-wide coherent allocator.
///
/// # Errors
/// [`GlobalInstallError::AlreadyInstalled`] on every call after the first.
pub fn install(dma: &'static (dyn CoherentDma + Sync)) -> Result<(), GlobalInstallError> {
    DMA.set(dma)
        .map_err(|_| GlobalInstallError::AlreadyInstalled)?;
    info!("coherent DMA allocator installed");
    Ok(())
}

/// The installed allocator, if any.
#[inline]
#[must_use]
pub fn installed() -> Option<&'static (dyn CoherentDma + Sync)> {
    DMA.get().copied()
}

fn require(op: &str) -> Option<&'static (dyn CoherentDma + Sync)> {
    let dma = installed();
    if dma.is_none() {
        error!("{op}: no coherent DMA allocator installed");
    }
    dma
}

/// Allocate `size` bytes of coherent memory for `device`.
///
/// Returns `None` on failure; the reason is logged.
#[must_use]
pub fn dma_alloc_coherent(
    size: u64,
    device: &DeviceConstraints,
) -> Option<(VirtualAddress, BusAddress)> {
    let dma = require("dma_alloc_coherent")?;
    match dma.allocate_coherent(size, device) {
        Ok(pair) => Some(pair),
        Err(e) => {
            error!("dma_alloc_coherent({size:#x}): {e}");
            None
        }
    }
}

/// Free an allocation made by [`dma_alloc_coherent`]. Invalid frees are
/// logged and ignored.
pub fn dma_free_coherent(virt: VirtualAddress, size: u64, bus: BusAddress) {
    if let Some(dma) = require("dma_free_coherent") {
        // already logged by the allocator
        let _ = dma.free_coherent(virt, size, bus);
    }
}

/// # Panics
/// On [`DmaDirection::None`].
pub fn dma_sync_coherent(virt: VirtualAddress, size: u64, dir: DmaDirection) {
    if let Some(dma) = require("dma_sync_coherent") {
        dma.sync_coherent(virt, size, dir);
    }
}
