use crate::{CoherentAllocError, CoherentFreeError, DmaDirection};
use kernel_alloc::frame_alloc::AllocFlags;
use kernel_info::memory::DMA_FULL_MASK;
use kernel_memory_addresses::{BusAddress, VirtualAddress};
use kernel_vmem::CacheAttributes;

/// What a device needs from a coherent buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceConstraints {
    /// Highest bus address the device can generate, as an all-ones mask.
    pub coherent_mask: u64,
    /// Memory type of the CPU mapping.
    pub cache: CacheAttributes,
}

impl Default for DeviceConstraints {
    fn default() -> Self {
        Self {
            coherent_mask: DMA_FULL_MASK,
            cache: CacheAttributes::Uncached,
        }
    }
}

impl DeviceConstraints {
    #[must_use]
    pub const fn with_mask(coherent_mask: u64) -> Self {
        Self {
            coherent_mask,
            cache: CacheAttributes::Uncached,
        }
    }

    /// Frame allocation flags for this device. Coherent buffers are always
    /// zeroed; masks narrower than 32 bits are served from the DMA zone.
    #[must_use]
    pub fn alloc_flags(&self) -> AllocFlags {
        let mut flags = AllocFlags::ZERO;
        if self.coherent_mask < DMA_FULL_MASK {
            flags |= AllocFlags::DMA;
        }
        flags
    }
}

/// Driver-facing coherent DMA interface.
///
/// Object safe, so drivers can hold a `&dyn CoherentDma` without knowing the
/// platform hooks behind it.
pub trait CoherentDma {
    /// Allocate at least `size` bytes mapped for coherent access by both the
    /// CPU (returned virtual address) and `device` (returned bus address).
    ///
    /// # Errors
    /// See [`CoherentAllocError`]. Every failure is fully rolled back.
    fn allocate_coherent(
        &self,
        size: u64,
        device: &DeviceConstraints,
    ) -> Result<(VirtualAddress, BusAddress), CoherentAllocError>;

    /// Release an allocation made by [`allocate_coherent`](Self::allocate_coherent).
    ///
    /// # Errors
    /// [`CoherentFreeError::NotAllocated`] if `virt` does not start a live
    /// allocation; nothing is changed in that case.
    fn free_coherent(
        &self,
        virt: VirtualAddress,
        size: u64,
        bus: BusAddress,
    ) -> Result<(), CoherentFreeError>;

    /// Perform the cache maintenance a transfer in `dir` needs.
    fn sync_coherent(&self, virt: VirtualAddress, size: u64, dir: DmaDirection);
}
