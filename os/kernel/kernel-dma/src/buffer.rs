use crate::{CoherentAllocError, CoherentDma, DeviceConstraints, DmaDirection};
use kernel_memory_addresses::{BusAddress, VirtualAddress};
use log::error;

/// An owned coherent allocation, freed on drop.
pub struct CoherentBuffer<'a> {
    dma: &'a dyn CoherentDma,
    virt: VirtualAddress,
    bus: BusAddress,
    size: u64,
}

impl<'a> CoherentBuffer<'a> {
    /// # Errors
    /// Whatever [`CoherentDma::allocate_coherent`] reports.
    pub fn new(
        dma: &'a dyn CoherentDma,
        size: u64,
        device: &DeviceConstraints,
    ) -> Result<Self, CoherentAllocError> {
        let (virt, bus) = dma.allocate_coherent(size, device)?;
        Ok(Self {
            dma,
            virt,
            bus,
            size,
        })
    }

    /// CPU address of the first byte.
    #[inline]
    #[must_use]
    pub const fn virt(&self) -> VirtualAddress {
        self.virt
    }

    /// Address to program into the device.
    #[inline]
    #[must_use]
    pub const fn bus(&self) -> BusAddress {
        self.bus
    }

    /// Requested size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn as_mut_ptr<T>(&self) -> *mut T {
        self.virt.as_mut_ptr::<T>()
    }

    /// # Panics
    /// On [`DmaDirection::None`].
    pub fn sync(&self, dir: DmaDirection) {
        self.dma.sync_coherent(self.virt, self.size, dir);
    }
}

impl Drop for CoherentBuffer<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.dma.free_coherent(self.virt, self.size, self.bus) {
            error!("dropping coherent buffer at {}: {e}", self.virt);
        }
    }
}

impl core::fmt::Debug for CoherentBuffer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CoherentBuffer")
            .field("virt", &self.virt)
            .field("bus", &self.bus)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
