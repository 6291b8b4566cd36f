use crate::WindowInitError;
use kernel_info::memory::{DMA_COHERENT_BASE, DMA_COHERENT_LIMIT};
use kernel_memory_addresses::{PageSize, Size2M, Size4K, VirtualAddress};

/// The fixed virtual range `[base, limit)` coherent mappings are placed in.
///
/// Both bounds are page aligned and the whole range is served by a single
/// leaf page table, so one table handle covers every mapping the allocator
/// will ever make.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AddressWindow {
    base: VirtualAddress,
    limit: VirtualAddress,
}

impl AddressWindow {
    /// The kernel's coherent window from [`kernel_info::memory`].
    pub const KERNEL: Self = match Self::new(
        VirtualAddress::new(DMA_COHERENT_BASE),
        VirtualAddress::new(DMA_COHERENT_LIMIT),
    ) {
        Ok(w) => w,
        Err(_) => panic!("invalid coherent DMA window constants"),
    };

    /// # Errors
    /// - [`WindowInitError::Misaligned`] unless `base < limit` and both are
    ///   4 KiB aligned.
    /// - [`WindowInitError::SpansTables`] if the range crosses a 2 MiB
    ///   boundary.
    pub const fn new(base: VirtualAddress, limit: VirtualAddress) -> Result<Self, WindowInitError> {
        let (b, l) = (base.as_u64(), limit.as_u64());
        if b >= l || !b.is_multiple_of(Size4K::SIZE) || !l.is_multiple_of(Size4K::SIZE) {
            return Err(WindowInitError::Misaligned);
        }
        if b >> Size2M::SHIFT != (l - 1) >> Size2M::SHIFT {
            return Err(WindowInitError::SpansTables);
        }
        Ok(Self { base, limit })
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    /// Exclusive end.
    #[inline]
    #[must_use]
    pub const fn limit(&self) -> VirtualAddress {
        self.limit
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.limit.as_u64() - self.base.as_u64()
    }

    /// Base of the 2 MiB span whose leaf table maps the window.
    #[inline]
    #[must_use]
    pub const fn table_span_base(&self) -> VirtualAddress {
        VirtualAddress::new(self.base.as_u64() & !(Size2M::SIZE - 1))
    }

    /// Every page of the window, ascending.
    pub fn pages(&self) -> impl Iterator<Item = VirtualAddress> + use<> {
        let base = self.base;
        (0..self.size() / Size4K::SIZE).map(move |i| base + i * Size4K::SIZE)
    }
}
