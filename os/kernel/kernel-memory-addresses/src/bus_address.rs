use core::fmt;
use core::ops::Add;

/// Address of memory as a device sees it on its bus.
///
/// Produced by translating a [`PhysicalAddress`](crate::PhysicalAddress);
/// the translation may be the identity or a constant offset depending on the
/// platform. This is the value written into a device's DMA descriptors.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BusAddress(u64);

impl BusAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether a device limited to `mask` address bits can reach this address.
    #[inline]
    #[must_use]
    pub const fn fits_mask(self, mask: u64) -> bool {
        self.0 & !mask == 0
    }
}

impl fmt::Debug for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BUS(0x{:016X})", self.0)
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl Add<u64> for BusAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}
