use crate::{PageSize, VirtualAddress};
use core::fmt;
use core::marker::PhantomData;

/// Virtual memory page base for size `S`.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> VirtualPage<S> {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self {
            base: addr.as_u64() & !(S::SIZE - 1),
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.base)
    }

    /// The page `n` pages after this one.
    #[inline]
    #[must_use]
    pub const fn nth(self, n: u64) -> Self {
        Self {
            base: self.base + n * S::SIZE,
            _size: PhantomData,
        }
    }
}

impl<S: PageSize> fmt::Display for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base, S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage<{}>(0x{:016X})", S::as_str(), self.base)
    }
}
