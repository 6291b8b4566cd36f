use crate::{PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

/// Physical memory page base for size `S`.
///
/// A `PhysicalPage<S>` is the **page-aligned base** of a physical page of
/// `S::SIZE` bytes, i.e. a page frame.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pp = PhysicalAddress::new(0x0000_0008_1234_5678).page::<Size4K>();
/// assert_eq!(pp.base().as_u64(), 0x0000_0008_1234_5000);
/// assert_eq!(pp.nth(1).base().as_u64(), 0x0000_0008_1234_6000);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// Page containing `pa` (aligns down).
    #[inline]
    #[must_use]
    pub const fn from_addr(pa: PhysicalAddress) -> Self {
        Self {
            base: pa.as_u64() & !(S::SIZE - 1),
            _size: PhantomData,
        }
    }

    /// Page with the given frame number (`base >> S::SHIFT`).
    #[inline]
    #[must_use]
    pub const fn from_frame_number(pfn: u64) -> Self {
        Self {
            base: pfn << S::SHIFT,
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    #[inline]
    #[must_use]
    pub const fn frame_number(self) -> u64 {
        self.base >> S::SHIFT
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

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base, S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>(0x{:016X})", S::as_str(), self.base)
    }
}
