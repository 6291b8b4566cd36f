use crate::{PageSize, VirtualPage};
use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// Virtual memory address.
///
/// Denotes an address the CPU resolves through the page tables. It does not
/// validate canonicality; it only carries the *kind* of address at the type
/// level so virtual and physical values are never confused.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0xFFFF_FFFF_8000_1234);
/// let vp = va.page::<Size4K>();
/// assert_eq!(vp.base() + va.offset_in::<Size4K>(), va);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Address of a pointer in the current address space.
    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Reinterpret this address as a raw pointer.
    ///
    /// Creating the pointer is safe; dereferencing it requires the address to
    /// be mapped in the current address space.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as usize as *mut T
    }

    /// The page of size `S` containing this address.
    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> VirtualPage<S> {
        VirtualPage::containing_address(self)
    }

    /// Offset of this address inside its page of size `S`.
    #[inline]
    #[must_use]
    pub const fn offset_in<S: PageSize>(self) -> u64 {
        self.0 & (S::SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub fn is_aligned<S: PageSize>(self) -> bool {
        S::is_aligned(self.0)
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, bytes: u64) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl<S: PageSize> From<VirtualPage<S>> for VirtualAddress {
    fn from(value: VirtualPage<S>) -> Self {
        value.base()
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

/// Distance in bytes between two virtual addresses.
impl Sub for VirtualAddress {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}
